//! Operation engines and the shared context they run against.

pub mod combine;
pub mod delete;
pub mod preview;
pub mod route;
pub mod split;

pub use combine::{CombineReport, combine};
pub use delete::{DeleteReport, delete_columns};
pub use preview::{PreviewReport, preview};
pub use route::{DestinationRouter, DestinationSummary};
pub use split::{SplitReport, split};

use crate::config::Config;
use crate::io::ports::{CloudObjectWriter, TableWriter, WorkbookReader, WorkbookWriter};
use crate::progress::ProgressBus;

/// Everything an engine needs for one run: codec ports, optional destination
/// writers, configuration, and the progress bus.
pub struct EngineContext<'a> {
    pub reader: &'a dyn WorkbookReader,
    pub writer: &'a dyn WorkbookWriter,
    pub table_writer: Option<&'a dyn TableWriter>,
    pub cloud_writer: Option<&'a dyn CloudObjectWriter>,
    pub config: &'a Config,
    pub progress: &'a ProgressBus,
}

impl<'a> EngineContext<'a> {
    pub fn new(
        reader: &'a dyn WorkbookReader,
        writer: &'a dyn WorkbookWriter,
        config: &'a Config,
        progress: &'a ProgressBus,
    ) -> Self {
        Self {
            reader,
            writer,
            table_writer: None,
            cloud_writer: None,
            config,
            progress,
        }
    }

    pub fn with_table_writer(mut self, table_writer: &'a dyn TableWriter) -> Self {
        self.table_writer = Some(table_writer);
        self
    }

    pub fn with_cloud_writer(mut self, cloud_writer: &'a dyn CloudObjectWriter) -> Self {
        self.cloud_writer = Some(cloud_writer);
        self
    }
}

//! Secondary destination routing for row-batch streams.

use serde::Serialize;

use crate::error::{Result, WorkbookError};
use crate::model::Frame;
use crate::io::ports::{CloudObjectWriter, RowSink, TableWriter};
use crate::plan::{DatabaseDestination, DbWriteMode, Destination, OutputFormat};

/// Destination details echoed back in operation reports.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationSummary {
    Database { uri: String, table: String },
    Cloud { root: String, key: String },
}

impl DestinationSummary {
    pub fn describe(destination: &Destination) -> Self {
        match destination {
            Destination::Database(db) => DestinationSummary::Database {
                uri: db.uri.clone(),
                table: db.table.clone(),
            },
            Destination::Cloud(cloud) => DestinationSummary::Cloud {
                root: cloud.root.display().to_string(),
                key: cloud.key.clone(),
            },
        }
    }
}

/// Renders a cloud object key from its template: `{name}` substitution, or a
/// trailing-slash prefix joined with the generated name.
pub fn render_cloud_key(template: &str, unique_name: &str) -> String {
    if template.contains("{name}") {
        return template.replace("{name}", unique_name);
    }
    if template.ends_with('/') {
        return format!("{template}{unique_name}");
    }
    template.to_string()
}

/// Routes each batch of a single-table stream to the configured secondary
/// destination, independent of the primary sink.
///
/// Database batches use the configured mode once, then `Append` for the rest
/// of the run. The cloud sink streams the same batches under the template
/// key.
pub struct DestinationRouter<'a> {
    database: Option<&'a DatabaseDestination>,
    table_writer: Option<&'a dyn TableWriter>,
    cloud_sink: Option<Box<dyn RowSink>>,
    summary: Option<DestinationSummary>,
    first_batch: bool,
}

impl<'a> DestinationRouter<'a> {
    /// Validates writer availability before any I/O and, outside dry runs,
    /// opens the cloud stream.
    pub fn open(
        destination: Option<&'a Destination>,
        table_writer: Option<&'a dyn TableWriter>,
        cloud_writer: Option<&dyn CloudObjectWriter>,
        default_format: OutputFormat,
        dry_run: bool,
    ) -> Result<Self> {
        let mut router = Self {
            database: None,
            table_writer: None,
            cloud_sink: None,
            summary: destination.map(DestinationSummary::describe),
            first_batch: true,
        };

        match destination {
            None => {}
            Some(Destination::Database(db)) => {
                let Some(writer) = table_writer else {
                    return Err(WorkbookError::Config(
                        "database destination requested but no database writer was provided"
                            .into(),
                    ));
                };
                if !dry_run {
                    router.database = Some(db);
                    router.table_writer = Some(writer);
                }
            }
            Some(Destination::Cloud(cloud)) => {
                let Some(writer) = cloud_writer else {
                    return Err(WorkbookError::Config(
                        "cloud destination requested but no cloud writer was provided".into(),
                    ));
                };
                if !dry_run {
                    let format = cloud.format.unwrap_or(default_format);
                    router.cloud_sink = Some(writer.stream_object(&cloud.key, format)?);
                }
            }
        }
        Ok(router)
    }

    pub fn route(&mut self, batch: &Frame) -> Result<()> {
        if let Some(sink) = &mut self.cloud_sink {
            sink.append(batch)?;
        }
        if let (Some(db), Some(writer)) = (self.database, self.table_writer) {
            let mode = if self.first_batch {
                db.mode
            } else {
                DbWriteMode::Append
            };
            writer.write_frame(batch, &db.table, mode, &db.options, &db.uri)?;
            self.first_batch = false;
        }
        Ok(())
    }

    /// Finalises the cloud stream and hands back the report summary.
    pub fn finish(self) -> Result<Option<DestinationSummary>> {
        if let Some(sink) = self.cloud_sink {
            sink.finalize()?;
        }
        Ok(self.summary)
    }
}

//! Explicit run configuration passed into every engine invocation.

use std::path::PathBuf;

/// Defaults shared by the engines. Front-ends build one per run; there is no
/// ambient global state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Comma-separated glob patterns applied when expanding directories.
    pub default_glob: String,
    /// Directory for atomic-write temp files. Must live on the same
    /// filesystem as the outputs; `None` uses each destination's directory.
    pub temp_dir: Option<PathBuf>,
    /// Sheet name used when a plan does not name its output sheet.
    pub default_sheet_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_glob: "*.xlsx,*.xlsm".to_string(),
            temp_dir: None,
            default_sheet_name: "Data".to_string(),
        }
    }
}

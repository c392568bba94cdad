//! Write-to-temp-then-rename file handling.
//!
//! The temporary file lives on the same filesystem as the destination so the
//! final rename is atomic: readers of the destination path never observe a
//! half-written file, and a failed write leaves the destination untouched.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use crate::error::{Result, WorkbookError};

/// Scoped handle for an atomic file write.
///
/// Bytes go to a uniquely named temp file; [`AtomicFile::commit`] renames it
/// into place. Dropping the handle without committing removes the temp file.
pub struct AtomicFile {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl AtomicFile {
    /// Opens a temp file for `path`, creating the destination directory if
    /// absent. `temp_dir` overrides where the temp file lives; it must be on
    /// the same device as the destination or the call fails fast.
    pub fn create(path: &Path, temp_dir: Option<&Path>) -> Result<Self> {
        let dest_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dest_dir)?;

        let temp_root = temp_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dest_dir.clone());
        fs::create_dir_all(&temp_root)?;
        ensure_same_device(&dest_dir, &temp_root)?;

        let temp = Builder::new()
            .prefix(".tmp-")
            .suffix(".partial")
            .tempfile_in(&temp_root)?;
        Ok(Self {
            temp,
            dest: path.to_path_buf(),
        })
    }

    /// Path of the in-flight temporary file.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Flushes and atomically renames the temp file to the destination.
    pub fn commit(mut self) -> Result<()> {
        self.temp.flush()?;
        self.temp
            .persist(&self.dest)
            .map_err(|err| WorkbookError::Io(err.error))?;
        Ok(())
    }

    /// Convenience for whole-value writes: write all bytes, then commit.
    pub fn write_and_commit(path: &Path, temp_dir: Option<&Path>, bytes: &[u8]) -> Result<()> {
        let mut file = Self::create(path, temp_dir)?;
        file.write_all(bytes)?;
        file.commit()
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

#[cfg(unix)]
fn ensure_same_device(dest_dir: &Path, temp_root: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let dest_device = fs::metadata(dest_dir)?.dev();
    let temp_device = fs::metadata(temp_root)?.dev();
    if dest_device != temp_device {
        return Err(WorkbookError::Config(format!(
            "temp directory {} is on a different filesystem than {}; \
             cross-device renames cannot be atomic",
            temp_root.display(),
            dest_dir.display()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_same_device(_dest_dir: &Path, _temp_root: &Path) -> Result<()> {
    Ok(())
}

//! Shared output file for pan-dl
//!
//! One file handle shared by every worker. Writes are positional, so workers
//! filling disjoint ranges never need to coordinate.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::{Error, Result};

/// Random-offset writer over the destination file
#[derive(Debug, Clone)]
pub struct OutputStore {
    file: Arc<File>,
    path: PathBuf,
}

impl OutputStore {
    /// Create (or truncate) the destination file.
    ///
    /// The file is not pre-sized; it grows with the highest-offset write.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            Error::FilesystemError(std::io::Error::new(
                e.kind(),
                format!("cannot create {}: {e}", path.display()),
            ))
        })?;
        Ok(Self {
            file: Arc::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write all of `data` starting at `offset`
    pub fn write_all_at(&self, data: &[u8], offset: u64) -> std::io::Result<()> {
        write_all_at(&self.file, data, offset)
    }

    /// Write `buffer[..len]` at `offset` on the blocking pool.
    ///
    /// The buffer is handed back so the caller can reuse it for the next read.
    pub async fn write_buffer_at(&self, buffer: Vec<u8>, len: usize, offset: u64) -> Result<Vec<u8>> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            write_all_at(&file, &buffer[..len], offset).map(|()| buffer)
        })
        .await
        .map_err(|e| Error::FilesystemError(std::io::Error::new(std::io::ErrorKind::Other, e)))?
        .map_err(Error::FilesystemError)
    }

    /// Flush file data to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data().map_err(Into::into)
    }
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        match file.seek_write(data, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                data = &data[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

//! Positioned I/O over one store file
//!
//! Every store keeps its file open for its whole lifetime and holds an
//! exclusive OS lock on it (`flock` on Unix, `LockFileEx` on Windows) so two
//! processes never open the same store.

use crate::{Error, Result};
use fs2::FileExt as LockExt;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// An open, locked store file
#[derive(Debug)]
pub struct StoreFile {
    file: File,
    path: PathBuf,
    name: String,
    /// Writers share it; length changes take it exclusively
    resize: RwLock<()>,
}

impl StoreFile {
    /// Open an existing file read-write and lock it
    pub fn open(path: &Path) -> Result<Self> {
        let name = store_name(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::io(&name, 0, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(Error::Locked(path.to_path_buf()));
            }
            Err(e) => {
                // EWOULDBLOCK / EAGAIN on platforms that do not map the kind
                if matches!(e.raw_os_error(), Some(11) | Some(35)) {
                    return Err(Error::Locked(path.to_path_buf()));
                }
                return Err(Error::io(&name, 0, e));
            }
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            name,
            resize: RwLock::new(()),
        })
    }

    /// File name used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying handle, used for memory mapping
    pub fn handle(&self) -> &File {
        &self.file
    }

    /// Current length in bytes
    pub fn len(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error::io(&self.name, 0, e))
    }

    /// True when the file holds no bytes at all
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate or extend
    pub fn set_len(&self, len: u64) -> Result<()> {
        let _resize = self.resize.write();
        self.file
            .set_len(len)
            .map_err(|e| Error::io(&self.name, len, e))
    }

    /// Grow the file to at least `len` bytes; never shrinks
    ///
    /// Writes past the end wait until the length is settled, so a slow grow
    /// never truncates bytes a concurrent write just appended.
    pub fn ensure_len(&self, len: u64) -> Result<()> {
        let _resize = self.resize.write();
        if self.len()? < len {
            self.file
                .set_len(len)
                .map_err(|e| Error::io(&self.name, len, e))?;
        }
        Ok(())
    }

    /// Fill `buf` from `offset`. Bytes past the end of the file read as zero,
    /// which is the encoding of a slot that is not in use.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = positioned_read(&self.file, &mut buf[filled..], offset + filled as u64)
                .map_err(|e| Error::io(&self.name, offset, e))?;
            if n == 0 {
                buf[filled..].fill(0);
                break;
            }
            filled += n;
        }
        Ok(())
    }

    /// Write all of `data` at `offset`, extending the file when needed
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let _resize = self.resize.read();
        let mut written = 0;
        while written < data.len() {
            let n = positioned_write(&self.file, &data[written..], offset + written as u64)
                .map_err(|e| Error::io(&self.name, offset, e))?;
            if n == 0 {
                return Err(Error::io(
                    &self.name,
                    offset,
                    io::Error::new(io::ErrorKind::WriteZero, "failed to write slot bytes"),
                ));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush file data to stable storage
    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|e| Error::io(&self.name, 0, e))
    }

    /// Release the OS lock; the handle closes when dropped
    pub fn unlock(&self) -> Result<()> {
        LockExt::unlock(&self.file).map_err(|e| Error::io(&self.name, 0, e))
    }
}

/// Last path component, falling back to the full path
pub fn store_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(unix)]
fn positioned_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(unix)]
fn positioned_write(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(data, offset)
}

#[cfg(windows)]
fn positioned_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(windows)]
fn positioned_write(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(data, offset)
}

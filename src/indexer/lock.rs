//! Single-writer enforcement across processes (spec §5 "single-writer
//! catalog"), ported from the upstream multi-instance writer lock: a
//! `.writer.lock` file under the index root, held via `fs2`'s non-blocking
//! exclusive file lock for as long as the holding process runs.

use std::fs::File;
use std::path::Path;

use fs2::FileExt;
use tracing::debug;

use crate::constants::WRITER_LOCK_FILE;

/// Holds the writer lock for as long as this value lives; dropping it
/// releases the OS-level file lock.
pub struct WriterLock {
    _file: File,
}

/// Try to become the writer for `index_root`. Returns `None` if another
/// process already holds the lock, in which case the caller should fall
/// back to read-only operation (search still works against the existing
/// snapshot; indexing does not start).
pub fn acquire_writer_lock(index_root: &Path) -> Option<WriterLock> {
    let lock_path = index_root.join(WRITER_LOCK_FILE);
    let file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .ok()?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            debug!("writer lock acquired at {}", lock_path.display());
            Some(WriterLock { _file: file })
        }
        Err(e) => {
            debug!("writer lock held by another process: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let first = acquire_writer_lock(dir.path());
        assert!(first.is_some());
        let second = acquire_writer_lock(dir.path());
        assert!(second.is_none());
        drop(first);
        let third = acquire_writer_lock(dir.path());
        assert!(third.is_some());
    }
}

//! Backup-guarded rewrite of the primary store file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tracing::{error, warn};

use crate::StoreError;

/// Rewrite `primary` using `write`, keeping a copy of the old content at `backup`
/// until the new content is fully written and synced.
///
/// On failure the primary is restored from the backup and the write error is
/// returned. If the restore fails as well the result is
/// [`StoreError::Unrecoverable`].
pub fn write_with_backup<F>(primary: &Path, backup: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let had_primary = primary.exists();
    if had_primary {
        fs::copy(primary, backup)?;
    }

    let outcome = File::create(primary).and_then(|mut file| {
        write(&mut file)?;
        file.flush()?;
        file.sync_all()
    });

    match outcome {
        Ok(()) => {
            if backup.exists() {
                if let Err(cleanup) = fs::remove_file(backup) {
                    // Stale backup is harmless: the primary is complete and wins on load.
                    warn!(path = %backup.display(), error = %cleanup, "failed to remove store backup");
                }
            }
            Ok(())
        }
        Err(write_error) => {
            error!(path = %primary.display(), error = %write_error, "store write error");
            if had_primary {
                if let Err(restore_error) = fs::rename(backup, primary) {
                    error!(
                        path = %primary.display(),
                        error = %restore_error,
                        "failed to restore store from backup"
                    );
                    return Err(StoreError::Unrecoverable {
                        write: write_error,
                        restore: restore_error,
                    });
                }
            } else {
                let _ = fs::remove_file(primary);
            }
            Err(StoreError::WriteFailed {
                source: write_error,
            })
        }
    }
}

/// Serialize `value` pretty-printed and write it through [`write_with_backup`].
pub fn write_json<T>(primary: &Path, backup: &Path, value: &T) -> Result<(), StoreError>
where
    T: serde::Serialize + ?Sized,
{
    let bytes = serde_json::to_vec_pretty(value)?;
    write_with_backup(primary, backup, |file| file.write_all(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn successful_write_replaces_content_and_removes_backup() {
        let temp = tempdir().expect("tempdir");
        let primary = temp.path().join("db.json");
        let backup = temp.path().join("db.backup.json");
        fs::write(&primary, b"{\"old\":true}").expect("seed primary");

        write_with_backup(&primary, &backup, |file| file.write_all(b"{\"new\":true}"))
            .expect("write succeeds");

        assert_eq!(fs::read(&primary).expect("read"), b"{\"new\":true}");
        assert!(!backup.exists());
    }

    #[test]
    fn interrupted_write_restores_previous_content() {
        let temp = tempdir().expect("tempdir");
        let primary = temp.path().join("db.json");
        let backup = temp.path().join("db.backup.json");
        fs::write(&primary, b"{\"old\":true}").expect("seed primary");

        let error = write_with_backup(&primary, &backup, |file| {
            file.write_all(b"{\"new\":")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        })
        .expect_err("write should fail");

        assert!(matches!(error, StoreError::WriteFailed { .. }));
        assert!(!error.is_fatal());
        assert_eq!(fs::read(&primary).expect("read"), b"{\"old\":true}");
        assert!(!backup.exists());
    }

    #[test]
    fn failed_first_write_leaves_no_partial_primary() {
        let temp = tempdir().expect("tempdir");
        let primary = temp.path().join("db.json");
        let backup = temp.path().join("db.backup.json");

        let _ = write_with_backup(&primary, &backup, |file| {
            file.write_all(b"{\"half")?;
            Err(io::Error::new(io::ErrorKind::Other, "interrupted"))
        });

        assert!(!primary.exists());
        assert!(!backup.exists());
    }
}

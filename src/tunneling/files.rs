use std::io;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;

/// appended to the config path to name its backup
pub const BACKUP_SUFFIX: &str = ".backup";

/// Filesystem access needed by a switch, so tests can run without touching disk.
#[cfg_attr(test, automock)]
pub(crate) trait ConfigFiles: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    /// raw bytes, the file may carry any code page
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
}

pub(crate) fn backup_path(config: &Path) -> PathBuf {
    let mut raw = config.as_os_str().to_owned();
    raw.push(BACKUP_SUFFIX);
    PathBuf::from(raw)
}

pub struct FsConfigFiles;

impl ConfigFiles for FsConfigFiles {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::copy(from, to).map(|_| ())
    }
}

/// In-memory files with switchable failures, shared by the switch and shell tests.
#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use super::ConfigFiles;

    #[derive(Default)]
    pub(crate) struct MemoryFiles {
        files: Mutex<HashMap<PathBuf, Vec<u8>>>,
        pub fail_copy: AtomicBool,
        pub fail_write: AtomicBool,
    }

    impl MemoryFiles {
        pub fn with_file(path: &Path, contents: impl AsRef<[u8]>) -> Self {
            let files = MemoryFiles::default();
            files.put(path, contents.as_ref());
            files
        }

        pub fn put(&self, path: &Path, contents: &[u8]) {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), contents.to_vec());
        }

        pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(path).cloned()
        }

        /// `get` for tests that only deal in UTF-8 content
        pub fn text(&self, path: &Path) -> Option<String> {
            self.get(path).map(|raw| String::from_utf8(raw).unwrap())
        }
    }

    fn injected(what: &str) -> io::Error {
        io::Error::new(io::ErrorKind::PermissionDenied, format!("{what} refused"))
    }

    impl ConfigFiles for MemoryFiles {
        fn exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.get(path)
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }

        fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            if self.fail_write.load(Ordering::SeqCst) {
                return Err(injected("write"));
            }
            self.put(path, contents);
            Ok(())
        }

        fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
            // only the backup direction fails, restoring still works
            let to_backup = to.to_string_lossy().ends_with(super::BACKUP_SUFFIX);
            if self.fail_copy.load(Ordering::SeqCst) && to_backup {
                return Err(injected("copy"));
            }
            let contents = self.read(from)?;
            self.put(to, &contents);
            Ok(())
        }
    }

    /// Lets a test keep a handle on the files it gave away.
    impl ConfigFiles for Arc<MemoryFiles> {
        fn exists(&self, path: &Path) -> bool {
            self.as_ref().exists(path)
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.as_ref().read(path)
        }

        fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            self.as_ref().write(path, contents)
        }

        fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.as_ref().copy(from, to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_path_appends_suffix_test() {
        assert_eq!(
            backup_path(Path::new("/etc/stunnel/stunnel.conf")),
            PathBuf::from("/etc/stunnel/stunnel.conf.backup")
        );
    }

    #[test]
    fn fs_copy_is_byte_identical_test() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("stunnel.conf");
        let contents = "client = yes\r\nconnect=1.2.3.4:443\r\n";
        std::fs::write(&config, contents).unwrap();

        let files = FsConfigFiles;
        assert!(files.exists(&config));
        files.copy(&config, &backup_path(&config)).unwrap();
        assert_eq!(
            std::fs::read(backup_path(&config)).unwrap(),
            contents.as_bytes()
        );
    }

    #[test]
    fn fs_round_trip_keeps_non_utf8_bytes_test() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("stunnel.conf");
        let contents: &[u8] = b"; \xd1\xe5\xf0\xe2\xe5\xf0\nconnect=1.2.3.4:443\n";

        let files = FsConfigFiles;
        files.write(&config, contents).unwrap();
        assert_eq!(files.read(&config).unwrap(), contents);
    }

    #[test]
    fn fs_exists_rejects_directories_test() {
        let dir = tempfile::tempdir().unwrap();
        let files = FsConfigFiles;
        assert!(!files.exists(dir.path()));
        assert!(!files.exists(&dir.path().join("missing.conf")));
    }
}

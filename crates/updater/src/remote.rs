use config::RemoteConfig;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Access to the remote store holding every built version of a domain.
///
/// Paths are relative to the domain's remote root, `<partition>/<file>`
/// (see [`remote_path`]). Implementations must be usable from several
/// partition updaters at once.
pub trait RemoteFileOps: Send + Sync {
    fn input_stream(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    fn output_stream(&self, path: &str) -> io::Result<Box<dyn Write + Send>>;

    fn exists(&self, path: &str) -> io::Result<bool>;

    /// Copies a remote file into `local_root`, keeping its file name, and
    /// returns the local path.
    fn copy_to_local_root(&self, path: &str, local_root: &Path) -> io::Result<PathBuf>;

    /// Deletes a remote file. `Ok(false)` if there was nothing to delete.
    fn attempt_delete(&self, path: &str) -> io::Result<bool>;

    /// Fully qualified location, for logs and error messages.
    fn remote_absolute_path(&self, path: &str) -> String;
}

/// Relative remote path of a partition's file.
#[must_use]
pub fn remote_path(partition: u32, file_name: &str) -> String {
    format!("{}/{}", partition, file_name)
}

/// Builds the file-ops implementation selected in the config.
#[must_use]
pub fn from_config(remote: &RemoteConfig) -> Arc<dyn RemoteFileOps> {
    match remote {
        RemoteConfig::Local { root } => Arc::new(LocalFileOps::new(root)),
    }
}

/// Remote store reachable as a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalFileOps {
    root: PathBuf,
}

impl LocalFileOps {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let rel = Path::new(path);
        let escapes = rel
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
        if rel.is_absolute() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("remote path {:?} escapes the remote root", path),
            ));
        }
        Ok(self.root.join(rel))
    }
}

impl RemoteFileOps for LocalFileOps {
    fn input_stream(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(self.resolve(path)?)?))
    }

    fn output_stream(&self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        let f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(full)?;
        Ok(Box::new(f))
    }

    fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn copy_to_local_root(&self, path: &str, local_root: &Path) -> io::Result<PathBuf> {
        let src = self.resolve(path)?;
        let name = src.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("remote path {:?} has no file name", path),
            )
        })?;
        let dst = local_root.join(name);
        fs::copy(&src, &dst)?;
        Ok(dst)
    }

    fn attempt_delete(&self, path: &str) -> io::Result<bool> {
        match fs::remove_file(self.resolve(path)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn remote_absolute_path(&self, path: &str) -> String {
        self.root.join(path).display().to_string()
    }
}

use super::FileOps;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// [`FileOps`] over a directory of the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileOps {
    root: PathBuf,
}

impl LocalFileOps {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        if name.is_empty() {
            self.root.clone()
        } else {
            self.root.join(name)
        }
    }

    fn create_parent(path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) => fs::create_dir_all(parent),
            None => Ok(()),
        }
    }
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl FileOps for LocalFileOps {
    fn create_folder(&self, name: &str) -> io::Result<()> {
        let path = self.resolve(name);
        if path.is_file() {
            fs::remove_file(&path)?;
        }
        fs::create_dir_all(path)
    }

    fn copy_file(&self, source: &Path, target: &str, overwrite: bool) -> io::Result<()> {
        let path = self.resolve(target);
        Self::create_parent(&path)?;
        if overwrite {
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            }
            fs::copy(source, &path)?;
            return Ok(());
        }

        let mut input = fs::File::open(source)?;
        let mut output = OpenOptions::new().write(true).create_new(true).open(&path)?;
        io::copy(&mut input, &mut output)?;
        Ok(())
    }

    fn delete(&self, name: &str, is_directory: bool) -> io::Result<()> {
        let path = self.resolve(name);
        if is_directory {
            ignore_not_found(fs::remove_dir_all(path))
        } else {
            ignore_not_found(fs::remove_file(path))
        }
    }

    fn move_or_rename(&self, from: &str, to: &str) -> io::Result<()> {
        let target = self.resolve(to);
        if target.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{}' already exists", target.display()),
            ));
        }
        Self::create_parent(&target)?;
        fs::rename(self.resolve(from), target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_without_overwrite_refuses_existing_target() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"new").unwrap();
        fs::write(dst.path().join("a.txt"), b"old").unwrap();

        let ops = LocalFileOps::new(dst.path());
        let err = ops
            .copy_file(&src.path().join("a.txt"), "a.txt", false)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        ops.copy_file(&src.path().join("a.txt"), "a.txt", true).unwrap();
        assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_copy_creates_missing_parents() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"x").unwrap();

        let ops = LocalFileOps::new(dst.path());
        ops.copy_file(&src.path().join("a.txt"), "deep/er/a.txt", false).unwrap();
        assert!(dst.path().join("deep/er/a.txt").is_file());
    }

    #[test]
    fn test_move_creates_parents_and_refuses_to_clobber() {
        let dst = tempfile::tempdir().unwrap();
        fs::write(dst.path().join("a.txt"), b"x").unwrap();
        fs::write(dst.path().join("b.txt"), b"y").unwrap();

        let ops = LocalFileOps::new(dst.path());
        ops.move_or_rename("a.txt", "new/place/a.txt").unwrap();
        assert!(dst.path().join("new/place/a.txt").is_file());
        assert!(!dst.path().join("a.txt").exists());

        let err = ops.move_or_rename("b.txt", "new/place/a.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_delete_absent_path_is_ok() {
        let dst = tempfile::tempdir().unwrap();
        let ops = LocalFileOps::new(dst.path());
        ops.delete("missing.txt", false).unwrap();
        ops.delete("missing-dir", true).unwrap();
    }

    #[test]
    fn test_delete_folder_is_recursive() {
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(dst.path().join("d/e")).unwrap();
        fs::write(dst.path().join("d/e/f.txt"), b"x").unwrap();
        let ops = LocalFileOps::new(dst.path());
        ops.delete("d", true).unwrap();
        assert!(!dst.path().join("d").exists());
    }
}

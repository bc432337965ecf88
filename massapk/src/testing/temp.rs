use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use rstest::fixture;
use tempfile::TempDir;

/// A scratch directory that is removed when the root is dropped
pub struct TmpDir {
    temp_dir: PathBuf,
    _root: Option<TempDir>,
}

impl TmpDir {
    pub fn get_path(&self) -> &PathBuf {
        &self.temp_dir
    }

    pub fn create_dir(&self, name: &str) -> TmpDir {
        let path = self.temp_dir.join(name);
        fs::create_dir_all(&path).expect("failed to make temp directory");
        TmpDir {
            temp_dir: path,
            _root: None,
        }
    }

    pub fn create_file_name(&self, name: &str, content: Option<&str>) -> PathBuf {
        let path = self.temp_dir.join(name);

        let parent = path.parent().unwrap();

        if !parent.exists() {
            fs::create_dir_all(parent).expect("failed to create directories for new file");
        }

        match content {
            Some(content) => {
                fs::write(&path, content).expect("failed to make temp file with content")
            }
            None => {
                _ = OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&path)
                    .expect("failed to make empty temp file")
            }
        }
        path
    }
}

#[fixture]
pub fn tmp_dir() -> TmpDir {
    let root = tempfile::Builder::new()
        .prefix("massapk_test_")
        .tempdir()
        .expect("failed to create temp dir");
    TmpDir {
        temp_dir: root.path().to_path_buf(),
        _root: Some(root),
    }
}

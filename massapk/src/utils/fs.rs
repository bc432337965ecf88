use std::borrow::Cow;
use std::fs::{self, create_dir_all};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Extension of installable package files
pub const APK_EXT: &'static str = "apk";

pub fn ensure_dir_exists(p: &Path) -> io::Result<()> {
    if p.exists() {
        return Ok(());
    }

    create_dir_all(p)
}

pub fn path_has_ext<P: AsRef<Path> + ?Sized>(p: &P, ext: &str) -> bool {
    let path = p.as_ref();
    path.extension().map_or(false, |it| it == ext)
}

/// Lossy string form of a path for messages and command arguments
pub fn path_str(path: &Path) -> Cow<'_, str> {
    path.to_string_lossy()
}

pub fn read_file(path: &Path) -> crate::Result<String> {
    match fs::read_to_string(path) {
        Ok(v) => Ok(v),
        Err(e) => match e.kind() {
            ErrorKind::NotFound => Err(crate::Error::MissingFile(path_str(path).into_owned())),
            _ => Err(e.into()),
        },
    }
}

/// Replaces spaces with underscores so the name is safe to use as an unquoted
/// command line argument. Names without spaces are returned unchanged.
pub fn normalize_file_name(name: &str) -> Cow<'_, str> {
    if name.contains(' ') {
        Cow::Owned(name.replace(' ', "_"))
    } else {
        Cow::Borrowed(name)
    }
}

/// Lists the package files (by extension) directly inside `dir`, sorted by
/// name.
pub fn get_apks(dir: &Path) -> crate::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(crate::Error::NotADirectory(dir.into()));
    }

    let mut apks = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path_has_ext(&path, APK_EXT) {
            apks.push(path);
        }
    }
    apks.sort();
    Ok(apks)
}

/// Renames every package file in `dir` whose name contains spaces using
/// [normalize_file_name]. Returns the number of renamed files.
pub fn normalize_apk_names(dir: &Path) -> crate::Result<usize> {
    let mut renamed = 0;

    for apk in get_apks(dir)? {
        let name = match apk.file_name() {
            Some(v) => v.to_string_lossy().into_owned(),
            None => continue,
        };

        let normalized = normalize_file_name(&name);
        if let Cow::Owned(new_name) = normalized {
            let target = dir.join(&new_name);
            if target.exists() {
                return Err(crate::Error::Generic(format!(
                    "can't rename {} to {}, target already exists",
                    name, new_name
                )));
            }
            log::debug!("renaming {} to {}", name, new_name);
            fs::rename(&apk, &target)?;
            renamed += 1;
        }
    }

    Ok(renamed)
}

/// Moves a file, falling back to copy and delete when a rename isn't possible
/// (different filesystems for example)
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(_) => Ok(()),
        Err(e) => {
            log::debug!("rename {:?} -> {:?} failed ({}), copying", from, to, e);
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// Removes a file or a directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        Ok(())
    }
}

/// Sum of the sizes of the given files in bytes
pub fn total_size(files: &[PathBuf]) -> io::Result<u64> {
    let mut size = 0;
    for f in files {
        size += fs::metadata(f)?.len();
    }
    Ok(size)
}

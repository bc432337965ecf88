//! Zip archives of backup folders.
//!
//! Archives are flat: one entry per file directly inside the backed up
//! folder, named after the file.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::utils::{ensure_dir_exists, path_str};

/// Creates `zip_path` containing every regular file in `dir`. Returns the
/// number of entries written.
pub fn make_zip(dir: &Path, zip_path: &Path) -> crate::Result<usize> {
    if !dir.is_dir() {
        return Err(crate::Error::NotADirectory(dir.into()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        } else {
            log::warn!("skipping {:?} while zipping, not a file", path);
        }
    }
    files.sort();

    let out = File::create(zip_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for path in files.iter() {
        let name = match path.file_name() {
            Some(v) => v.to_string_lossy().into_owned(),
            None => continue,
        };
        log::trace!("adding {} to {}", name, path_str(zip_path));
        zip.start_file(name, options)?;
        let mut reader = BufReader::new(File::open(path)?);
        io::copy(&mut reader, &mut zip)?;
    }

    let writer = zip.finish()?;
    writer.into_inner().map_err(|e| e.into_error())?;
    Ok(files.len())
}

/// Extracts `zip_path` into `dest`, creating it if needed. Entries that would
/// land outside of `dest` are rejected. Returns the extracted file paths.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> crate::Result<Vec<PathBuf>> {
    let file = File::open(zip_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => crate::Error::MissingFile(path_str(zip_path).into_owned()),
        _ => e.into(),
    })?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    ensure_dir_exists(dest)?;

    let mut extracted = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let rel = match entry.enclosed_name() {
            Some(v) => v,
            None => {
                return Err(crate::Error::Archive(format!(
                    "entry {} escapes the extraction directory",
                    entry.name()
                )))
            }
        };
        let target = dest.join(rel);

        if entry.is_dir() {
            ensure_dir_exists(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            ensure_dir_exists(parent)?;
        }
        copy_flushed(&mut entry, BufWriter::new(File::create(&target)?))?;
        extracted.push(target);
    }

    Ok(extracted)
}

/// Copies everything from `reader` and flushes `out`, so a failed final
/// write surfaces instead of being dropped with the buffer.
fn copy_flushed<R: Read, W: Write>(reader: &mut R, mut out: W) -> io::Result<u64> {
    let n = io::copy(reader, &mut out)?;
    out.flush()?;
    Ok(n)
}

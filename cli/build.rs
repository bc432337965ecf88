use std::borrow::Cow;
use std::{
    env,
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
    process::Command,
};

fn main() {
    match write_version_file() {
        Ok(_) => {}
        Err(e) => panic!("Failed to create a version file: {:?}", e),
    }
    println!("cargo:rerun-if-env-changed=MASSAPK_GIT_REVISION");
}

fn out_dir() -> PathBuf {
    PathBuf::from(env::var("OUT_DIR").unwrap())
}

fn write_version_file() -> io::Result<()> {
    let version = env::var("CARGO_PKG_VERSION").unwrap();
    let mut simple_version_file = File::create(out_dir().join("simple_version_string"))?;
    write!(&mut simple_version_file, "\"{}\"", version)?;

    let target = env::var("TARGET").unwrap();
    let mut version_file = File::create(out_dir().join("version_string"))?;
    let git_rev = match get_git_rev() {
        Ok(v) if !v.trim().is_empty() => Cow::Owned(v),
        _ => Cow::Borrowed("unknown"),
    };
    write!(
        &mut version_file,
        "r#\"massapk {} ({})\nrev {}\"#",
        version,
        target,
        git_rev.trim(),
    )?;
    Ok(())
}

fn get_git_rev() -> io::Result<String> {
    if let Ok(rev) = env::var("MASSAPK_GIT_REVISION") {
        return Ok(rev);
    }
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    Command::new("git")
        .arg("-C")
        .arg(Path::new(&manifest_dir))
        .arg("rev-parse")
        .arg("HEAD")
        .output()
        .and_then(|out| {
            if !out.status.success() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "git rev-parse HEAD failed",
                ));
            }
            String::from_utf8(out.stdout).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "git rev-parse HEAD output was not UTF-8",
                )
            })
        })
}

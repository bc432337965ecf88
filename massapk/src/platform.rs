use std::fmt;
use std::path::{Path, PathBuf};

/// Host operating systems the device bridge is shipped for.
///
/// Detected once at startup and handed to whatever needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn detect() -> crate::Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> crate::Result<Self> {
        match os {
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::MacOs),
            "windows" => Ok(Self::Windows),
            other => Err(crate::Error::UnsupportedPlatform(other.into())),
        }
    }

    /// Name of the bundled binaries directory
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "osx",
            Self::Windows => "win",
        }
    }

    pub fn adb_executable_name(&self) -> &'static str {
        match self {
            Self::Windows => "adb.exe",
            _ => "adb",
        }
    }

    /// Location of an adb binary shipped next to the program:
    /// `<base>/bin/<platform>/adb`
    pub fn bundled_adb(&self, base: &Path) -> PathBuf {
        base.join("bin")
            .join(self.dir_name())
            .join(self.adb_executable_name())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linux => "Linux",
            Self::MacOs => "macOS",
            Self::Windows => "Windows",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("linux", Platform::Linux)]
    #[case("macos", Platform::MacOs)]
    #[case("windows", Platform::Windows)]
    fn test_from_os(#[case] os: &str, #[case] expected: Platform) {
        assert_eq!(Platform::from_os(os).expect("supported"), expected);
    }

    #[test]
    fn test_unsupported() {
        assert!(matches!(
            Platform::from_os("freebsd"),
            Err(crate::Error::UnsupportedPlatform(os)) if os == "freebsd"
        ));
    }

    #[test]
    fn test_bundled_adb() {
        let base = Path::new("/opt/massapk");
        assert_eq!(
            Platform::Windows.bundled_adb(base),
            base.join("bin").join("win").join("adb.exe")
        );
        assert_eq!(
            Platform::MacOs.bundled_adb(base),
            base.join("bin").join("osx").join("adb")
        );
    }
}

use std::borrow::Cow;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use toml::{Table, Value};

use crate::adb::PackageFilter;
use crate::tasks::WaitPolicy;
use crate::utils::{path_str, read_file};

/// Name of the configuration file inside the user config directory
pub const CONFIG_FILE_NAME: &'static str = "massapk.toml";

#[derive(Debug)]
pub enum Error {
    InvalidType,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::InvalidType => "InvalidType",
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A view into one table of a parsed configuration file
pub struct ConfigMap<'c> {
    path: &'c Path,
    name: Option<Cow<'c, str>>,
    table: &'c Table,
}

/// Device bridge settings from the `[adb]` table
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdbConfig {
    pub executable: Option<String>,
    pub serial: Option<String>,
}

/// Typed configuration
///
/// ```toml
/// [adb]
/// executable = "/opt/platform-tools/adb"
/// serial = "emulator-5554"
///
/// [connection]
/// poll-interval-ms = 1000
/// timeout-secs = 0
///
/// [backup]
/// filter = "USER"
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    path: PathBuf,
    pub adb: AdbConfig,
    pub wait_policy: WaitPolicy,
    pub backup_filter: Option<PackageFilter>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            adb: AdbConfig::default(),
            wait_policy: WaitPolicy::default(),
            backup_filter: None,
        }
    }
}

impl Config {
    pub fn parse(source: &Path) -> crate::Result<Self> {
        let as_str = read_file(source)?;
        Self::parse_str(source, &as_str)
    }

    /// Parse configuration content, `source` is only used for error messages
    pub fn parse_str(source: &Path, content: &str) -> crate::Result<Self> {
        let table: Table = match content.parse() {
            Ok(v) => v,
            Err(e) => return Err(crate::Error::new_cfg(source, &e)),
        };

        let base = ConfigMap {
            name: None,
            path: source,
            table: &table,
        };

        let mut cfg = Config {
            path: PathBuf::from(source),
            ..Default::default()
        };

        if let Some(adb) = base.maybe_get_map_typecheck("adb")? {
            cfg.adb.executable = adb.maybe_get_str_typecheck("executable")?.map(String::from);
            cfg.adb.serial = adb.maybe_get_str_typecheck("serial")?.map(String::from);
        }

        if let Some(conn) = base.maybe_get_map_typecheck("connection")? {
            if let Some(ms) = conn.maybe_get_int_typecheck("poll-interval-ms")? {
                let ms = u64::try_from(ms).map_err(|_| conn.invalid_key("poll-interval-ms", "positive int"))?;
                if ms == 0 {
                    return Err(conn.invalid_key("poll-interval-ms", "positive int"));
                }
                cfg.wait_policy.interval = Duration::from_millis(ms);
            }
            if let Some(secs) = conn.maybe_get_int_typecheck("timeout-secs")? {
                let secs = u64::try_from(secs).map_err(|_| conn.invalid_key("timeout-secs", "positive int"))?;
                cfg.wait_policy.timeout = if secs == 0 {
                    None
                } else {
                    Some(Duration::from_secs(secs))
                };
            }
        }

        if let Some(backup) = base.maybe_get_map_typecheck("backup")? {
            if let Some(filter) = backup.maybe_get_str_typecheck("filter")? {
                let parsed = PackageFilter::from_str(filter)
                    .map_err(|_| backup.invalid_key("filter", "ALL, USER or SYSTEM"))?;
                cfg.backup_filter = Some(parsed);
            }
        }

        Ok(cfg)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<'c> ConfigMap<'c> {
    fn get_full_path<'a>(&'a self) -> Option<&'a str> {
        self.name.as_ref().map(|it| it.as_ref())
    }

    fn key_path<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match self.get_full_path() {
            None => Cow::Borrowed(key),
            Some(v) => Cow::Owned(format!("{}.{}", v, key)),
        }
    }

    /// Helper to create a crate::Error for an invalid key
    pub fn invalid_key(&self, key: &str, expected: &str) -> crate::Error {
        let path = self.key_path(key);
        crate::Error::InvalidConfig(
            path_str(self.path).into_owned(),
            format!(
                "invalid value for key: {} (expected type: {})",
                path, expected
            ),
        )
    }

    fn get(&self, key: &str) -> Option<&'c Value> {
        self.table.get(key)
    }

    pub fn maybe_get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            Some(v) => match v.as_integer() {
                Some(v) => Ok(Some(v)),
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_int_typecheck(&self, key: &str) -> crate::Result<Option<i64>> {
        self.maybe_get_int(key)
            .map_err(|_| self.invalid_key(key, "int"))
    }

    pub fn maybe_get_str(&self, key: &str) -> Result<Option<&'c str>> {
        match self.get(key) {
            Some(v) => match v.as_str() {
                Some(v) => Ok(Some(v)),
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_str_typecheck(&self, key: &str) -> crate::Result<Option<&'c str>> {
        self.maybe_get_str(key)
            .map_err(|_| self.invalid_key(key, "string"))
    }

    pub fn maybe_get_map(&self, key: &str) -> Result<Option<ConfigMap<'c>>> {
        match self.get(key) {
            Some(v) => match v.as_table() {
                Some(table) => {
                    let name = match &self.get_full_path() {
                        Some(parents) => format!("{parents}.{key}"),
                        None => key.to_string(),
                    };
                    Ok(Some(Self {
                        name: Some(Cow::Owned(name)),
                        path: self.path,
                        table,
                    }))
                }
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_map_typecheck(&self, key: &str) -> crate::Result<Option<ConfigMap<'c>>> {
        self.maybe_get_map(key)
            .map_err(|_| self.invalid_key(key, "table"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{tmp_dir, TmpDir};
    use rstest::*;

    fn parse(content: &str) -> crate::Result<Config> {
        Config::parse_str(Path::new("massapk.toml"), content)
    }

    #[test]
    fn test_full_config() {
        let cfg = parse(
            r#"
[adb]
executable = "/opt/adb"
serial = "emulator-5554"

[connection]
poll-interval-ms = 250
timeout-secs = 30

[backup]
filter = "system"
"#,
        )
        .expect("valid config");

        assert_eq!(cfg.adb.executable.as_deref(), Some("/opt/adb"));
        assert_eq!(cfg.adb.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(cfg.wait_policy.interval, Duration::from_millis(250));
        assert_eq!(cfg.wait_policy.timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.backup_filter, Some(PackageFilter::System));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse("").expect("empty config");
        assert_eq!(cfg.adb, AdbConfig::default());
        assert_eq!(cfg.wait_policy, WaitPolicy::default());
        assert_eq!(cfg.backup_filter, None);
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let cfg = parse("[connection]\ntimeout-secs = 0\n").expect("valid config");
        assert_eq!(cfg.wait_policy.timeout, None);
    }

    #[rstest]
    #[case("[adb]\nserial = 12\n", "adb.serial")]
    #[case("adb = \"nope\"\n", "adb")]
    #[case("[connection]\npoll-interval-ms = -5\n", "connection.poll-interval-ms")]
    #[case("[backup]\nfilter = \"everything\"\n", "backup.filter")]
    fn test_invalid_values(#[case] content: &str, #[case] key: &str) {
        match parse(content) {
            Err(crate::Error::InvalidConfig(file, msg)) => {
                assert_eq!(file, "massapk.toml");
                assert!(msg.contains(key), "{} doesn't mention {}", msg, key);
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("config should have been rejected"),
        }
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            parse("[adb\n"),
            Err(crate::Error::InvalidConfig(_, _))
        ));
    }

    #[rstest]
    fn test_parse_file(tmp_dir: TmpDir) {
        let file = tmp_dir.create_file_name(CONFIG_FILE_NAME, Some("[adb]\nserial = \"abc\"\n"));
        let cfg = Config::parse(&file).expect("parse file");
        assert_eq!(cfg.adb.serial.as_deref(), Some("abc"));
        assert_eq!(cfg.path(), file.as_path());

        let missing = tmp_dir.get_path().join("missing.toml");
        assert!(matches!(
            Config::parse(&missing),
            Err(crate::Error::MissingFile(_))
        ));
    }

    #[test]
    fn test_typecheck_names_full_key() {
        let table: Table = "name = \"x\"\nnum = 1\n".parse().unwrap();
        let map = ConfigMap {
            name: Some(Cow::Borrowed("root")),
            path: Path::new("cfg.toml"),
            table: &table,
        };
        assert_eq!(map.maybe_get_str_typecheck("name").unwrap(), Some("x"));
        assert_eq!(map.maybe_get_str_typecheck("other").unwrap(), None);
        match map.maybe_get_str_typecheck("num") {
            Err(crate::Error::InvalidConfig(file, msg)) => {
                assert_eq!(file, "cfg.toml");
                assert!(msg.contains("root.num"), "{}", msg);
            }
            _ => panic!("expected an invalid key error"),
        }
    }
}

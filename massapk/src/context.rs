use blanket::blanket;
use once_cell::sync::OnceCell;
use std::env;
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::BaseDirs;
use which::which;

use crate::config::{Config, CONFIG_FILE_NAME};
use crate::utils::path_str;
use crate::Error;

/// Env var pointing at a configuration file
pub const CONFIG_ENV: &'static str = "MASSAPK_CONFIG";

#[derive(Clone)]
struct CachedBin {
    name: String,
    path: String,
}

fn find_program(bin: &str) -> Option<String> {
    which(bin).ok().map(|it| path_str(&it).into_owned())
}

/// Context is a trait for an object that can find binaries, lookup env vars
/// and load the configuration.
///
/// Most methods on this trait have a default implementation that is perfectly
/// safe to leave unchanged.
#[blanket(derive(Ref, Box))]
pub trait Context: Send + Sync {
    /// The loaded configuration, defaults if there is no config file
    fn get_config(&self) -> crate::Result<&Config>;

    fn maybe_get_env(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn maybe_get_bin(&self, bin: &str) -> Option<String> {
        find_program(bin)
    }

    fn has_bin(&self, bin: &str) -> bool {
        self.maybe_get_bin(bin).is_some()
    }

    fn get_bin(&self, bin: &str) -> crate::Result<String> {
        self.maybe_get_bin(bin)
            .ok_or_else(|| Error::MissingBin(bin.into()))
    }

    fn has_env(&self, key: &str) -> bool {
        self.maybe_get_env(key).is_some()
    }

    fn get_env(&self, key: &str) -> crate::Result<String> {
        self.maybe_get_env(key)
            .ok_or_else(|| Error::MissingEnv(key.into()))
    }

    /// Directory containing the running executable
    fn get_exe_dir(&self) -> Option<PathBuf> {
        env::current_exe()
            .ok()
            .and_then(|it| it.parent().map(PathBuf::from))
    }

    fn get_user_config_dir(&self) -> crate::Result<PathBuf> {
        let bd = BaseDirs::new().ok_or(Error::NoBaseDirs)?;
        Ok(bd.config_dir().join("massapk"))
    }

    /// The configuration file to use: `MASSAPK_CONFIG` if set, otherwise
    /// `massapk.toml` in the user config directory
    fn get_config_file(&self) -> crate::Result<PathBuf> {
        if let Some(path) = self.maybe_get_env(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        self.get_user_config_dir().map(|it| it.join(CONFIG_FILE_NAME))
    }
}

pub struct DefaultContext {
    config_file: Option<PathBuf>,
    bin_cache: Mutex<Vec<CachedBin>>,
    config: OnceCell<Config>,
}

impl DefaultContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given configuration file instead of looking one up. Unlike a
    /// looked up file, this one has to exist.
    pub fn with_config_file(mut self, path: PathBuf) -> Self {
        self.config_file = Some(path);
        self
    }

    fn load_config(&self) -> crate::Result<Config> {
        match &self.config_file {
            Some(path) => Config::parse(path),
            None => load_config(self),
        }
    }
}

/// Loads the configuration `ctx` points at. A file named by `MASSAPK_CONFIG`
/// has to exist, only the one in the user config directory may be missing.
fn load_config(ctx: &dyn Context) -> crate::Result<Config> {
    if let Some(path) = ctx.maybe_get_env(CONFIG_ENV) {
        log::debug!("loading config from ${} = {}", CONFIG_ENV, path);
        return Config::parse(Path::new(&path));
    }

    let path = match ctx.get_user_config_dir() {
        Ok(v) => v.join(CONFIG_FILE_NAME),
        Err(Error::NoBaseDirs) => return Ok(Config::default()),
        Err(e) => return Err(e),
    };

    if !path.exists() {
        log::debug!("no config file at {:?}, using defaults", path);
        return Ok(Config::default());
    }
    log::debug!("loading config from {:?}", path);
    Config::parse(&path)
}

impl Default for DefaultContext {
    fn default() -> Self {
        Self {
            config_file: None,
            bin_cache: Mutex::new(Vec::new()),
            config: OnceCell::new(),
        }
    }
}

impl Context for DefaultContext {
    fn get_config(&self) -> crate::Result<&Config> {
        self.config.get_or_try_init(|| self.load_config())
    }

    fn get_config_file(&self) -> crate::Result<PathBuf> {
        if let Some(path) = &self.config_file {
            return Ok(path.clone());
        }
        if let Some(path) = self.maybe_get_env(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        self.get_user_config_dir().map(|it| it.join(CONFIG_FILE_NAME))
    }

    fn maybe_get_bin(&self, prog: &str) -> Option<String> {
        let mut cache_guard = match self.bin_cache.lock() {
            Ok(v) => v,
            Err(poisoned) => poisoned.into_inner(),
        };
        let cache = cache_guard.deref_mut();
        if let Some(val) = cache.iter().find(|it| it.name == prog) {
            return Some(val.path.clone());
        }

        let found = find_program(prog)?;

        cache.push(CachedBin {
            name: prog.into(),
            path: found.clone(),
        });

        Some(found)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{tmp_context, tmp_dir, TestContext, TmpDir};
    use rstest::*;

    #[rstest]
    fn test_explicit_config_file(tmp_dir: TmpDir) {
        let file = tmp_dir.create_file_name("custom.toml", Some("[adb]\nserial = \"xyz\"\n"));
        let ctx = DefaultContext::new().with_config_file(file.clone());
        assert_eq!(ctx.get_config_file().unwrap(), file);
        let cfg = ctx.get_config().expect("config");
        assert_eq!(cfg.adb.serial.as_deref(), Some("xyz"));
    }

    #[rstest]
    fn test_explicit_config_file_must_exist(tmp_dir: TmpDir) {
        let ctx = DefaultContext::new().with_config_file(tmp_dir.get_path().join("missing.toml"));
        assert!(matches!(ctx.get_config(), Err(Error::MissingFile(_))));
    }

    #[rstest]
    fn test_env_config_file_must_exist(mut tmp_context: TestContext) {
        let missing = tmp_context.get_exe_dir().unwrap().join("missing.toml");
        tmp_context.set_env(CONFIG_ENV, path_str(&missing));
        assert!(matches!(load_config(&tmp_context), Err(Error::MissingFile(_))));
    }

    #[rstest]
    fn test_env_config_file(mut tmp_context: TestContext, tmp_dir: TmpDir) {
        let file = tmp_dir.create_file_name("env.toml", Some("[adb]\nserial = \"from-env\"\n"));
        tmp_context.set_env(CONFIG_ENV, path_str(&file));
        let cfg = load_config(&tmp_context).expect("config");
        assert_eq!(cfg.adb.serial.as_deref(), Some("from-env"));
    }

    #[rstest]
    fn test_missing_user_config_uses_defaults(tmp_context: TestContext) {
        let cfg = load_config(&tmp_context).expect("config");
        assert!(cfg.adb.serial.is_none());
    }
}

use std::collections::HashMap;
use std::path::PathBuf;

use rstest::fixture;

use crate::config::Config;
use crate::testing::{tmp_dir, TmpDir};
use crate::Context;

#[fixture]
pub fn tmp_context() -> TestContext {
    TestContext::default()
}

/// A [Context] that never looks at the real environment. Env vars and
/// binaries have to be registered explicitly.
pub struct TestContext {
    base_dir: TmpDir,
    env: HashMap<String, String>,
    bins: HashMap<String, String>,
    config: Config,
}

impl TestContext {
    pub fn set_env<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) -> &mut Self {
        self.env.insert(key.as_ref().into(), value.as_ref().into());
        self
    }

    pub fn set_bin<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, bin: V) -> &mut Self {
        self.bins.insert(key.as_ref().into(), bin.as_ref().into());
        self
    }

    pub fn set_config(&mut self, config: Config) -> &mut Self {
        self.config = config;
        self
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self {
            base_dir: tmp_dir(),
            env: HashMap::new(),
            bins: HashMap::new(),
            config: Config::default(),
        }
    }
}

impl Context for TestContext {
    fn get_config(&self) -> crate::Result<&Config> {
        Ok(&self.config)
    }

    fn maybe_get_env(&self, key: &str) -> Option<String> {
        self.env.get(key).map(String::from)
    }

    fn maybe_get_bin(&self, bin: &str) -> Option<String> {
        self.bins.get(bin).map(String::from)
    }

    fn get_exe_dir(&self) -> Option<PathBuf> {
        Some(self.base_dir.get_path().clone())
    }

    fn get_user_config_dir(&self) -> crate::Result<PathBuf> {
        Ok(self.base_dir.get_path().join("config"))
    }
}

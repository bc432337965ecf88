use std::path::{Path, PathBuf};

use mockall::mock;
use rstest::fixture;

use crate::adb::{ConnectionState, InstallOutcome, PackageFilter};

mock! {
    pub Adb {}

    impl crate::adb::Adb for Adb {
        fn start_server(&self) -> crate::Result<()>;
        fn stop_server(&self) -> crate::Result<()>;
        fn connection_state(&self) -> ConnectionState;
        fn list_packages(&self, filter: PackageFilter) -> crate::Result<Vec<String>>;
        fn resolve_path(&self, package: &str) -> crate::Result<String>;
        fn pull(&self, device: &str, local_dir: &Path) -> crate::Result<PathBuf>;
        fn install(&self, apk: &Path) -> InstallOutcome;
    }
}

#[fixture]
pub fn mock_adb() -> MockAdb {
    MockAdb::new()
}

//! Install every package file of a backup folder, zip or encrypted zip.

use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

use crate::adb::{Adb, InstallOutcome};
use crate::archive::extract_zip;
use crate::crypto::{Envelope, ENCRYPTED_EXT};
use crate::tasks::{EventMonitor, PasswordSource, TaskCancelCheck};
use crate::utils::{
    get_apks, normalize_apk_names, path_has_ext, path_str, remove_path, total_size,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Folder,
    Zip,
    Encrypted,
}

impl ArtifactKind {
    /// Classifies a restore input. Anything that is neither a folder nor a
    /// known archive extension is rejected.
    pub fn classify(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(crate::Error::MissingFile(path_str(path).into_owned()));
        }
        if path.is_dir() {
            Ok(Self::Folder)
        } else if path_has_ext(path, "zip") {
            Ok(Self::Zip)
        } else if path_has_ext(path, ENCRYPTED_EXT) {
            Ok(Self::Encrypted)
        } else {
            Err(crate::Error::NotADirectory(path.into()))
        }
    }
}

pub struct Options {
    /// Folder, `.zip` or encrypted backup to restore
    pub path: PathBuf,

    /// Remove the extracted folder and decrypted zip when done
    pub clean: bool,
}

pub enum Event {
    Decrypting { path: PathBuf, zip: PathBuf },
    Extracting { zip: PathBuf, dest: PathBuf },
    Normalized { renamed: usize },
    PackagesFound { count: usize, total_bytes: u64 },
    Installing {
        index: usize,
        total: usize,
        file: PathBuf,
    },
    Installed { file: PathBuf, outcome: InstallOutcome },
    Removed { path: PathBuf },
}

/// Outcome counts of a restore
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub installed: usize,
    pub not_changed: usize,
    /// File names of failed installs
    pub failed: Vec<String>,
    /// File names whose install output wasn't recognized
    pub unrecognized: Vec<String>,
}

impl Summary {
    pub fn record(&mut self, file: &Path, outcome: InstallOutcome) {
        let name = || {
            file.file_name()
                .map(|it| it.to_string_lossy().into_owned())
                .unwrap_or_else(|| path_str(file).into_owned())
        };
        match outcome {
            InstallOutcome::Success => self.installed += 1,
            InstallOutcome::AlreadyExists => self.not_changed += 1,
            InstallOutcome::Failure => self.failed.push(name()),
            InstallOutcome::Unknown => self.unrecognized.push(name()),
        }
    }

    pub fn total(&self) -> usize {
        self.installed + self.not_changed + self.failed.len() + self.unrecognized.len()
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Installed:{} | Not Changed:{} | Failed:{}",
            self.installed,
            self.not_changed,
            self.failed.len()
        )?;
        if !self.unrecognized.is_empty() {
            write!(f, " | Unrecognized:{}", self.unrecognized.len())?;
        }
        Ok(())
    }
}

/// Restores a backup onto the connected device.
///
/// Individual install failures are counted in the returned [Summary]. With
/// `clean` set, intermediates created by this run are removed even when the
/// run fails. The input path itself is never removed.
pub fn restore(
    adb: &dyn Adb,
    opts: &Options,
    passwords: &dyn PasswordSource,
    monitor: &dyn EventMonitor<Event>,
    cancel: &TaskCancelCheck,
) -> crate::Result<Summary> {
    let mut created = Vec::new();

    let res = resolve_folder(&opts.path, passwords, monitor, &mut created)
        .and_then(|folder| install_all(adb, &folder, monitor, cancel));

    if opts.clean {
        for path in created.iter().filter(|it| it.exists()) {
            log::info!("removing {}", path_str(path));
            match remove_path(path) {
                Ok(_) => monitor.on_event(Event::Removed { path: path.clone() }),
                Err(e) => log::warn!("failed to remove {}: {}", path_str(path), e),
            }
        }
    }

    res
}

/// Turns the input into a folder of package files, recording everything it
/// creates in `created`
fn resolve_folder(
    path: &Path,
    passwords: &dyn PasswordSource,
    monitor: &dyn EventMonitor<Event>,
    created: &mut Vec<PathBuf>,
) -> crate::Result<PathBuf> {
    let zip = match ArtifactKind::classify(path)? {
        ArtifactKind::Folder => return Ok(path.into()),
        ArtifactKind::Zip => path.to_path_buf(),
        ArtifactKind::Encrypted => {
            let zip = path.with_extension("zip");
            if zip.exists() {
                return Err(crate::Error::BackupExists(zip));
            }
            let password = passwords.get_password(path)?;
            monitor.on_event(Event::Decrypting {
                path: path.into(),
                zip: zip.clone(),
            });
            Envelope::new(password).decrypt_file(path, &zip)?;
            created.push(zip.clone());
            zip
        }
    };

    let dest = zip.with_extension("");
    if dest.exists() && !dest.is_dir() {
        return Err(crate::Error::NotADirectory(dest));
    }
    if !dest.exists() {
        created.push(dest.clone());
    }
    monitor.on_event(Event::Extracting {
        zip: zip.clone(),
        dest: dest.clone(),
    });
    let files = extract_zip(&zip, &dest)?;
    log::info!("extracted {} files to {}", files.len(), path_str(&dest));
    Ok(dest)
}

fn install_all(
    adb: &dyn Adb,
    folder: &Path,
    monitor: &dyn EventMonitor<Event>,
    cancel: &TaskCancelCheck,
) -> crate::Result<Summary> {
    let renamed = normalize_apk_names(folder)?;
    if renamed > 0 {
        monitor.on_event(Event::Normalized { renamed });
    }

    let apks = get_apks(folder)?;
    let total = apks.len();
    monitor.on_event(Event::PackagesFound {
        count: total,
        total_bytes: total_size(&apks)?,
    });

    let mut summary = Summary::default();
    for (i, apk) in apks.iter().enumerate() {
        cancel.check()?;
        monitor.on_event(Event::Installing {
            index: i + 1,
            total,
            file: apk.clone(),
        });
        let outcome = adb.install(apk);
        summary.record(apk, outcome);
        monitor.on_event(Event::Installed {
            file: apk.clone(),
            outcome,
        });
    }

    log::info!("restore of {} finished: {}", path_str(folder), summary);
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::make_zip;
    use crate::tasks::{ChannelEventMonitor, NoPassword, NoopMonitor, TaskCanceller};
    use crate::testing::{mock_adb, tmp_dir, MockAdb, TmpDir};
    use rstest::*;

    fn backup_folder(tmp_dir: &TmpDir) -> TmpDir {
        let dir = tmp_dir.create_dir("2024-01-02_03-04-05");
        dir.create_file_name("com.skype.raider.apk", Some("skype"));
        dir.create_file_name("com.android.chrome.apk", Some("chrome"));
        dir.create_file_name("org.fdroid.apk", Some("fdroid"));
        dir
    }

    fn opts(path: &Path, clean: bool) -> Options {
        Options {
            path: path.into(),
            clean,
        }
    }

    #[rstest]
    fn test_restore_folder(mut mock_adb: MockAdb, tmp_dir: TmpDir) {
        let dir = backup_folder(&tmp_dir);
        mock_adb
            .expect_install()
            .times(3)
            .returning(|_| InstallOutcome::Success);
        let (mon, rx) = ChannelEventMonitor::create_with_bound(64);

        let summary = restore(
            &mock_adb,
            &opts(dir.get_path(), false),
            &NoPassword,
            &mon,
            &TaskCancelCheck::never(),
        )
        .expect("restore");

        assert_eq!(summary.to_string(), "Installed:3 | Not Changed:0 | Failed:0");
        assert_eq!(summary.total(), 3);
        assert!(dir.get_path().is_dir());

        let events = rx.try_iter().collect::<Vec<_>>();
        let found = events.iter().find_map(|evt| match evt {
            Event::PackagesFound { count, total_bytes } => Some((*count, *total_bytes)),
            _ => None,
        });
        assert_eq!(found, Some((3, 17)));
        let installing = events
            .iter()
            .filter_map(|evt| match evt {
                Event::Installing { index, total, file } => Some((*index, *total, file.clone())),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            installing,
            vec![
                (1, 3, dir.get_path().join("com.android.chrome.apk")),
                (2, 3, dir.get_path().join("com.skype.raider.apk")),
                (3, 3, dir.get_path().join("org.fdroid.apk")),
            ]
        );
    }

    #[rstest]
    fn test_restore_missing_path(mock_adb: MockAdb, tmp_dir: TmpDir) {
        // No install expectations, any install call fails the test
        let res = restore(
            &mock_adb,
            &opts(&tmp_dir.get_path().join("nope"), true),
            &NoPassword,
            &NoopMonitor,
            &TaskCancelCheck::never(),
        );
        assert!(matches!(res, Err(crate::Error::MissingFile(_))));
    }

    #[rstest]
    fn test_restore_not_a_backup(mock_adb: MockAdb, tmp_dir: TmpDir) {
        let file = tmp_dir.create_file_name("backup.tar", Some("x"));
        let res = restore(
            &mock_adb,
            &opts(&file, false),
            &NoPassword,
            &NoopMonitor,
            &TaskCancelCheck::never(),
        );
        assert!(matches!(res, Err(crate::Error::NotADirectory(_))));
    }

    #[rstest]
    fn test_restore_outcomes(mut mock_adb: MockAdb, tmp_dir: TmpDir) {
        let dir = tmp_dir.create_dir("mixed");
        dir.create_file_name("a.apk", Some("a"));
        dir.create_file_name("b.apk", Some("b"));
        dir.create_file_name("c.apk", Some("c"));
        dir.create_file_name("d.apk", Some("d"));
        dir.create_file_name("notes.txt", Some("ignored"));
        mock_adb.expect_install().times(4).returning(|apk| {
            match apk.file_name().and_then(|it| it.to_str()) {
                Some("a.apk") => InstallOutcome::Success,
                Some("b.apk") => InstallOutcome::AlreadyExists,
                Some("c.apk") => InstallOutcome::Failure,
                _ => InstallOutcome::Unknown,
            }
        });

        let summary = restore(
            &mock_adb,
            &opts(dir.get_path(), false),
            &NoPassword,
            &NoopMonitor,
            &TaskCancelCheck::never(),
        )
        .expect("restore");

        assert_eq!(
            summary.to_string(),
            "Installed:1 | Not Changed:1 | Failed:1 | Unrecognized:1"
        );
        assert_eq!(summary.failed, vec!["c.apk"]);
        assert_eq!(summary.unrecognized, vec!["d.apk"]);
    }

    #[rstest]
    fn test_restore_normalizes_names(mut mock_adb: MockAdb, tmp_dir: TmpDir) {
        let dir = tmp_dir.create_dir("spaces");
        dir.create_file_name("My App.apk", Some("app"));
        let expected = dir.get_path().join("My_App.apk");
        let check = expected.clone();
        mock_adb
            .expect_install()
            .withf(move |apk| apk == check.as_path())
            .times(1)
            .returning(|_| InstallOutcome::Success);

        restore(
            &mock_adb,
            &opts(dir.get_path(), false),
            &NoPassword,
            &NoopMonitor,
            &TaskCancelCheck::never(),
        )
        .expect("restore");
        assert!(expected.exists());
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_restore_zip(mut mock_adb: MockAdb, tmp_dir: TmpDir, #[case] clean: bool) {
        let dir = backup_folder(&tmp_dir);
        let zip = tmp_dir.get_path().join("2024-01-02_03-04-05.zip");
        make_zip(dir.get_path(), &zip).unwrap();
        std::fs::remove_dir_all(dir.get_path()).unwrap();

        mock_adb
            .expect_install()
            .times(3)
            .returning(|_| InstallOutcome::Success);

        let summary = restore(
            &mock_adb,
            &opts(&zip, clean),
            &NoPassword,
            &NoopMonitor,
            &TaskCancelCheck::never(),
        )
        .expect("restore");

        assert_eq!(summary.installed, 3);
        assert!(zip.exists());
        assert_eq!(dir.get_path().exists(), !clean);
    }

    #[rstest]
    fn test_restore_encrypted(mut mock_adb: MockAdb, tmp_dir: TmpDir) {
        let dir = backup_folder(&tmp_dir);
        let zip = tmp_dir.get_path().join("backup.zip");
        make_zip(dir.get_path(), &zip).unwrap();
        let encrypted = tmp_dir.get_path().join("backup.aes");
        Envelope::new("hunter2")
            .with_params(crate::crypto::KdfParams {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            })
            .encrypt_file(&zip, &encrypted)
            .unwrap();
        std::fs::remove_file(&zip).unwrap();

        mock_adb
            .expect_install()
            .times(3)
            .returning(|_| InstallOutcome::Success);

        let passwords = |p: &Path| -> crate::Result<String> {
            assert!(path_has_ext(p, ENCRYPTED_EXT));
            Ok("hunter2".into())
        };
        let summary = restore(
            &mock_adb,
            &opts(&encrypted, true),
            &passwords,
            &NoopMonitor,
            &TaskCancelCheck::never(),
        )
        .expect("restore");

        assert_eq!(summary.installed, 3);
        assert!(encrypted.exists());
        assert!(!zip.exists());
        assert!(!tmp_dir.get_path().join("backup").exists());
    }

    #[rstest]
    fn test_restore_wrong_password_cleans(mock_adb: MockAdb, tmp_dir: TmpDir) {
        let dir = backup_folder(&tmp_dir);
        let zip = tmp_dir.get_path().join("backup.zip");
        make_zip(dir.get_path(), &zip).unwrap();
        let encrypted = tmp_dir.get_path().join("backup.aes");
        Envelope::new("right")
            .with_params(crate::crypto::KdfParams {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            })
            .encrypt_file(&zip, &encrypted)
            .unwrap();
        std::fs::remove_file(&zip).unwrap();

        let passwords = |_: &Path| -> crate::Result<String> { Ok("wrong".into()) };
        let res = restore(
            &mock_adb,
            &opts(&encrypted, true),
            &passwords,
            &NoopMonitor,
            &TaskCancelCheck::never(),
        );
        assert!(matches!(res, Err(crate::Error::Decrypt)));
        assert!(!zip.exists());
    }

    #[rstest]
    fn test_restore_cancelled(mock_adb: MockAdb, tmp_dir: TmpDir) {
        let dir = backup_folder(&tmp_dir);
        let (canceller, check) = TaskCanceller::new();
        canceller.cancel();
        let res = restore(
            &mock_adb,
            &opts(dir.get_path(), false),
            &NoPassword,
            &NoopMonitor,
            &check,
        );
        assert!(matches!(res, Err(crate::Error::Cancelled)));
    }
}

//! Pull every installed package of a device into a timestamped folder,
//! optionally zipped and encrypted.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::adb::{Adb, PackageFilter};
use crate::archive::make_zip;
use crate::crypto::{Envelope, KdfParams, ENCRYPTED_EXT};
use crate::tasks::{EventMonitor, PasswordSource, TaskCancelCheck};
use crate::utils::{ensure_dir_exists, move_file, path_str, remove_path, APK_EXT};

/// Layout of the backup folder name
pub const DIR_NAME_FORMAT: &'static str = "%Y-%m-%d_%H-%M-%S";

/// Pulled files land here before being renamed into the backup folder
const STAGING_DIR: &'static str = ".pull";

pub struct Options {
    pub filter: PackageFilter,

    /// Where the backup folder (or archive) is created
    pub destination: PathBuf,

    /// Zip the backup folder and remove it afterwards
    pub archive: bool,

    /// Encrypt the zip and remove it afterwards, requires `archive`
    pub encrypt: bool,

    /// Key derivation cost for encrypted backups
    pub kdf: KdfParams,

    /// Time used for the backup name, now if unset
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            filter: PackageFilter::default(),
            destination: PathBuf::from("."),
            archive: false,
            encrypt: false,
            kdf: KdfParams::default(),
            timestamp: None,
        }
    }
}

pub enum Event {
    ListingPackages { filter: PackageFilter },
    PackagesFound { count: usize },
    Pulling {
        index: usize,
        total: usize,
        package: String,
        device_path: String,
    },
    Pulled { package: String, local: PathBuf },
    Archiving { zip: PathBuf },
    Encrypting { output: PathBuf },
    Done { artifact: PathBuf, packages: usize },
}

/// Name of the backup folder for the given time
pub fn backup_dir_name(ts: &DateTime<Utc>) -> String {
    ts.format(DIR_NAME_FORMAT).to_string()
}

/// Runs a backup and returns the final artifact: the folder, the zip or the
/// encrypted zip.
///
/// Any failure resolving, pulling or moving a package aborts the run. The
/// partial folder is left in place.
pub fn backup(
    adb: &dyn Adb,
    opts: &Options,
    passwords: &dyn PasswordSource,
    monitor: &dyn EventMonitor<Event>,
    cancel: &TaskCancelCheck,
) -> crate::Result<PathBuf> {
    if opts.encrypt && !opts.archive {
        return Err(crate::Error::new_generic(
            "encrypting a backup requires archiving it",
        ));
    }

    ensure_dir_exists(&opts.destination)?;

    let name = backup_dir_name(&opts.timestamp.unwrap_or_else(Utc::now));
    let dir = opts.destination.join(&name);
    let zip = opts.destination.join(format!("{}.zip", name));
    let encrypted = opts
        .destination
        .join(format!("{}.{}", name, ENCRYPTED_EXT));

    let mut outputs = vec![dir.as_path()];
    if opts.archive {
        outputs.push(zip.as_path());
    }
    if opts.encrypt {
        outputs.push(encrypted.as_path());
    }
    if let Some(existing) = outputs.into_iter().find(|it| it.exists()) {
        return Err(crate::Error::BackupExists(existing.into()));
    }

    std::fs::create_dir(&dir)?;
    log::info!("backing up to {}", path_str(&dir));

    monitor.on_event(Event::ListingPackages { filter: opts.filter });
    let packages = adb.list_packages(opts.filter)?;
    let total = packages.len();
    monitor.on_event(Event::PackagesFound { count: total });
    if total == 0 {
        log::warn!("no packages matched filter {}", opts.filter);
    }

    if let Err(e) = pull_all(adb, &packages, &dir, monitor, cancel) {
        log::error!("backup aborted, partial backup left in {}", path_str(&dir));
        return Err(e);
    }

    let mut artifact = dir.clone();

    if opts.archive {
        cancel.check()?;
        monitor.on_event(Event::Archiving { zip: zip.clone() });
        let entries = make_zip(&dir, &zip)?;
        log::info!("wrote {} entries to {}", entries, path_str(&zip));
        remove_path(&dir)?;
        artifact = zip;
    }

    if opts.encrypt {
        cancel.check()?;
        let password = passwords.get_password(&encrypted)?;
        monitor.on_event(Event::Encrypting {
            output: encrypted.clone(),
        });
        Envelope::new(password)
            .with_params(opts.kdf)
            .encrypt_file(&artifact, &encrypted)?;
        remove_path(&artifact)?;
        artifact = encrypted;
    }

    monitor.on_event(Event::Done {
        artifact: artifact.clone(),
        packages: total,
    });
    Ok(artifact)
}

fn pull_all(
    adb: &dyn Adb,
    packages: &[String],
    dir: &Path,
    monitor: &dyn EventMonitor<Event>,
    cancel: &TaskCancelCheck,
) -> crate::Result<()> {
    let staging = dir.join(STAGING_DIR);
    ensure_dir_exists(&staging)?;

    let total = packages.len();
    for (i, package) in packages.iter().enumerate() {
        cancel.check()?;

        let device_path = adb.resolve_path(package)?;
        monitor.on_event(Event::Pulling {
            index: i + 1,
            total,
            package: package.clone(),
            device_path: device_path.clone(),
        });

        let pulled = adb.pull(&device_path, &staging)?;
        let local = dir.join(format!("{}.{}", package, APK_EXT));
        move_file(&pulled, &local).map_err(|e| {
            crate::Error::PullFailed(package.clone(), format!("moving into backup: {}", e))
        })?;
        log::debug!("{} -> {}", device_path, path_str(&local));

        monitor.on_event(Event::Pulled {
            package: package.clone(),
            local,
        });
    }

    remove_path(&staging)?;
    Ok(())
}

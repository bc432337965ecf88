use std::path::PathBuf;

use clap::{self, Args};

use massapk::adb::PackageFilter;
use massapk::tasks::backup::{self, Event, Options};
use massapk::tasks::EventMonitor;
use massapk::utils::path_str;
use massapk::Context;

use crate::session::Session;
use crate::utils::PromptPassword;

#[derive(Args)]
pub struct Backup {
    /// Packages to back up: ALL, USER or SYSTEM. Defaults to the `backup.filter`
    /// config value, or USER
    #[arg(short = 'f', long = "flag")]
    filter: Option<PackageFilter>,

    /// Folder the backup is created in
    #[arg(short = 'p', long, default_value = ".")]
    path: PathBuf,

    /// Zip the backup folder
    #[arg(short = 'a', long, action = clap::ArgAction::SetTrue)]
    archive: bool,

    /// Encrypt the zip with a password, `MASSAPK_PASSWORD` skips the prompt
    #[arg(short = 'e', long, requires = "archive", action = clap::ArgAction::SetTrue)]
    encrypt: bool,
}

/// Prints backup progress to stdout
struct BackupPrinter;

pub(crate) fn pull_line(index: usize, total: usize, package: &str, device_path: &str) -> String {
    format!(
        "[{:3}/{:3}]  pulling ... {} ({})",
        index, total, package, device_path
    )
}

impl EventMonitor<Event> for BackupPrinter {
    fn on_event(&self, evt: Event) {
        match evt {
            Event::ListingPackages { filter } => {
                println!("Listing installed apk's in device ({})...", filter)
            }
            Event::PackagesFound { count } => println!("\nFound {} installed packages\n", count),
            Event::Pulling {
                index,
                total,
                package,
                device_path,
            } => println!("{}", pull_line(index, total, &package, &device_path)),
            Event::Pulled { .. } => {}
            Event::Archiving { zip } => println!("\nCreating zip archive: {}", path_str(&zip)),
            Event::Encrypting { output } => println!(
                "\nEncrypting archive into {} this may take a while...",
                path_str(&output)
            ),
            Event::Done { artifact, packages } => println!(
                "\nBack up of {} packages finished: {}",
                packages,
                path_str(&artifact)
            ),
        }
    }
}

impl Backup {
    pub fn run(&self, ctx: &dyn Context) -> anyhow::Result<()> {
        let cfg = ctx.get_config()?;
        let opts = Options {
            filter: self.filter.or(cfg.backup_filter).unwrap_or_default(),
            destination: self.path.clone(),
            archive: self.archive,
            encrypt: self.encrypt,
            ..Options::default()
        };
        let passwords = PromptPassword::for_encryption(ctx);

        Session::start(ctx)?.run(|adb, cancel| {
            backup::backup(adb, &opts, &passwords, &BackupPrinter, cancel)?;
            Ok(())
        })
    }
}

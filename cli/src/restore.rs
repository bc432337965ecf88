use std::path::{Path, PathBuf};

use clap::{self, Args};

use massapk::adb::InstallOutcome;
use massapk::tasks::restore::{self, Event, Options};
use massapk::tasks::EventMonitor;
use massapk::utils::{megabytes, path_str};
use massapk::Context;

use crate::session::Session;
use crate::utils::PromptPassword;

#[derive(Args)]
pub struct Restore {
    /// Backup folder, `.zip` or `.aes` file to restore
    #[arg(short = 'p', long)]
    path: PathBuf,

    /// Remove the extracted folder and decrypted zip afterwards
    #[arg(short = 'c', long, action = clap::ArgAction::SetTrue)]
    clean: bool,
}

/// Prints restore progress to stdout
struct RestorePrinter;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|it| it.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str(path).into_owned())
}

/// `[03/12] Installing file.apk`, the index padded to the width of the total
pub(crate) fn install_line(index: usize, total: usize, file: &str) -> String {
    let width = total.to_string().len();
    format!(
        "[{:0width$}/{}] Installing {}",
        index,
        total,
        file,
        width = width
    )
}

impl EventMonitor<Event> for RestorePrinter {
    fn on_event(&self, evt: Event) {
        match evt {
            Event::Decrypting { path, zip } => println!(
                "\nDecrypting back up {} into {} this may take a while...",
                path_str(&path),
                path_str(&zip)
            ),
            Event::Extracting { zip, dest } => {
                println!("\nUnzipping {} into {}...", path_str(&zip), path_str(&dest))
            }
            Event::Normalized { renamed } => {
                println!("Renamed {} files containing spaces", renamed)
            }
            Event::PackagesFound { count, total_bytes } => {
                println!(
                    "\n{} packages, Total Installation Size: {:.2} MB",
                    count,
                    megabytes(total_bytes)
                );
                println!("{}", "-".repeat(10));
            }
            Event::Installing { index, total, file } => {
                println!("{}", install_line(index, total, &file_name(&file)))
            }
            Event::Installed { file, outcome } => match outcome {
                InstallOutcome::Success | InstallOutcome::AlreadyExists => {}
                InstallOutcome::Failure => println!("  failed: {}", file_name(&file)),
                InstallOutcome::Unknown => {
                    println!("  unrecognized adb output for {}", file_name(&file))
                }
            },
            Event::Removed { path } => println!("Removed {}", path_str(&path)),
        }
    }
}

impl Restore {
    pub fn run(&self, ctx: &dyn Context) -> anyhow::Result<()> {
        // Fail before touching adb when there is nothing to restore
        restore::ArtifactKind::classify(&self.path)?;

        let opts = Options {
            path: self.path.clone(),
            clean: self.clean,
        };
        let passwords = PromptPassword::for_decryption(ctx);

        let summary = Session::start(ctx)?.run(|adb, cancel| {
            Ok(restore::restore(
                adb,
                &opts,
                &passwords,
                &RestorePrinter,
                cancel,
            )?)
        })?;

        println!("\n\nSummary: ");
        println!("{}", summary);
        for name in summary.failed.iter() {
            println!("  failed: {}", name);
        }
        for name in summary.unrecognized.iter() {
            println!("  unrecognized: {}", name);
        }
        println!("\nRestore finished");
        Ok(())
    }
}

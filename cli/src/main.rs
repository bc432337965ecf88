use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as AnyhowContext;
use clap::{Parser, Subcommand};
use flexi_logger::{FileSpec, LevelFilter, LogSpecification, Logger, LoggerHandle, WriteMode};

use massapk::DefaultContext;

mod backup;
use backup::Backup;

mod restore;
use restore::Restore;

mod check;
use check::Check;

mod session;
mod utils;
use utils::INTERRUPTED_EXIT_CODE;

const SIMPLE_VERSION_STRING: &'static str =
    include!(concat!(env!("OUT_DIR"), "/simple_version_string"));
const VERSION_STRING: &'static str = include!(concat!(env!("OUT_DIR"), "/version_string"));

#[derive(Parser)]
#[command(name = "massapk")]
#[command(about = "Back up and restore the apps of an Android device over adb")]
#[command(version(SIMPLE_VERSION_STRING))]
#[command(long_version(VERSION_STRING))]
struct Cli {
    /// `-e`, `--log-stderr`: Send logs to `stderr` even when `--log-file` is
    /// given
    #[arg(short = 'e', long, help = "Log to stderr", action = clap::ArgAction::SetTrue, default_value_t = false)]
    log_stderr: bool,

    /// `--log-file`: Append logs to the given file instead of `stderr`
    #[arg(long, help = "Send log output to the given file")]
    log_file: Option<PathBuf>,

    /// `-s`, `--log-spec`: Log specification for [flexi_logger](https://docs.rs/flexi_logger/latest/flexi_logger/struct.LogSpecification.html)
    #[arg(short = 's', long, help = "Log spec for flexi_logger")]
    log_spec: Option<String>,

    /// `-l`, `--log-level`: Set the desired log verbosity. Defaults to 0, all values are listed
    /// below:
    ///
    /// | Value | Log Level |
    /// | ----- | --------- |
    /// | **0** | **Warn** |
    /// | 1 | Info |
    /// | 2 | Debug |
    /// | 3 | Trace |
    #[arg(
        short = 'l',
        long,
        help = "Set the log level, 0 = warn, 1 = info, etc",
        long_help = None,
        default_value_t = 0
    )]
    log_level: u8,

    /// Configuration file to use instead of `$MASSAPK_CONFIG` or the user
    /// configuration directory
    #[arg(long, help = "Path to a massapk.toml configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the full version string and exit
    #[command()]
    Version,

    /// Pull the installed packages of the connected device into a timestamped
    /// folder, optionally zipped and encrypted
    #[command()]
    Backup(Backup),

    /// Install every package of a backup folder, zip or encrypted archive
    #[command()]
    Restore(Restore),

    /// Show the environment massapk would run with
    #[command()]
    Check(Check),
}

impl Cli {
    fn configure_loggers(&self) -> anyhow::Result<LoggerHandle> {
        let log_spec = match &self.log_spec {
            Some(s) => {
                LogSpecification::parse(s).with_context(|| format!("parsing log spec {}", s))?
            }
            None => {
                if self.log_level > 0 {
                    let lvl = match self.log_level {
                        1 => LevelFilter::Info,
                        2 => LevelFilter::Debug,
                        _ => LevelFilter::Trace,
                    };
                    LogSpecification::builder()
                        .default(LevelFilter::Warn)
                        .module("massapk", lvl)
                        .build()
                } else {
                    LogSpecification::env_or_parse("warn")
                        .with_context(|| "getting log spec from env")?
                }
            }
        };

        let mut logger = Logger::with(log_spec);

        if let (false, Some(path)) = (self.log_stderr, &self.log_file) {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                std::env::current_dir()?.join(path)
            };
            logger = logger
                .log_to_file(FileSpec::try_from(path).with_context(|| "creating filespec")?)
                .append()
                .write_mode(WriteMode::BufferAndFlush);
        }

        Ok(logger.start().with_context(|| "starting logger")?)
    }

    fn context(&self) -> DefaultContext {
        let ctx = DefaultContext::new();
        match &self.config {
            Some(path) => ctx.with_config_file(path.clone()),
            None => ctx,
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Version = &cli.command {
        println!("{}", VERSION_STRING);
        return Ok(ExitCode::SUCCESS);
    }

    let log_handle = cli.configure_loggers()?;
    let ctx = cli.context();

    let res = match &cli.command {
        Commands::Backup(c) => c.run(&ctx),
        Commands::Restore(c) => c.run(&ctx),
        Commands::Check(c) => c.run(&ctx),
        Commands::Version => Ok(()),
    };

    log_handle.flush();

    match res {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) if utils::is_interrupt(&e) => {
            println!("Received interrupt. Quit");
            Ok(ExitCode::from(INTERRUPTED_EXIT_CODE))
        }
        Err(e) => Err(e),
    }
}

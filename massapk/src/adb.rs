use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::command::{run_cmd, run_cmd_to_file, CmdOutput};
use crate::config::AdbConfig;
use crate::platform::Platform;
use crate::utils::path_str;
use crate::Context;

/// Env var that can point at the adb executable
pub const ADB_ENV: &'static str = "MASSAPK_ADB";

/// Env var adb itself uses to select a device
pub const SERIAL_ENV: &'static str = "ANDROID_SERIAL";

/// Prefix adb puts in front of every `pm list packages` and `pm path` line
pub const PACKAGE_LINE_PREFIX: &'static str = "package:";

/// Which installed packages to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageFilter {
    All,
    #[default]
    User,
    System,
}

impl PackageFilter {
    /// The `pm list packages` flag for this filter
    pub fn as_arg(&self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::User => Some("-3"),
            Self::System => Some("-s"),
        }
    }
}

impl FromStr for PackageFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "USER" => Ok(Self::User),
            "SYSTEM" | "SYS" => Ok(Self::System),
            _ => Err(format!(
                "invalid package filter `{}`, expected one of ALL, USER, SYSTEM",
                s
            )),
        }
    }
}

impl fmt::Display for PackageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "ALL",
            Self::User => "USER",
            Self::System => "SYSTEM",
        })
    }
}

/// Whether a device is reachable through the adb server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// The result of a single `adb install`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Success,
    AlreadyExists,
    Failure,
    /// adb said something we don't recognize
    Unknown,
}

lazy_static! {
    static ref FAILURE_REASON: Regex = Regex::new(r"\b(INSTALL_[A-Z_]+)\b").unwrap();
}

impl InstallOutcome {
    /// Classifies the text adb printed for an install. Every input maps to
    /// exactly one outcome, checked in order: a line reading `Success`, the
    /// already exists failure code, `Failure`/`Failed`, otherwise
    /// [InstallOutcome::Unknown].
    pub fn classify(output: &str) -> Self {
        if output.lines().any(|line| line.trim() == "Success") {
            Self::Success
        } else if output.contains("INSTALL_FAILED_ALREADY_EXISTS") {
            Self::AlreadyExists
        } else if output.contains("Failure") || output.contains("Failed") {
            Self::Failure
        } else {
            Self::Unknown
        }
    }

    /// The `INSTALL_...` code from a failure message, if present
    pub fn failure_reason(output: &str) -> Option<&str> {
        FAILURE_REASON
            .captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Extracts the values of every `package:` line, ignoring everything else
pub fn parse_package_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix(PACKAGE_LINE_PREFIX))
        .map(|it| it.trim().to_string())
        .filter(|it| !it.is_empty())
        .collect()
}

/// The Adb trait abstracts the handful of `adb` commands needed to back up
/// and restore packages
pub trait Adb: Send + Sync {
    /// `adb start-server`
    fn start_server(&self) -> crate::Result<()>;

    /// `adb kill-server`
    fn stop_server(&self) -> crate::Result<()>;

    /// `adb get-state`, any failure is reported as disconnected
    fn connection_state(&self) -> ConnectionState;

    /// Names of the installed packages matching the filter
    fn list_packages(&self, filter: PackageFilter) -> crate::Result<Vec<String>>;

    /// The on device path of the package's base apk
    fn resolve_path(&self, package: &str) -> crate::Result<String>;

    /// Copies the device file into `local_dir`, returning the local path.
    /// The local file keeps the device file name, renaming is up to the
    /// caller.
    fn pull(&self, device: &str, local_dir: &Path) -> crate::Result<PathBuf>;

    /// `adb install -d -r`, allowing downgrades and reinstalls. Failures are
    /// reported through the outcome, never as an error.
    fn install(&self, apk: &Path) -> InstallOutcome;
}

#[derive(Clone, Debug)]
/// An `Adb` implementation that just invokes the external `adb` command.
pub struct ExecAdb {
    bin: String,
    serial: Option<String>,
}

impl ExecAdb {
    /// Creates a new `ExecAdb` from the given context.
    ///
    /// The executable is looked up in order: `adb.executable` from the config
    /// file, the `MASSAPK_ADB` env var, a bundled binary next to the current
    /// executable (`bin/<platform>/adb`) and finally `adb` in the `PATH`.
    ///
    /// The serial comes from `adb.serial` in the config or `ANDROID_SERIAL`.
    pub fn new(ctx: &dyn Context, platform: Platform) -> crate::Result<Self> {
        let cfg = ctx.get_config()?;
        Self::try_from_adb_config(ctx, platform, &cfg.adb)
    }

    pub fn try_from_adb_config(
        ctx: &dyn Context,
        platform: Platform,
        cfg: &AdbConfig,
    ) -> crate::Result<Self> {
        let bin = find_adb_executable(ctx, platform, cfg)?;
        let serial = cfg
            .serial
            .clone()
            .or_else(|| ctx.maybe_get_env(SERIAL_ENV));
        Ok(Self { bin, serial })
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn has_serial(&self) -> bool {
        self.serial.is_some()
    }

    pub fn with_serial(mut self, serial: String) -> Self {
        self.serial = Some(serial);
        self
    }

    pub fn builder() -> Builder {
        Builder::new()
    }
}

fn find_adb_executable(
    ctx: &dyn Context,
    platform: Platform,
    cfg: &AdbConfig,
) -> crate::Result<String> {
    if let Some(exe) = &cfg.executable {
        return Ok(exe.clone());
    }

    if let Some(exe) = ctx.maybe_get_env(ADB_ENV) {
        return Ok(exe);
    }

    if let Some(dir) = ctx.get_exe_dir() {
        let bundled = platform.bundled_adb(&dir);
        if bundled.is_file() {
            return Ok(path_str(&bundled).into_owned());
        }
    }

    ctx.get_bin(platform.adb_executable_name())
}

impl Default for ExecAdb {
    fn default() -> Self {
        Self {
            bin: "adb".into(),
            serial: None,
        }
    }
}

/// Used to build an Adb implementation without a [Context].
pub struct Builder {
    bin: String,
    serial: Option<String>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            bin: "adb".into(),
            serial: None,
        }
    }

    pub fn with_bin(mut self, bin: String) -> Self {
        self.bin = bin;
        self
    }

    pub fn with_serial(mut self, serial: String) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Consume the builder and return an Adb implementation
    pub fn build(self) -> ExecAdb {
        ExecAdb {
            bin: self.bin,
            serial: self.serial,
        }
    }
}

macro_rules! adb_cmd {
    ($adb:ident, $cmd:literal $(, $args:expr)*) => {
        if let Some(ref serial) = $adb.serial {
            run_cmd(&$adb.bin, &["-s", serial.as_str(), $cmd, $($args),*])
        } else {
            run_cmd(&$adb.bin, &[$cmd, $($args),*])
        }
    };
    ($adb:ident => $out:expr, $cmd:literal $(, $args:expr)*) => {
        if let Some(ref serial) = $adb.serial {
            run_cmd_to_file(&$adb.bin, &["-s", serial.as_str(), $cmd, $($args),*], $out)
        } else {
            run_cmd_to_file(&$adb.bin, &[$cmd, $($args),*], $out)
        }
    };
}

impl ExecAdb {
    /// Turns the raw command result into an error only when adb exited with
    /// a failure and had something to say about it. A failure without output
    /// is just logged.
    fn checked(&self, res: io::Result<CmdOutput>) -> crate::Result<CmdOutput> {
        let output = match res {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(crate::Error::MissingBin(self.bin.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        if output.ok() {
            return Ok(output);
        }

        let text = output.combined_utf8_lossy();
        let text = text.trim();
        if text.is_empty() {
            log::warn!(
                "adb command returned error code {}, but no output",
                output.code()
            );
            Ok(output)
        } else {
            Err(crate::Error::CommandError(output.code(), text.to_string()))
        }
    }

    fn exec_out_cat_to_file(&self, device: &str, local: &Path) -> crate::Result<()> {
        let res = self.stream_cat(device, local);
        if res.is_err() && local.exists() {
            if let Err(e) = fs::remove_file(local) {
                log::warn!("failed to remove partial {:?}: {}", local, e);
            }
        }
        res
    }

    fn stream_cat(&self, device: &str, local: &Path) -> crate::Result<()> {
        let file = File::create(local)?;
        let output = self.checked(adb_cmd!(self => file, "exec-out", "cat", device))?;
        if !output.ok() {
            return Err(crate::Error::PullFailed(
                device.into(),
                format!("cat exited with {}", output.code()),
            ));
        }
        Ok(())
    }
}

/// File name of a device path, `base.apk` for `/data/app/x/base.apk`
fn device_file_name(device: &str) -> &str {
    match device.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "base.apk",
    }
}

impl Adb for ExecAdb {
    fn start_server(&self) -> crate::Result<()> {
        log::info!("Starting adb server...");
        self.checked(adb_cmd!(self, "start-server"))?;
        Ok(())
    }

    fn stop_server(&self) -> crate::Result<()> {
        log::info!("Killing adb server...");
        self.checked(adb_cmd!(self, "kill-server"))?;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        match adb_cmd!(self, "get-state") {
            Ok(output) if output.ok() && output.stdout_utf8_lossy().trim() == "device" => {
                ConnectionState::Connected
            }
            Ok(output) => {
                log::debug!(
                    "get-state: {}",
                    output.combined_utf8_lossy().trim()
                );
                ConnectionState::Disconnected
            }
            Err(e) => {
                log::debug!("get-state failed: {}", e);
                ConnectionState::Disconnected
            }
        }
    }

    fn list_packages(&self, filter: PackageFilter) -> crate::Result<Vec<String>> {
        log::info!("Listing installed apk's in the device ...");
        let res = match filter.as_arg() {
            Some(flag) => adb_cmd!(self, "shell", "pm", "list", "packages", flag),
            None => adb_cmd!(self, "shell", "pm", "list", "packages"),
        };
        let output = self.checked(res)?;
        Ok(parse_package_lines(&output.stdout_utf8_lossy()))
    }

    fn resolve_path(&self, package: &str) -> crate::Result<String> {
        let output = self.checked(adb_cmd!(self, "shell", "pm", "path", package))?;
        let mut paths = parse_package_lines(&output.stdout_utf8_lossy()).into_iter();
        let base = paths
            .next()
            .ok_or_else(|| crate::Error::NoPackagePath(package.into()))?;
        for split in paths {
            log::debug!("{} has split apk {}, only the base apk is kept", package, split);
        }
        Ok(base)
    }

    fn pull(&self, device: &str, local_dir: &Path) -> crate::Result<PathBuf> {
        let local = local_dir.join(device_file_name(device));
        if local.exists() {
            fs::remove_file(&local)?;
        }
        let local_str = path_str(&local).into_owned();

        let pulled = match self.checked(adb_cmd!(self, "pull", device, local_str.as_str())) {
            Ok(output) => output.ok(),
            Err(crate::Error::CommandError(code, msg)) => {
                log::warn!("adb pull {} failed ({}): {}", device, code, msg);
                false
            }
            Err(e) => return Err(e),
        };

        if !pulled || !local.is_file() {
            log::debug!("falling back to exec-out cat for {}", device);
            self.exec_out_cat_to_file(device, &local)
                .map_err(|e| crate::Error::PullFailed(device.into(), e.to_string()))?;
        }

        match fs::metadata(&local) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(local),
            _ => Err(crate::Error::PullFailed(
                device.into(),
                format!("{} missing or empty after pull", local_str),
            )),
        }
    }

    fn install(&self, apk: &Path) -> InstallOutcome {
        let apk_str = path_str(apk).into_owned();
        let output = match adb_cmd!(self, "install", "-d", "-r", apk_str.as_str()) {
            Ok(v) => v,
            Err(e) => {
                log::error!("failed to run adb install for {}: {}", apk_str, e);
                return InstallOutcome::Failure;
            }
        };

        // adb echoes the apk path in its messages, keep file names out of it
        let text = output.combined_utf8_lossy().replace(apk_str.as_str(), "<apk>");
        let outcome = InstallOutcome::classify(&text);
        match outcome {
            InstallOutcome::Success => {}
            InstallOutcome::Unknown => {
                log::warn!("unrecognized install output for {}: {}", apk_str, text.trim())
            }
            _ => log::error!(
                "install of {} failed: {}",
                apk_str,
                InstallOutcome::failure_reason(&text).unwrap_or_else(|| text.trim())
            ),
        }
        outcome
    }
}

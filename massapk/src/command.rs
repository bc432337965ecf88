use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::process::{Command, ExitStatus, Output, Stdio};

use log::Level::Debug;
use log::{debug, log_enabled};

/// Exit code reported when a child was terminated by a signal
pub const SIGNALED_EXIT_CODE: i32 = -1;

pub struct CmdOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl From<Output> for CmdOutput {
    fn from(output: Output) -> Self {
        Self {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

impl CmdOutput {
    /// Converts to a `Result` object that is `Ok` only if the [ExitStatus] is
    /// success.
    pub fn err_on_status(self) -> crate::Result<Self> {
        if self.status.success() {
            return Ok(self);
        }

        Err(crate::Error::CommandError(
            self.code(),
            self.combined_utf8_lossy().trim().to_string(),
        ))
    }

    #[inline]
    pub fn ok(&self) -> bool {
        self.status.success()
    }

    #[inline]
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(SIGNALED_EXIT_CODE)
    }

    #[inline]
    pub fn stdout_contains(&self, needle: &str) -> bool {
        self.stdout_utf8_lossy().contains(needle)
    }

    #[inline]
    pub fn stdout_utf8_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    #[inline]
    pub fn stderr_utf8_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// stdout followed by stderr, the way a terminal would show them
    pub fn combined_utf8_lossy(&self) -> String {
        let mut combined = self.stdout_utf8_lossy().into_owned();
        let stderr = self.stderr_utf8_lossy();
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        combined
    }
}

pub fn run_cmd<C, S>(cmd: C, args: &[S]) -> io::Result<CmdOutput>
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    if log_enabled!(Debug) {
        log_cmd(&cmd, args);
    }
    Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map(|output| output.into())
}

/// Like [run_cmd], but stdout goes straight into `out` instead of memory.
/// Only stderr ends up in the returned [CmdOutput].
pub fn run_cmd_to_file<C, S>(cmd: C, args: &[S], out: File) -> io::Result<CmdOutput>
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    if log_enabled!(Debug) {
        log_cmd(&cmd, args);
    }
    Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .output()
        .map(|output| output.into())
}

pub fn log_cmd<C, S>(cmd: &C, args: &[S])
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    let nargs = args.len();
    if nargs > 0 {
        let mut args_string = String::new();
        for (i, e) in args.iter().enumerate() {
            args_string.push_str(&e.as_ref().to_string_lossy());
            if i < nargs - 1 {
                args_string.push(' ');
            }
        }
        debug!(
            "Running command: `{} {}`",
            cmd.as_ref().to_string_lossy(),
            args_string
        );
    } else {
        debug!("Running command: `{}`", cmd.as_ref().to_string_lossy());
    }
}

use std::path::Path;

use massapk::tasks::{PasswordSource, TaskCancelCheck, TaskCanceller};
use massapk::utils::path_str;
use massapk::Context;

/// Env var holding the backup password for non interactive runs
pub const PASSWORD_ENV: &'static str = "MASSAPK_PASSWORD";

/// Exit code used when the run was interrupted
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

#[cfg(unix)]
pub use unix::{hook_to_signals, HookedSignals};

#[cfg(windows)]
pub use windows::{hook_to_signals, HookedSignals};

#[cfg(unix)]
mod unix {
    use std::thread::JoinHandle;

    use signal_hook::consts::TERM_SIGNALS;
    use signal_hook::iterator::{Handle, Signals};

    use massapk::tasks::TaskCanceller;

    pub struct HookedSignals {
        sig_handle: Handle,
        _join_handle: JoinHandle<()>,
    }

    impl Drop for HookedSignals {
        fn drop(&mut self) {
            if !self.sig_handle.is_closed() {
                self.sig_handle.close();
            }
        }
    }

    /// The first termination signal cancels the running task, a second one
    /// kills the process the default way.
    pub fn hook_to_signals(cancel: TaskCanceller) -> anyhow::Result<HookedSignals> {
        let mut sigs = Signals::new(TERM_SIGNALS)?;
        let sig_handle = sigs.handle();
        let _join_handle = std::thread::spawn(move || {
            let mut seen_exit = false;
            for sig in sigs.forever() {
                if seen_exit {
                    _ = signal_hook::low_level::emulate_default_handler(sig);
                } else {
                    log::info!("received signal {}, cancelling", sig);
                    cancel.cancel();
                    seen_exit = true;
                }
            }
        });

        Ok(HookedSignals {
            sig_handle,
            _join_handle,
        })
    }
}

#[cfg(windows)]
mod windows {
    use massapk::tasks::TaskCanceller;

    use super::INTERRUPTED_EXIT_CODE;

    /// The console handler stays installed for the rest of the process
    pub struct HookedSignals;

    /// The first Ctrl-C cancels the running task, a second one exits.
    pub fn hook_to_signals(cancel: TaskCanceller) -> anyhow::Result<HookedSignals> {
        let mut seen_exit = false;
        ctrlc::set_handler(move || {
            if seen_exit {
                std::process::exit(INTERRUPTED_EXIT_CODE.into());
            }
            log::info!("received Ctrl-C, cancelling");
            cancel.cancel();
            seen_exit = true;
        })?;
        Ok(HookedSignals)
    }
}

pub fn task_canceller() -> anyhow::Result<(HookedSignals, TaskCancelCheck)> {
    let (cancel, check) = TaskCanceller::new();
    Ok((hook_to_signals(cancel)?, check))
}

/// Whether the error came from a cancelled task
pub fn is_interrupt(err: &anyhow::Error) -> bool {
    err.chain().any(|it| {
        matches!(
            it.downcast_ref::<massapk::Error>(),
            Some(massapk::Error::Cancelled)
        )
    })
}

/// Reads the password from [PASSWORD_ENV] or prompts for it
pub struct PromptPassword<'a> {
    ctx: &'a dyn Context,
    confirm: bool,
}

impl<'a> PromptPassword<'a> {
    /// Asks twice, for new encrypted backups
    pub fn for_encryption(ctx: &'a dyn Context) -> Self {
        Self { ctx, confirm: true }
    }

    pub fn for_decryption(ctx: &'a dyn Context) -> Self {
        Self {
            ctx,
            confirm: false,
        }
    }
}

fn read_password(msg: &str) -> massapk::Result<String> {
    rpassword::prompt_password(format!("{}: ", msg))
        .map_err(|e| massapk::Error::Generic(format!("failed to read password: {}", e)))
}

impl PasswordSource for PromptPassword<'_> {
    fn get_password(&self, artifact: &Path) -> massapk::Result<String> {
        if let Some(password) = self.ctx.maybe_get_env(PASSWORD_ENV) {
            log::debug!("using password from {}", PASSWORD_ENV);
            return Ok(password);
        }

        if !self.confirm {
            return read_password(&format!(
                "Enter password for decryption of {}",
                path_str(artifact)
            ));
        }

        let password = read_password(&format!(
            "Enter password for encryption of {}",
            path_str(artifact)
        ))?;
        let again = read_password("Repeat password")?;
        if password != again {
            return Err(massapk::Error::new_generic("passwords don't match"));
        }
        Ok(password)
    }
}

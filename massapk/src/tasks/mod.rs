use std::path::Path;

pub mod backup;
pub mod restore;

mod connect;
pub use connect::{wait_for_device, WaitPolicy};

pub mod task;
pub use task::{ChannelEventMonitor, EventMonitor, NoopMonitor, TaskCancelCheck, TaskCanceller};

/// Supplies the password protecting an encrypted backup
///
/// `artifact` is the encrypted file being written or read.
pub trait PasswordSource {
    fn get_password(&self, artifact: &Path) -> crate::Result<String>;
}

impl<F> PasswordSource for F
where
    F: Fn(&Path) -> crate::Result<String>,
{
    fn get_password(&self, artifact: &Path) -> crate::Result<String> {
        self(artifact)
    }
}

/// A [PasswordSource] for runs that never touch encrypted files
pub struct NoPassword;

impl PasswordSource for NoPassword {
    fn get_password(&self, _artifact: &Path) -> crate::Result<String> {
        Err(crate::Error::new_generic("no password available"))
    }
}

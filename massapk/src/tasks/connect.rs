use std::thread;
use std::time::{Duration, Instant};

use crate::adb::{Adb, ConnectionState};
use crate::tasks::TaskCancelCheck;

/// How to wait for a device to show up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between two `get-state` polls
    pub interval: Duration,
    /// Give up after this long, `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

/// Polls the connection state until a device is connected.
///
/// `on_waiting` is called once, before the first sleep, so callers can tell
/// the user to plug in their phone.
pub fn wait_for_device(
    adb: &dyn Adb,
    policy: &WaitPolicy,
    cancel: &TaskCancelCheck,
    on_waiting: &mut dyn FnMut(),
) -> crate::Result<()> {
    let start = Instant::now();
    let mut notified = false;

    loop {
        cancel.check()?;

        if adb.connection_state() == ConnectionState::Connected {
            log::debug!("device connected after {:?}", start.elapsed());
            return Ok(());
        }

        if let Some(timeout) = policy.timeout {
            if start.elapsed() >= timeout {
                return Err(crate::Error::DeviceTimeout(timeout.as_secs()));
            }
        }

        if !notified {
            log::warn!("No phone connected, waiting to connect phone");
            on_waiting();
            notified = true;
        }

        thread::sleep(policy.interval);
    }
}

use std::time::Instant;

use anyhow::Context as AnyhowContext;

use massapk::adb::Adb;
use massapk::tasks::{wait_for_device, TaskCancelCheck};
use massapk::utils::human_time;
use massapk::{Context, ExecAdb, Platform};

use crate::utils::{task_canceller, HookedSignals};

/// Owns the adb server for the duration of a command: restarts it, waits for
/// a device, runs the command and stops the server again.
pub struct Session<'a> {
    ctx: &'a dyn Context,
    adb: ExecAdb,
    cancel: TaskCancelCheck,
    _signals: HookedSignals,
}

impl<'a> Session<'a> {
    pub fn start(ctx: &'a dyn Context) -> anyhow::Result<Self> {
        let platform = Platform::detect()?;
        let adb = ExecAdb::new(ctx, platform).with_context(|| "locating adb")?;
        log::info!("using {} on {}", adb.bin(), platform);

        let (_signals, cancel) = task_canceller()?;

        if let Err(e) = adb.stop_server() {
            log::warn!("failed to stop a running adb server: {}", e);
        }
        println!("Starting adb server...");
        adb.start_server()
            .with_context(|| "starting the adb server")?;

        Ok(Self {
            ctx,
            adb,
            cancel,
            _signals,
        })
    }

    /// Waits for a device and runs `f`, reporting the elapsed time. The adb
    /// server is stopped afterwards whatever the outcome.
    pub fn run<T, F>(self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&dyn Adb, &TaskCancelCheck) -> anyhow::Result<T>,
    {
        let start = Instant::now();
        let res = self.wait().and_then(|_| f(&self.adb, &self.cancel));
        println!(
            "\nElapsed time {}",
            human_time(start.elapsed().as_secs_f64())
        );

        if let Err(e) = self.adb.stop_server() {
            log::warn!("failed to stop the adb server: {}", e);
        }
        res
    }

    fn wait(&self) -> anyhow::Result<()> {
        let policy = self.ctx.get_config()?.wait_policy;
        wait_for_device(&self.adb, &policy, &self.cancel, &mut || {
            println!("Make sure your Android phone is connected and debug mode is enabled !")
        })?;
        Ok(())
    }
}

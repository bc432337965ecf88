pub mod adb;
pub use adb::{Adb, ExecAdb};

pub mod archive;

pub mod command;
pub use command::run_cmd;

pub mod config;

pub mod context;
pub use context::{Context, DefaultContext};

pub mod crypto;

pub mod errors;
pub use errors::{Error, Result};

pub mod platform;
pub use platform::Platform;

pub mod tasks;

pub mod utils;

#[cfg(test)]
pub mod testing;

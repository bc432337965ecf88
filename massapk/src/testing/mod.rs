mod adb;
mod context;
mod temp;

pub use adb::*;
pub use context::*;
pub use temp::*;

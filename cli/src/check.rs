use std::fmt;

use clap::{self, Args};

use massapk::adb::{Adb, ConnectionState, ADB_ENV, SERIAL_ENV};
use massapk::context::CONFIG_ENV;
use massapk::utils::path_str;
use massapk::{Context, ExecAdb, Platform};

use crate::utils::PASSWORD_ENV;

#[derive(Args)]
pub struct Check {
    /// Also ask adb whether a device is connected
    #[arg(short = 'd', long, action = clap::ArgAction::SetTrue)]
    device: bool,
}

enum Status {
    Missing,
    Exists(String),
    Failed(String),
}

struct Info {
    name: String,
    status: Status,
}

const FAIL: &'static str = "Fail";
const OK: &'static str = "Ok";
const MEH: &'static str = "Meh";

impl Info {
    fn new<S: Into<String>>(name: S, status: Status) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }

    fn from_result<S, T, E>(name: S, res: Result<T, E>) -> Self
    where
        S: Into<String>,
        T: fmt::Display,
        E: fmt::Display,
    {
        let status = match res {
            Ok(v) => Status::Exists(v.to_string()),
            Err(e) => Status::Failed(e.to_string()),
        };
        Self::new(name, status)
    }

    fn is_failure(&self) -> bool {
        matches!(self.status, Status::Failed(_))
    }
}

fn check_env(ctx: &dyn Context, env: &str) -> Info {
    let status = match ctx.maybe_get_env(env) {
        None => Status::Missing,
        Some(_) if env == PASSWORD_ENV => Status::Exists("set".into()),
        Some(v) => Status::Exists(v),
    };
    Info::new(env, status)
}

impl Check {
    pub fn run(&self, ctx: &dyn Context) -> anyhow::Result<()> {
        let mut checks = Vec::new();

        let platform = Platform::detect();
        checks.push(Info::from_result("platform", platform.as_ref()));

        checks.push(Info::from_result(
            "config file",
            ctx.get_config_file().map(|it| {
                let exists = if it.exists() { "" } else { ", not found" };
                format!("{}{}", path_str(&it), exists)
            }),
        ));
        checks.push(Info::from_result(
            "config",
            ctx.get_config().map(|_| "valid"),
        ));

        let adb = platform.and_then(|p| ExecAdb::new(ctx, p));
        match &adb {
            Ok(adb) => {
                checks.push(Info::new("adb", Status::Exists(adb.bin().into())));
                let serial = match adb.serial() {
                    Some(s) => Status::Exists(s.into()),
                    None => Status::Missing,
                };
                checks.push(Info::new("serial", serial));
            }
            Err(e) => checks.push(Info::new("adb", Status::Failed(e.to_string()))),
        }

        if let (true, Ok(adb)) = (self.device, &adb) {
            let state = match adb.connection_state() {
                ConnectionState::Connected => Status::Exists("connected".into()),
                ConnectionState::Disconnected => Status::Missing,
            };
            checks.push(Info::new("device", state));
        }

        println!("Environment:\n");
        for c in checks.iter() {
            println!("{}", c);
        }

        println!("\nEnvironment variables:\n");
        for env in [ADB_ENV, SERIAL_ENV, CONFIG_ENV, PASSWORD_ENV] {
            println!("{}", check_env(ctx, env));
        }

        if checks.iter().any(Info::is_failure) {
            anyhow::bail!("massapk can't run in this environment");
        }
        Ok(())
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.status {
            Status::Missing => write!(f, "{}: {}", MEH, self.name),
            Status::Exists(v) => write!(f, "{}: {} ({})", OK, self.name, v),
            Status::Failed(e) => write!(f, "{}: {} ({})", FAIL, self.name, e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_info_display() {
        assert_eq!(
            Info::new("adb", Status::Exists("/usr/bin/adb".into())).to_string(),
            "Ok: adb (/usr/bin/adb)"
        );
        assert_eq!(Info::new("serial", Status::Missing).to_string(), "Meh: serial");
        let failed = Info::from_result("adb", Err::<String, _>(massapk::Error::MissingBin("adb".into())));
        assert!(failed.is_failure());
        assert_eq!(
            failed.to_string(),
            "Fail: adb (required binary `adb` not available to context)"
        );
    }
}

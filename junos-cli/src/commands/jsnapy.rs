use crate::commands::builtin::{arg, multi, path_of, subcommand, value_of, values_of};
use crate::config::Config;
use clap::builder::ValueParser;
use clap::{Command, ValueHint};
use junos_async::error::JunosClientResult;
use junos_async::jsnapy::{run, JsnapyOptions};
use junos_async::session::DeviceSession;
use serde_json::Value;
use std::path::PathBuf;

pub fn cli() -> Command {
    subcommand("jsnapy", "Take snapshots and run snapshot tests").args([
        arg(
            "action",
            "snap_pre and snap_post save snapshots, check compares them, snapcheck tests a fresh one",
            true,
            None,
            None,
            None,
            ["snap_pre", "snap_post", "snapcheck", "check"],
        ),
        multi("test-files", "TOML test file (repeatable)")
            .required(true)
            .value_hint(ValueHint::FilePath),
        arg(
            "dir",
            "Directory relative test files are read from",
            false,
            None,
            None,
            Some(ValueHint::DirPath),
            ValueParser::string(),
        ),
        arg(
            "snapshot-dir",
            "Directory snapshots are saved to",
            false,
            None,
            Some("snapshots"),
            Some(ValueHint::DirPath),
            ValueParser::string(),
        ),
    ])
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let args = &cfg.args;
    let test_files = values_of::<String>("test-files", args)
        .into_iter()
        .map(PathBuf::from)
        .collect();
    let mut options = JsnapyOptions::new(value_of::<String>("action", args).parse()?, test_files);
    options.dir = path_of("dir", args);
    options.snapshot_dir = PathBuf::from(value_of::<String>("snapshot-dir", args));
    let result = run(session, &options).await;
    Ok(serde_json::to_value(result)?)
}

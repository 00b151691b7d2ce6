use crate::commands::builtin::{arg, path_of, subcommand};
use crate::config::Config;
use clap::builder::ValueParser;
use clap::{Command, ValueHint};
use junos_async::error::JunosClientResult;
use junos_async::facts::run;
use junos_async::session::DeviceSession;
use serde_json::Value;

pub fn cli() -> Command {
    subcommand("facts", "Gather device facts").arg(arg(
        "savedir",
        "Also save the facts to <savedir>/<hostname>-facts.json",
        false,
        None,
        None,
        Some(ValueHint::DirPath),
        ValueParser::string(),
    ))
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let savedir = path_of("savedir", &cfg.args);
    let result = run(session, savedir.as_deref()).await;
    Ok(serde_json::to_value(result)?)
}

use crate::commands::builtin::{arg, subcommand, value_of};
use crate::commands::ping::{optional, path_args};
use crate::config::Config;
use clap::{value_parser, Command};
use junos_async::error::JunosClientResult;
use junos_async::pmtud::{run, PmtudOptions};
use junos_async::session::DeviceSession;
use serde_json::Value;

pub fn cli() -> Command {
    subcommand("pmtud", "Discover the path MTU from the device")
        .args(path_args())
        .args([
            arg(
                "max-size",
                "Largest MTU tested",
                false,
                None,
                Some("1500"),
                None,
                value_parser!(u32),
            ),
            arg(
                "max-range",
                "Search window below max-size, a power of two",
                false,
                None,
                Some("512"),
                None,
                value_parser!(u32),
            ),
        ])
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let args = &cfg.args;
    let mut options = PmtudOptions::new(value_of::<String>("dest", args));
    options.max_size = *value_of::<u32>("max-size", args);
    options.max_range = *value_of::<u32>("max-range", args);
    options.source = optional("source", args);
    options.interface = optional("interface", args);
    options.routing_instance = optional("routing-instance", args);
    let result = run(session, &options).await;
    Ok(serde_json::to_value(result)?)
}

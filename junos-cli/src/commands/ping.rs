use crate::commands::builtin::{arg, flag, subcommand, switch, value_of, value_of_if_exists};
use crate::config::Config;
use clap::builder::ValueParser;
use clap::{value_parser, ArgMatches, Command};
use junos_async::error::JunosClientResult;
use junos_async::ping::{ping, PingOptions};
use junos_async::session::DeviceSession;
use serde_json::Value;

/// Arguments shared with `pmtud`.
pub(super) fn path_args() -> [clap::Arg; 4] {
    [
        arg(
            "dest",
            "Destination address or name",
            true,
            Some('d'),
            None,
            None,
            ValueParser::string(),
        ),
        arg(
            "source",
            "Source address",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        ),
        arg(
            "interface",
            "Outgoing interface",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        ),
        arg(
            "routing-instance",
            "Routing instance",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        ),
    ]
}

pub(super) fn optional(name: &str, args: &ArgMatches) -> Option<String> {
    value_of_if_exists::<String>(name, args).cloned()
}

pub fn cli() -> Command {
    subcommand("ping", "Ping from the device")
        .args(path_args())
        .args([
            arg(
                "count",
                "Number of packets",
                false,
                Some('c'),
                Some("5"),
                None,
                value_parser!(u32).range(1..),
            ),
            switch("no-rapid", "Send packets one per second"),
            arg("ttl", "IP time to live", false, None, None, None, value_parser!(u8)),
            arg("size", "Payload size in bytes", false, None, None, None, value_parser!(u32)),
            switch("do-not-fragment", "Set the do not fragment bit"),
            switch("inet", "Force IPv4"),
            arg(
                "acceptable-percent-loss",
                "Loss tolerated before the ping counts as failed",
                false,
                None,
                Some("0"),
                None,
                value_parser!(u8).range(0..=100),
            ),
        ])
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let args = &cfg.args;
    let mut options = PingOptions::new(value_of::<String>("dest", args));
    options.count = *value_of::<u32>("count", args);
    options.rapid = !flag("no-rapid", args);
    options.ttl = value_of_if_exists::<u8>("ttl", args).copied();
    options.size = value_of_if_exists::<u32>("size", args).copied();
    options.do_not_fragment = flag("do-not-fragment", args);
    options.inet = flag("inet", args);
    options.source = optional("source", args);
    options.interface = optional("interface", args);
    options.routing_instance = optional("routing-instance", args);
    options.acceptable_percent_loss = *value_of::<u8>("acceptable-percent-loss", args);
    let result = ping(session, &options).await;
    Ok(serde_json::to_value(result)?)
}

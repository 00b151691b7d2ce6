use crate::commands::builtin::{
    arg, check_mode, flag, multi, subcommand, switch, value_of, value_of_if_exists, values_of,
};
use crate::config::Config;
use clap::builder::ValueParser;
use clap::{value_parser, Command};
use junos_async::error::JunosClientResult;
use junos_async::session::DeviceSession;
use junos_async::system::{run, SystemOptions};
use serde_json::Value;

pub fn cli() -> Command {
    subcommand("system", "Reboot, shut down, halt or zeroize").args([
        arg(
            "action",
            "System action",
            true,
            None,
            None,
            None,
            ["reboot", "shutdown", "off", "power-off", "power_off", "halt", "zeroize"],
        ),
        arg(
            "in-min",
            "Act in this many minutes",
            false,
            None,
            None,
            None,
            value_parser!(u32),
        )
        .conflicts_with("at"),
        arg(
            "at",
            "Act at this time, 'now' or yymmddhhmm",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        ),
        switch("this-re", "Only act on the routing engine of the session"),
        switch("other-re", "Only act on the other routing engine").conflicts_with("this-re"),
        switch("media", "Also scrub the media when zeroizing"),
        switch("vmhost", "Act on the VM host"),
        multi("member-id", "Virtual chassis member (repeatable)"),
    ])
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let args = &cfg.args;
    let mut options = SystemOptions::new(value_of::<String>("action", args).parse()?);
    options.in_min = value_of_if_exists::<u32>("in-min", args).copied();
    options.at = value_of_if_exists::<String>("at", args).cloned();
    options.other_re = flag("other-re", args);
    options.all_re = !(options.other_re || flag("this-re", args));
    options.media = flag("media", args);
    options.vmhost = flag("vmhost", args);
    options.member_id = values_of::<String>("member-id", args).into_iter().cloned().collect();
    options.check_mode = check_mode(args);
    let result = run(session, &options).await;
    Ok(serde_json::to_value(result)?)
}

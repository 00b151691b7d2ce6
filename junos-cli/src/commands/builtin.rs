use crate::commands::*;
use crate::config::Config;
use clap::builder::{IntoResettable, ValueParser};
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use junos_async::error::JunosClientResult;
use junos_async::message::IgnoreWarning;
use junos_async::session::DeviceSession;
use serde_json::Value;
use std::path::PathBuf;

pub fn builtin() -> Vec<Command> {
    vec![
        rpc::cli(),
        command::cli(),
        configure::cli(),
        file_copy::cli(),
        jsnapy::cli(),
        system::cli(),
        software::cli(),
        facts::cli(),
        ping::cli(),
        pmtud::cli(),
    ]
}

/// Runs `cmd` on one device and returns its JSON result.
pub async fn builtin_exec(
    cmd: &str,
    session: &mut DeviceSession,
    args: &Config,
) -> Option<JunosClientResult<Value>> {
    let f = match cmd {
        "rpc" => rpc::exec(args, session).await,
        "command" => command::exec(args, session).await,
        "config" => configure::exec(args, session).await,
        "file-copy" => file_copy::exec(args, session).await,
        "jsnapy" => jsnapy::exec(args, session).await,
        "system" => system::exec(args, session).await,
        "software" => software::exec(args, session).await,
        "facts" => facts::exec(args, session).await,
        "ping" => ping::exec(args, session).await,
        "pmtud" => pmtud::exec(args, session).await,
        _ => return None,
    };
    Some(f)
}

pub(crate) fn value_of<'a, T: Clone + Send + Sync + 'static>(
    name: &str,
    args: &'a ArgMatches,
) -> &'a T {
    args.get_one::<T>(name).unwrap()
}

pub(crate) fn value_of_if_exists<'a, T: Clone + Send + Sync + 'static>(
    name: &str,
    args: &'a ArgMatches,
) -> Option<&'a T> {
    if args.contains_id(name) {
        args.get_one::<T>(name)
    } else {
        None
    }
}

pub(crate) fn values_of<'a, T: Clone + Send + Sync + 'static>(
    name: &str,
    args: &'a ArgMatches,
) -> Vec<&'a T> {
    args.get_many::<T>(name).unwrap_or_default().collect()
}

pub(crate) fn flag(name: &str, args: &ArgMatches) -> bool {
    args.get_flag(name)
}

pub(crate) fn path_of(name: &str, args: &ArgMatches) -> Option<PathBuf> {
    value_of_if_exists::<String>(name, args).map(PathBuf::from)
}

/// `--ignore-warning` values: `true` ignores every warning, anything else
/// is a message pattern.
pub(crate) fn ignore_warning(args: &ArgMatches) -> IgnoreWarning {
    let values: Vec<String> = values_of::<String>("ignore-warning", args)
        .into_iter()
        .cloned()
        .collect();
    IgnoreWarning::from_values(&values)
}

/// The global `--check` switch.
pub(crate) fn check_mode(args: &ArgMatches) -> bool {
    flag("check", args)
}

pub(super) fn subcommand(name: &'static str, about: &'static str) -> Command {
    Command::new(name).about(about).help_template(color_print::cstr!(
        "\
{about-with-newline}
<green,bold>Usage:</> {usage}

<green,bold>Options:</>
{options}\n",
    ))
}

pub(super) fn arg(
    name: &'static str,
    help: &'static str,
    required: bool,
    short: Option<char>,
    default: Option<&'static str>,
    hint: Option<ValueHint>,
    parser: impl IntoResettable<ValueParser>,
) -> Arg {
    Arg::new(name)
        .short(short)
        .long(name)
        .help(help)
        .required(required)
        .default_value(default)
        .value_hint(hint)
        .value_parser(parser)
}

pub(super) fn switch(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .action(ArgAction::SetTrue)
}

pub(super) fn multi(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .action(ArgAction::Append)
}

pub(super) fn ignore_warning_arg() -> Arg {
    multi(
        "ignore-warning",
        "Ignore RPC warnings: 'true' for all, or a message pattern (repeatable)",
    )
}

pub(super) fn dest_args() -> [Arg; 2] {
    [
        arg(
            "dest",
            "Save every output to this file",
            false,
            None,
            None,
            Some(ValueHint::FilePath),
            ValueParser::string(),
        )
        .conflicts_with("dest-dir"),
        arg(
            "dest-dir",
            "Save each output to its own file in this directory",
            false,
            None,
            None,
            Some(ValueHint::DirPath),
            ValueParser::string(),
        ),
    ]
}

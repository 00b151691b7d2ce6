use crate::commands::builtin::{
    arg, check_mode, dest_args, flag, ignore_warning, ignore_warning_arg, multi, path_of,
    subcommand, switch, value_of, value_of_if_exists, values_of,
};
use crate::commands::rpc::pairs;
use crate::config::Config;
use clap::builder::ValueParser;
use clap::{value_parser, ArgMatches, Command, ValueHint};
use junos_async::configuration::task::{run, ConfigTaskOptions};
use junos_async::configuration::{ConfigMode, LoadSource};
use junos_async::error::JunosClientResult;
use junos_async::session::DeviceSession;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

pub fn cli() -> Command {
    subcommand(
        "config",
        "Load, roll back, diff, commit or retrieve configuration",
    )
    .args([
        arg(
            "config-mode",
            "Configuration database mode",
            false,
            None,
            Some("exclusive"),
            None,
            ["exclusive", "private", "dynamic", "batch", "ephemeral"],
        ),
        arg(
            "ephemeral-instance",
            "Named ephemeral instance, requires --config-mode ephemeral",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        ),
        arg(
            "load",
            "Load action",
            false,
            None,
            None,
            None,
            ["merge", "replace", "set", "override", "overwrite", "update", "patch"],
        ),
        arg(
            "src",
            "Local file with the configuration to load",
            false,
            None,
            None,
            Some(ValueHint::FilePath),
            ValueParser::string(),
        )
        .conflicts_with_all(["lines", "url"]),
        multi("lines", "Configuration line to load (repeatable)").conflicts_with("url"),
        arg(
            "url",
            "URL the device loads the configuration from",
            false,
            None,
            None,
            Some(ValueHint::Url),
            ValueParser::string(),
        ),
        arg(
            "format",
            "Format of the loaded configuration, guessed when left out",
            false,
            None,
            None,
            None,
            ["text", "set", "xml", "json"],
        ),
        arg(
            "rollback",
            "Roll back to a checkpoint 0-49 or 'rescue'",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        )
        .conflicts_with("load"),
        switch("no-commit-check", "Skip the commit check"),
        switch("no-diff", "Skip the diff"),
        arg(
            "diffs-file",
            "Save the diff to this file",
            false,
            None,
            None,
            Some(ValueHint::FilePath),
            ValueParser::string(),
        ),
        arg(
            "retrieve",
            "Retrieve this database after the changes",
            false,
            None,
            None,
            None,
            ["committed", "candidate"],
        ),
        arg(
            "retrieve-format",
            "Format of the retrieved configuration",
            false,
            None,
            None,
            None,
            ["text", "set", "xml", "json"],
        ),
        arg(
            "filter",
            "Configuration filter for the retrieved configuration",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        ),
        multi("option", "get-configuration attribute, key=value (repeatable)"),
        switch("commit", "Commit even without load or rollback").conflicts_with("no-commit"),
        switch("no-commit", "Do not commit"),
        switch("commit-empty-changes", "Commit even when the diff is empty"),
        arg(
            "confirmed",
            "Roll back unless confirmed within this many minutes",
            false,
            None,
            None,
            None,
            value_parser!(u32).range(1..),
        ),
        arg(
            "comment",
            "Commit comment",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        ),
        switch("confirm-commit", "Confirm a previous confirmed commit"),
        arg(
            "commit-timeout",
            "Commit RPC timeout in seconds",
            false,
            None,
            None,
            None,
            value_parser!(u64),
        ),
        switch("commit-full", "Commit full"),
        switch("commit-sync", "Commit synchronize"),
        switch("commit-force-sync", "Commit synchronize force"),
        ignore_warning_arg(),
        switch("no-output", "Leave the retrieved configuration out of the result"),
    ])
    .args(dest_args())
}

fn load_source(args: &ArgMatches) -> Option<LoadSource> {
    if let Some(src) = value_of_if_exists::<String>("src", args) {
        return Some(LoadSource::File(PathBuf::from(src)));
    }
    if let Some(url) = value_of_if_exists::<String>("url", args) {
        return Some(LoadSource::Url(url.clone()));
    }
    let lines: Vec<String> = values_of::<String>("lines", args).into_iter().cloned().collect();
    match lines.is_empty() {
        true => None,
        false => Some(LoadSource::Lines(lines)),
    }
}

fn options(args: &ArgMatches) -> JunosClientResult<ConfigTaskOptions> {
    let mut options = ConfigTaskOptions::new();
    options.mode = ConfigMode::parse(
        value_of::<String>("config-mode", args),
        value_of_if_exists::<String>("ephemeral-instance", args).map(|i| i.as_str()),
    )?;
    options.ignore_warning = ignore_warning(args);
    options.load = value_of_if_exists::<String>("load", args)
        .map(|load| load.parse())
        .transpose()?;
    options.source = load_source(args);
    options.format = value_of_if_exists::<String>("format", args)
        .map(|format| format.parse())
        .transpose()?;
    options.rollback = value_of_if_exists::<String>("rollback", args)
        .map(|id| id.parse())
        .transpose()?;
    if flag("no-commit-check", args) {
        options.check = Some(false);
    }
    if flag("no-diff", args) {
        options.diff = Some(false);
    }
    if flag("commit", args) {
        options.commit = Some(true);
    } else if flag("no-commit", args) {
        options.commit = Some(false);
    }
    options.diffs_file = path_of("diffs-file", args);
    options.dest = path_of("dest", args);
    options.dest_dir = path_of("dest-dir", args);
    options.retrieve = value_of_if_exists::<String>("retrieve", args)
        .map(|db| db.parse())
        .transpose()?;
    options.retrieve_format = value_of_if_exists::<String>("retrieve-format", args)
        .map(|format| format.parse())
        .transpose()?;
    options.filter = value_of_if_exists::<String>("filter", args).cloned();
    for value in values_of::<String>("option", args) {
        options.options.extend(pairs(value)?);
    }
    options.return_output = !flag("no-output", args);
    options.commit_empty_changes = flag("commit-empty-changes", args);
    options.confirmed = value_of_if_exists::<u32>("confirmed", args).copied();
    options.comment = value_of_if_exists::<String>("comment", args).cloned();
    options.confirm_commit = flag("confirm-commit", args);
    options.commit_timeout = value_of_if_exists::<u64>("commit-timeout", args)
        .map(|secs| Duration::from_secs(*secs));
    options.commit_full = flag("commit-full", args);
    options.commit_sync = flag("commit-sync", args);
    options.commit_force_sync = flag("commit-force-sync", args);
    options.check_mode = check_mode(args);
    Ok(options)
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let options = options(&cfg.args)?;
    Ok(serde_json::to_value(run(session, &options).await)?)
}

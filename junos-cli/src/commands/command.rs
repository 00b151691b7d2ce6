use crate::commands::builtin::{
    dest_args, flag, ignore_warning, ignore_warning_arg, multi, path_of, subcommand, switch,
    values_of,
};
use crate::config::Config;
use clap::Command;
use junos_async::command::{run, CommandOptions};
use junos_async::error::JunosClientResult;
use junos_async::rpc::{OutputFormat, OUTPUT_FORMATS};
use junos_async::session::DeviceSession;
use serde_json::Value;

pub fn cli() -> Command {
    subcommand("command", "Execute CLI commands")
        .args([
            multi("command", "CLI command, e.g. 'show version' (repeatable)").required(true),
            multi("format", "Output format, one for all commands or one per command")
                .value_parser(OUTPUT_FORMATS),
            ignore_warning_arg(),
            switch("no-output", "Leave the output out of the result"),
        ])
        .args(dest_args())
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let args = &cfg.args;
    let mut options =
        CommandOptions::new(values_of::<String>("command", args).into_iter().cloned().collect());
    let formats: Vec<OutputFormat> = values_of::<String>("format", args)
        .into_iter()
        .map(|f| f.parse())
        .collect::<JunosClientResult<_>>()?;
    if !formats.is_empty() {
        options.formats = formats;
    }
    options.dest = path_of("dest", args);
    options.dest_dir = path_of("dest-dir", args);
    options.ignore_warning = ignore_warning(args);
    options.return_output = !flag("no-output", args);
    run(session, &options).await.to_json()
}

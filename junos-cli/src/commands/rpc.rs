use crate::commands::builtin::{
    dest_args, flag, ignore_warning, ignore_warning_arg, multi, path_of, subcommand, switch,
    value_of_if_exists, values_of,
};
use crate::config::Config;
use clap::{Arg, Command};
use junos_async::error::{JunosClientError, JunosClientResult};
use junos_async::rpc::{run, ArgValue, Attrs, Kwargs, OutputFormat, RpcOptions, OUTPUT_FORMATS};
use junos_async::session::DeviceSession;
use serde_json::Value;

pub fn cli() -> Command {
    subcommand("rpc", "Execute Junos RPCs").args([
        multi("rpc", "RPC name, e.g. get-interface-information (repeatable)").required(true),
        multi("format", "Output format, one for all RPCs or one per RPC")
            .value_parser(OUTPUT_FORMATS),
        multi("kwargs", "Comma separated key=value arguments, one per RPC"),
        multi("attrs", "Comma separated key=value attributes, one per RPC"),
        Arg::new("filter")
            .long("filter")
            .help("Configuration filter for a single get-config RPC"),
        ignore_warning_arg(),
        switch("no-output", "Leave the output out of the result"),
    ])
    .args(dest_args())
}

/// Parses `a=1,b=true` pairs.
pub(crate) fn pairs(value: &str) -> JunosClientResult<Vec<(String, String)>> {
    value
        .split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| {
                    JunosClientError::new(format!("Expected key=value, found '{}'", pair))
                })
        })
        .collect()
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let args = &cfg.args;
    let mut options = RpcOptions::new(values_of::<String>("rpc", args).into_iter().cloned().collect());
    options.formats = values_of::<String>("format", args)
        .into_iter()
        .map(|f| f.parse::<OutputFormat>())
        .collect::<JunosClientResult<_>>()?;
    let kwargs = values_of::<String>("kwargs", args);
    if !kwargs.is_empty() {
        options.kwargs = Some(
            kwargs
                .into_iter()
                .map(|value| {
                    Ok(pairs(value)?
                        .into_iter()
                        .map(|(k, v)| (k, ArgValue::parse(&v)))
                        .collect::<Kwargs>())
                })
                .collect::<JunosClientResult<_>>()?,
        );
    }
    let attrs = values_of::<String>("attrs", args);
    if !attrs.is_empty() {
        options.attrs = Some(
            attrs
                .into_iter()
                .map(|value| Ok(pairs(value)?.into_iter().collect::<Attrs>()))
                .collect::<JunosClientResult<_>>()?,
        );
    }
    options.filter = value_of_if_exists::<String>("filter", args).cloned();
    options.dest = path_of("dest", args);
    options.dest_dir = path_of("dest-dir", args);
    options.ignore_warning = ignore_warning(args);
    options.return_output = !flag("no-output", args);
    run(session, &options).await.to_json()
}

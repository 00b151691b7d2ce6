use crate::commands::builtin::{flag, value_of};
use config::CliConfig;
use env_logger::{Builder, Target};
use junos_async::error::JunosClientResult;
use log::LevelFilter;

mod cli;
mod commands;
mod config;

/// Logs go to stderr so that stdout only carries the JSON results.
///
/// `-v` shows progress of the library, `-vv` adds every RPC reply and
/// `-vvv` everything including the framing layer.
fn init_logging(verbosity: u8) {
    let modules: &[(&str, LevelFilter)] = match verbosity {
        0 => &[("junos_async", LevelFilter::Warn)],
        1 => &[("junos_async", LevelFilter::Info)],
        2 => &[
            ("junos_async", LevelFilter::Info),
            ("junos_async::connection", LevelFilter::Debug),
            ("junos_async::framer", LevelFilter::Off),
        ],
        _ => &[("junos_async", LevelFilter::Debug)],
    };
    let mut builder = Builder::new();
    builder.filter_level(match verbosity {
        0 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    });
    for (module, level) in modules {
        builder.filter_module(module, *level);
    }
    builder.target(Target::Stderr).init();
}

#[tokio::main]
async fn main() -> JunosClientResult<()> {
    let mut args = cli::cli().get_matches();
    if !flag("quiet", &args) {
        init_logging(*value_of::<u8>("verbose", &args));
    }

    if let Some((cmd, sub_args)) = args.remove_subcommand() {
        return cli::exec(cmd, CliConfig::new(sub_args)?).await;
    }
    cli::cli().print_help()?;
    Ok(())
}

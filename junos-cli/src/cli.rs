use crate::commands::builtin::{builtin, builtin_exec};
use crate::config::{CliConfig, CliConnector};
use clap::{
    arg, crate_description, crate_name, crate_version, value_parser, Arg, ArgAction, Command,
};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use junos_async::error::{JunosClientError, JunosClientResult};
use junos_async::session::{SessionConfig, SessionManager};
use log::{debug, error, info};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Runs `cmd` on every host concurrently and prints one JSON document per
/// host. Fails when any host failed.
pub async fn exec(cmd: String, cfg: CliConfig) -> JunosClientResult<()> {
    let manager = Arc::new(SessionManager::new(CliConnector::new(cfg.clone())));
    let hosts = &cfg.inner.addresses;
    if hosts.is_empty() {
        return Err(JunosClientError::new(
            "No hosts given, use --host or JUNOS_HOST".to_string(),
        ));
    }
    let mut futures = FuturesUnordered::new();
    for addr in hosts {
        let session_config = cfg.session_config(addr)?;
        let start_time = Instant::now();
        let cmd_clone = cmd.clone();
        let cfg_clone = cfg.clone();
        let manager = manager.clone();
        let handle: JoinHandle<JunosClientResult<bool>> = tokio::spawn(async move {
            let host = session_config.host.clone();
            let outcome = run_on_host(&manager, &session_config, &cmd_clone, &cfg_clone).await;
            let (report, failed) = host_report(&host, outcome);
            println!("{}", serde_json::to_string_pretty(&report)?);

            info!(target: &host, "Operation took: {:.3}s", start_time.elapsed().as_secs_f32());
            if let Err(err) = manager.release(&session_config).await {
                debug!(target: &host, "Error closing session: {}", err);
            }
            Ok(failed)
        });
        futures.push(handle);
    }

    let mut failures = 0;
    while let Some(handle) = futures.next().await {
        match handle {
            Ok(Ok(false)) => debug!("Task completed successfully"),
            Ok(Ok(true)) => failures += 1,
            Ok(Err(err)) => {
                error!("Task failed with error: {}", err);
                failures += 1;
            }
            Err(err) => {
                error!("Task failed: {}", err);
                failures += 1;
            }
        }
    }
    manager.close_all().await;
    if failures > 0 {
        return Err(JunosClientError::new(format!(
            "{} of {} hosts failed",
            failures,
            hosts.len()
        )));
    }
    Ok(())
}

async fn run_on_host(
    manager: &SessionManager<CliConnector>,
    session_config: &SessionConfig,
    cmd: &str,
    cfg: &CliConfig,
) -> JunosClientResult<Value> {
    let shared = manager.acquire(session_config).await?;
    info!(target: &session_config.host, "Connected to host");
    let mut session = shared.lock().await;
    let result = match builtin_exec(cmd, &mut session, &cfg.inner).await {
        Some(result) => result,
        None => Err(JunosClientError::new(format!("Unknown command {}", cmd))),
    };
    result
}

/// The JSON document printed for one host. Errors that kept the command
/// from producing a result are reported as a failed result.
fn host_report(host: &str, outcome: JunosClientResult<Value>) -> (Value, bool) {
    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            error!(target: host, "{}", err);
            json!({ "changed": false, "failed": true, "msg": err.to_string() })
        }
    };
    let failed = result["failed"].as_bool().unwrap_or(false);
    (json!({ "host": host, "result": result }), failed)
}

pub fn cli() -> Command {
    Command::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .long_version(crate_version!())
        .arg_required_else_help(true)
        .allow_external_subcommands(false)
        .bin_name("junos")
        .display_name("junos")
        .help_template(color_print::cstr!(
            "\
{about-with-newline}
<green,bold>Usage:</> {usage}

<green,bold>Options:</>
{options}

<green,bold>Commands:</>
    <cyan,bold>rpc</>               Execute Junos RPCs
    <cyan,bold>command</>           Execute CLI commands
    <cyan,bold>config</>            Load, roll back, diff, commit or retrieve configuration
    <cyan,bold>file-copy</>         Copy a file to or from the device
    <cyan,bold>jsnapy</>            Take snapshots and run snapshot tests
    <cyan,bold>system</>            Reboot, shut down, halt or zeroize
    <cyan,bold>software</>          Install a software package
    <cyan,bold>facts</>             Gather device facts
    <cyan,bold>ping</>              Ping from the device
    <cyan,bold>pmtud</>             Discover the path MTU from the device

See '<cyan,bold>junos help</> <cyan><<command>></>' for more information on a specific command.\n",
        ))
        .args([
            arg!(-v --verbose ... "Use verbose output (-vv to log all rpc responses, -vvv to print also rpc requests)")
                .global(true),
            arg!(-q --quiet "Disable logging completely")
                .global(true),
            global_opt("host", "Device address, host[:port] (repeatable or comma separated)")
                .env("JUNOS_HOST")
                .action(ArgAction::Append)
                .value_delimiter(','),
            global_opt("username", "Username for the NETCONF connection")
                .env("JUNOS_USERNAME"),
            global_opt("password", "Password for the NETCONF connection")
                .env("JUNOS_PASSWORD")
                .hide_env(true),
            global_opt("port", "Port, defaults to 830 for netconf and 22 for ssh")
                .value_parser(value_parser!(u16)),
            global_opt("transport", "Transport, netconf or ssh")
                .value_parser(["netconf", "ssh"])
                .default_value("netconf"),
            global_opt("timeout", "RPC timeout in seconds")
                .value_parser(value_parser!(u64))
                .default_value("30"),
            global_opt("attempts", "Connection attempts before giving up")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("3"),
            arg!(--check "Report what would change without changing the device")
                .global(true),
        ])
        .subcommands(builtin())
}

fn global_opt(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).help(help).long(name).global(true)
}

use crate::commands::builtin::{
    arg, check_mode, flag, multi, path_of, subcommand, switch, value_of, value_of_if_exists,
    values_of,
};
use crate::config::Config;
use clap::builder::ValueParser;
use clap::{value_parser, Command, ValueHint};
use junos_async::error::JunosClientResult;
use junos_async::file_copy::open_transport;
use junos_async::session::DeviceSession;
use junos_async::software::{run, SoftwareOptions};
use junos_async::transfer::FileTransport;
use log::debug;
use serde_json::Value;
use std::time::Duration;

pub fn cli() -> Command {
    subcommand("software", "Install a software package").args([
        arg(
            "local-package",
            "Package on this host, copied to the device first",
            false,
            None,
            None,
            Some(ValueHint::FilePath),
            ValueParser::string(),
        ),
        arg(
            "remote-package",
            "Package path on the device, or a URL the device fetches",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        ),
        arg(
            "version",
            "Target version, parsed from the package name when left out",
            false,
            None,
            None,
            None,
            ValueParser::string(),
        ),
        switch("no-copy", "Install on the routing engine of the session only"),
        switch("no-reboot", "Do not reboot after installing"),
        arg(
            "reboot-pause",
            "Seconds to wait after initiating the reboot",
            false,
            None,
            Some("10"),
            None,
            value_parser!(u64),
        ),
        switch("validate", "Validate the configuration against the package"),
        switch("no-cleanfs", "Skip the storage cleanup before copying"),
        switch("this-re", "Install on the routing engine of the session only"),
        multi("member-id", "Virtual chassis member (repeatable)"),
        switch("vmhost", "Install a VM host package"),
        switch("issu", "In-service software upgrade").conflicts_with("nssu"),
        switch("nssu", "Nonstop software upgrade"),
        arg(
            "checksum",
            "Checksum used to verify the copied package",
            false,
            None,
            Some("md5"),
            None,
            ["md5", "sha1", "sha256"],
        ),
        arg(
            "install-timeout",
            "Install RPC timeout in seconds",
            false,
            None,
            Some("1800"),
            None,
            value_parser!(u64),
        ),
        arg(
            "protocol",
            "Protocol used to copy a local package",
            false,
            None,
            Some("scp"),
            None,
            ["scp", "ftp"],
        ),
    ])
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let args = &cfg.args;
    let options = SoftwareOptions {
        local_package: path_of("local-package", args),
        remote_package: value_of_if_exists::<String>("remote-package", args).cloned(),
        version: value_of_if_exists::<String>("version", args).cloned(),
        no_copy: flag("no-copy", args),
        reboot: !flag("no-reboot", args),
        reboot_pause: Duration::from_secs(*value_of::<u64>("reboot-pause", args)),
        validate: flag("validate", args),
        cleanfs: !flag("no-cleanfs", args),
        all_re: !flag("this-re", args),
        member_id: values_of::<String>("member-id", args).into_iter().cloned().collect(),
        vmhost: flag("vmhost", args),
        issu: flag("issu", args),
        nssu: flag("nssu", args),
        checksum_algorithm: value_of::<String>("checksum", args).parse()?,
        install_timeout: Duration::from_secs(*value_of::<u64>("install-timeout", args)),
        check_mode: check_mode(args),
    };

    let mut transport: Option<Box<dyn FileTransport>> = None;
    if options.local_package.is_some() && !options.check_mode {
        let protocol = value_of::<String>("protocol", args).parse()?;
        transport = Some(open_transport(session.config(), protocol).await?);
    }
    let result = run(session, transport.as_deref_mut(), &options).await;
    if let Some(mut transport) = transport {
        if let Err(err) = transport.close().await {
            debug!(target: session.host(), "Error closing the package transport: {}", err);
        }
    }
    Ok(serde_json::to_value(result)?)
}

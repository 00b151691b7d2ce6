use crate::commands::builtin::{arg, subcommand, value_of};
use crate::config::Config;
use clap::builder::ValueParser;
use clap::{Command, ValueHint};
use junos_async::error::JunosClientResult;
use junos_async::file_copy::{open_transport, run, FileCopyOptions};
use junos_async::session::DeviceSession;
use log::debug;
use serde_json::Value;
use std::path::PathBuf;

pub fn cli() -> Command {
    subcommand("file-copy", "Copy a file to or from the device").args([
        arg(
            "local-dir",
            "Local directory",
            true,
            None,
            None,
            Some(ValueHint::DirPath),
            ValueParser::string(),
        ),
        arg(
            "remote-dir",
            "Directory on the device",
            true,
            None,
            None,
            None,
            ValueParser::string(),
        ),
        arg(
            "file",
            "File name, the same in both directories",
            true,
            Some('f'),
            None,
            None,
            ValueParser::string(),
        ),
        arg(
            "action",
            "put copies to the device, get copies from it",
            false,
            None,
            Some("put"),
            None,
            ["put", "get"],
        ),
        arg(
            "protocol",
            "Transfer protocol",
            false,
            None,
            Some("scp"),
            None,
            ["scp", "ftp"],
        ),
        arg(
            "checksum",
            "Verify the copy with this checksum, none to skip",
            false,
            None,
            Some("md5"),
            None,
            ["md5", "sha1", "sha256", "none"],
        ),
    ])
}

pub async fn exec(cfg: &Config, session: &mut DeviceSession) -> JunosClientResult<Value> {
    let args = &cfg.args;
    let options = FileCopyOptions {
        local_dir: PathBuf::from(value_of::<String>("local-dir", args)),
        remote_dir: value_of::<String>("remote-dir", args).clone(),
        file: value_of::<String>("file", args).clone(),
        action: value_of::<String>("action", args).parse()?,
        protocol: value_of::<String>("protocol", args).parse()?,
        checksum: value_of::<String>("checksum", args).parse()?,
    };
    let mut transport = open_transport(session.config(), options.protocol).await?;
    let result = run(session, transport.as_mut(), &options).await;
    if let Err(err) = transport.close().await {
        debug!(target: session.host(), "Error closing {:?} transport: {}", options.protocol, err);
    }
    Ok(serde_json::to_value(result)?)
}

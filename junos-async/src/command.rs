//! The `command` task: CLI commands sent as `<command>` RPCs.
use crate::error::{JunosClientError, JunosClientResult};
use crate::message::IgnoreWarning;
use crate::output::{ExecutionResult, OutputSink, TaskOutcome};
use crate::rpc::{OutputFormat, RpcResponse};
use crate::session::DeviceSession;
use crate::xml::XmlNode;
use log::{debug, info};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub commands: Vec<String>,
    pub formats: Vec<OutputFormat>,
    pub dest: Option<PathBuf>,
    pub dest_dir: Option<PathBuf>,
    pub ignore_warning: IgnoreWarning,
    pub return_output: bool,
}

impl CommandOptions {
    pub fn new(commands: Vec<String>) -> CommandOptions {
        CommandOptions {
            commands,
            formats: vec![OutputFormat::Text],
            return_output: true,
            ..Default::default()
        }
    }

    fn formats(&self) -> JunosClientResult<Vec<OutputFormat>> {
        let count = self.commands.len();
        if count == 0 {
            return Err(JunosClientError::new(
                "The commands option must have a value.".to_string(),
            ));
        }
        match self.formats.len() {
            0 => Ok(vec![OutputFormat::Text; count]),
            1 => Ok(vec![self.formats[0]; count]),
            n if n == count => Ok(self.formats.clone()),
            n => Err(JunosClientError::new(format!(
                "The formats option must have a single value, or one value per command. There are {} commands and {} formats.",
                count, n
            ))),
        }
    }
}

/// Runs one CLI command, e.g. `show interfaces terse`.
pub async fn execute(
    session: &mut DeviceSession,
    command: &str,
    format: OutputFormat,
    ignore: &IgnoreWarning,
) -> JunosClientResult<RpcResponse> {
    let body = XmlNode::with_text("command", command.trim()).attr("format", format.as_str());
    let reply = session.rpc(body, ignore).await?;
    RpcResponse::from_reply(&reply, format)
}

/// Runs every command in order. Invalid options yield a single failed
/// result.
pub async fn run(
    session: &mut DeviceSession,
    options: &CommandOptions,
) -> TaskOutcome<ExecutionResult> {
    let prepared = options.formats().and_then(|formats| {
        let sink = OutputSink::new(
            session.host(),
            options.dest.clone(),
            options.dest_dir.clone(),
        )?;
        Ok((formats, sink))
    });
    let (formats, mut sink) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => return TaskOutcome::Single(ExecutionResult::failure(err.to_string())),
    };

    let mut results = Vec::with_capacity(options.commands.len());
    for (command, format) in options.commands.iter().zip(formats) {
        let mut result = ExecutionResult {
            command: Some(command.clone()),
            format: format.to_string(),
            failed: true,
            ..Default::default()
        };
        match execute(session, command, format, &options.ignore_warning).await {
            Ok(response) => {
                info!(target: session.host(), "Command \"{}\" executed successfully", command);
                result.msg = "The command executed successfully.".to_string();
                if options.return_output {
                    result.set_output(&response.text, response.parsed.clone());
                }
                match sink.save(command, format.as_str(), &response.text).await {
                    Ok(_) => result.failed = false,
                    Err(err) => {
                        result.msg = format!(
                            "Unable to save the output of the command {}: {}",
                            command, err
                        );
                    }
                }
            }
            Err(err) => {
                debug!(target: session.host(), "Unable to execute \"{}\": {}", command, err);
                result.msg = format!("Unable to execute the command: {}. Error: {}", command, err);
            }
        }
        results.push(result);
    }
    TaskOutcome::from_results(results)
}

//! The `config` task: open, load or roll back, check, diff, commit and
//! close, reporting every step performed.
use super::{
    retrieve, CommitOptions, ConfigFormat, ConfigMode, Database, LoadAction, LoadSource,
    RetrievedConfig, RollbackId, Transaction,
};
use crate::error::{JunosClientError, JunosClientResult};
use crate::message::IgnoreWarning;
use crate::output::{OutputSink, TaskResult};
use crate::session::DeviceSession;
use log::{debug, info};
use serde_derive::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct ConfigTaskOptions {
    pub mode: ConfigMode,
    pub ignore_warning: IgnoreWarning,
    pub load: Option<LoadAction>,
    pub source: Option<LoadSource>,
    pub format: Option<ConfigFormat>,
    pub rollback: Option<RollbackId>,
    /// Defaults to true when loading or rolling back.
    pub check: Option<bool>,
    /// Defaults to true when loading or rolling back.
    pub diff: Option<bool>,
    pub diffs_file: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub dest_dir: Option<PathBuf>,
    pub retrieve: Option<Database>,
    pub retrieve_format: Option<ConfigFormat>,
    pub filter: Option<String>,
    pub options: Vec<(String, String)>,
    pub return_output: bool,
    /// Defaults to true when loading or rolling back.
    pub commit: Option<bool>,
    pub commit_empty_changes: bool,
    pub confirmed: Option<u32>,
    pub comment: Option<String>,
    pub confirm_commit: bool,
    pub commit_timeout: Option<Duration>,
    pub commit_full: bool,
    pub commit_sync: bool,
    pub commit_force_sync: bool,
    /// Report what would change but never commit.
    pub check_mode: bool,
}

impl ConfigTaskOptions {
    pub fn new() -> ConfigTaskOptions {
        ConfigTaskOptions {
            return_output: true,
            ..Default::default()
        }
    }

    fn changes_requested(&self) -> bool {
        self.load.is_some() || self.rollback.is_some()
    }

    fn validate(&self) -> JunosClientResult<()> {
        if self.load.is_some() && self.rollback.is_some() {
            return Err(JunosClientError::new(
                "parameters are mutually exclusive: load|rollback".to_string(),
            ));
        }
        match (&self.load, &self.source) {
            (Some(load), None) => Err(JunosClientError::new(format!(
                "The load option ({}) is specified, but none of src, lines, or url are specified. Must specify one of the src, lines, or url options.",
                load.as_str()
            ))),
            (None, Some(_)) => Err(JunosClientError::new(
                "The src, lines, or url options require the load option.".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn commit_options(&self) -> CommitOptions {
        CommitOptions {
            comment: self.comment.clone(),
            confirmed: self.confirmed,
            timeout: self.commit_timeout,
            full: self.commit_full,
            sync: self.commit_sync,
            force_sync: self.commit_force_sync,
            ignore_warning: self.ignore_warning.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigResult {
    pub msg: String,
    pub changed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_lines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_lines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_parsed: Option<Value>,
}

impl TaskResult for ConfigResult {
    fn failed(&self) -> bool {
        self.failed
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

/// Steps performed, rendered into the result message.
#[derive(Debug, Default)]
struct Steps(Vec<&'static str>);

impl Steps {
    fn push(&mut self, step: &'static str) {
        self.0.push(step);
    }

    fn message(&self) -> String {
        format!("Configuration has been: {}.", self.0.join(", "))
    }
}

/// Runs the task. Errors that stop it before or outside a transaction,
/// such as a configuration locked by another user, become a failed result.
pub async fn run(session: &mut DeviceSession, options: &ConfigTaskOptions) -> ConfigResult {
    match execute(session, options).await {
        Ok(result) => result,
        Err(err) => {
            debug!(target: session.host(), "Configuration task failed: {}", err);
            ConfigResult {
                msg: err.to_string(),
                failed: true,
                ..Default::default()
            }
        }
    }
}

async fn execute(
    session: &mut DeviceSession,
    options: &ConfigTaskOptions,
) -> JunosClientResult<ConfigResult> {
    options.validate()?;
    let mut sink = OutputSink::new(session.host(), options.dest.clone(), options.dest_dir.clone())?
        .with_diffs_file(options.diffs_file.clone());
    let mut result = ConfigResult::default();
    let mut steps = Steps::default();

    let needs_open = options.changes_requested()
        || options.commit.unwrap_or(false)
        || options.confirm_commit;
    if !needs_open {
        if let Some(database) = options.retrieve {
            let config = retrieve(
                session,
                database,
                options.retrieve_format.unwrap_or(ConfigFormat::Text),
                options.filter.as_deref(),
                &options.options,
            )
            .await?;
            report_config(&mut result, &mut sink, options, config).await?;
            steps.push("retrieved");
        }
        result.msg = steps.message();
        return Ok(result);
    }

    let mut tx = Transaction::open(session, options.mode.clone(), Some(options.ignore_warning.clone()))
        .await?;
    steps.push("opened");

    let outcome = apply(&mut tx, options, &mut sink, &mut result, &mut steps).await;
    let closed = tx.close().await;
    match (outcome, closed) {
        (Err(err), _) | (Ok(()), Err(err)) => {
            debug!("Configuration task failed after: {}", steps.message());
            result.failed = true;
            result.msg = err.to_string();
        }
        (Ok(()), Ok(())) => {
            steps.push("closed");
            result.msg = steps.message();
            info!("{}", result.msg);
        }
    }
    Ok(result)
}

async fn apply(
    tx: &mut Transaction<'_>,
    options: &ConfigTaskOptions,
    sink: &mut OutputSink,
    result: &mut ConfigResult,
    steps: &mut Steps,
) -> JunosClientResult<()> {
    if let (Some(action), Some(source)) = (options.load, &options.source) {
        tx.load(action, options.format, source.clone(), None).await?;
        steps.push("loaded");
    }
    if let Some(id) = options.rollback {
        tx.rollback(id).await?;
        steps.push("rolled back");
    }

    let changes = options.changes_requested();
    if options.check.unwrap_or(changes) {
        tx.check().await?;
        steps.push("checked");
    }

    let mut diff_found = false;
    if options.diff.unwrap_or(changes) {
        let diff = tx.diff().await?;
        steps.push("diffed");
        if let Some(diff) = diff {
            diff_found = true;
            result.changed = true;
            if options.return_output {
                result.diff_lines = Some(diff.lines().map(|l| l.to_string()).collect());
                result.diff = Some(json!({ "prepared": diff }));
            }
            sink.save("diff", "diff", &diff).await?;
        }
    }

    if let Some(database) = options.retrieve {
        let config = tx
            .retrieve(
                database,
                options.retrieve_format.unwrap_or(ConfigFormat::Text),
                options.filter.as_deref(),
            )
            .await?;
        report_config(result, sink, options, config).await?;
    }

    if options.check_mode {
        if changes {
            tx.discard().await?;
        }
        return Ok(());
    }

    let commit = options.commit.unwrap_or(changes);
    if commit && (diff_found || options.commit_empty_changes || !options.diff.unwrap_or(changes)) {
        tx.commit(&options.commit_options()).await?;
        result.changed = true;
        steps.push("committed");
    } else if commit {
        debug!("No configuration differences, skipping commit");
    }

    if options.confirm_commit {
        tx.confirm(options.comment.as_deref()).await?;
        result.changed = true;
        steps.push("committed");
    }
    Ok(())
}

async fn report_config(
    result: &mut ConfigResult,
    sink: &mut OutputSink,
    options: &ConfigTaskOptions,
    config: RetrievedConfig,
) -> JunosClientResult<()> {
    sink.save("config", config.format.as_str(), &config.text)
        .await?;
    if options.return_output {
        result.config_lines = Some(config.lines());
        result.config_parsed = config.parsed;
        result.config = Some(config.text);
    }
    Ok(())
}

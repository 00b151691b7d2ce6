//! Candidate configuration transactions.
//!
//! A [`Transaction`] opens the candidate database in one of the Junos
//! configuration modes, loads changes, diffs and checks them, commits and
//! finally closes the database again. Only one transaction may have the
//! configuration open on a device session at a time.
use crate::error::{JunosClientError, JunosClientResult};
use crate::message::{ErrorTag, IgnoreWarning, RpcReply};
use crate::rpc::{filter_to_xml, OutputFormat, RpcResponse};
use crate::session::DeviceSession;
use crate::xml::XmlNode;
use core::fmt;
use core::str::FromStr;
use log::{debug, info, warn};
use serde_derive::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

pub mod task;

/// Warning Junos returns whenever a private style database is opened.
pub const UNCOMMITTED_CHANGES_WARNING: &str = "uncommitted changes will be discarded on exit";

pub const MAX_ROLLBACK_ID: u8 = 49;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigMode {
    #[default]
    Exclusive,
    Private,
    Dynamic,
    Batch,
    /// The default ephemeral database, or a named instance.
    Ephemeral(Option<String>),
}

impl ConfigMode {
    /// Combines the `config_mode` and `ephemeral_instance` options.
    pub fn parse(mode: &str, ephemeral_instance: Option<&str>) -> JunosClientResult<ConfigMode> {
        let mode = match mode {
            "exclusive" => ConfigMode::Exclusive,
            "private" => ConfigMode::Private,
            "dynamic" => ConfigMode::Dynamic,
            "batch" => ConfigMode::Batch,
            "ephemeral" => ConfigMode::Ephemeral(ephemeral_instance.map(|i| i.to_string())),
            _ => {
                return Err(JunosClientError::new(format!(
                    "Invalid configuration mode: {}",
                    mode
                )))
            }
        };
        if ephemeral_instance.is_some() && !matches!(mode, ConfigMode::Ephemeral(_)) {
            return Err(JunosClientError::new(
                "Ephemeral instance is specified while the mode is not ephemeral. Specify the mode as ephemeral or do not specify the instance."
                    .to_string(),
            ));
        }
        Ok(mode)
    }

    fn open_rpc(&self) -> XmlNode {
        let open = XmlNode::new("open-configuration");
        match self {
            ConfigMode::Exclusive => XmlNode::new("lock-configuration"),
            ConfigMode::Private => open.child(XmlNode::new("private")),
            ConfigMode::Dynamic => open.child(XmlNode::new("dynamic")),
            ConfigMode::Batch => open.child(XmlNode::new("batch")),
            ConfigMode::Ephemeral(None) => open.child(XmlNode::new("ephemeral")),
            ConfigMode::Ephemeral(Some(instance)) => {
                open.child(XmlNode::with_text("ephemeral-instance", instance.as_str()))
            }
        }
    }

    fn close_rpc(&self) -> XmlNode {
        match self {
            ConfigMode::Exclusive => XmlNode::new("unlock-configuration"),
            _ => XmlNode::new("close-configuration"),
        }
    }
}

impl fmt::Display for ConfigMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigMode::Exclusive => "exclusive",
            ConfigMode::Private => "private",
            ConfigMode::Dynamic => "dynamic",
            ConfigMode::Batch => "batch",
            ConfigMode::Ephemeral(_) => "ephemeral",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAction {
    Merge,
    Replace,
    Set,
    Override,
    Update,
    Patch,
}

impl LoadAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadAction::Merge => "merge",
            LoadAction::Replace => "replace",
            LoadAction::Set => "set",
            LoadAction::Override => "override",
            LoadAction::Update => "update",
            LoadAction::Patch => "patch",
        }
    }
}

impl FromStr for LoadAction {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(LoadAction::Merge),
            "replace" => Ok(LoadAction::Replace),
            "set" => Ok(LoadAction::Set),
            "override" | "overwrite" => Ok(LoadAction::Override),
            "update" => Ok(LoadAction::Update),
            "patch" => Ok(LoadAction::Patch),
            _ => Err(JunosClientError::new(format!(
                "The value of the load option ({}) is invalid. Must be one of: merge, replace, set, override, overwrite, update, patch",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Text,
    Set,
    Xml,
    Json,
}

impl ConfigFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigFormat::Text => "text",
            ConfigFormat::Set => "set",
            ConfigFormat::Xml => "xml",
            ConfigFormat::Json => "json",
        }
    }

    /// Format implied by a configuration file name.
    pub fn from_path(path: &Path) -> Option<ConfigFormat> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "conf" | "text" | "txt" => Some(ConfigFormat::Text),
            "set" => Some(ConfigFormat::Set),
            "xml" => Some(ConfigFormat::Xml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Guesses the format of inline configuration.
    pub fn sniff(config: &str) -> ConfigFormat {
        const SET_VERBS: [&str; 10] = [
            "set ", "delete ", "deactivate ", "activate ", "insert ", "rename ", "annotate ",
            "protect ", "unprotect ", "copy ",
        ];
        let config = config.trim_start();
        if config.starts_with('<') {
            return ConfigFormat::Xml;
        }
        if config.starts_with('{') {
            return ConfigFormat::Json;
        }
        let mut statements = config
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .peekable();
        if statements.peek().is_some()
            && statements.all(|line| SET_VERBS.iter().any(|verb| line.starts_with(verb)))
        {
            ConfigFormat::Set
        } else {
            ConfigFormat::Text
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ConfigFormat::Text),
            "set" => Ok(ConfigFormat::Set),
            "xml" => Ok(ConfigFormat::Xml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(JunosClientError::new(format!(
                "The configuration format {} is not in the list of recognized configuration formats: [\"xml\", \"set\", \"text\", \"json\"].",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadSource {
    Lines(Vec<String>),
    File(PathBuf),
    /// Fetched by the device itself.
    Url(String),
    Xml(XmlNode),
}

/// A rollback target: a checkpoint id or the rescue configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackId {
    Checkpoint(u8),
    Rescue,
}

impl FromStr for RollbackId {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "rescue" {
            return Ok(RollbackId::Rescue);
        }
        match s.parse::<u8>() {
            Ok(id) if id <= MAX_ROLLBACK_ID => Ok(RollbackId::Checkpoint(id)),
            _ => Err(JunosClientError::InvalidRollback(s.to_string())),
        }
    }
}

impl fmt::Display for RollbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackId::Checkpoint(id) => write!(f, "{}", id),
            RollbackId::Rescue => f.write_str("rescue"),
        }
    }
}

/// One entry of the device commit history, rollback id `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub sequence: u8,
    pub user: Option<String>,
    pub client: Option<String>,
    pub timestamp: Option<String>,
    pub comment: Option<String>,
}

impl Checkpoint {
    fn from_node(node: &XmlNode) -> Option<Checkpoint> {
        let text = |path: &str| {
            node.findtext(path)
                .filter(|text| !text.is_empty())
                .map(|text| text.to_string())
        };
        Some(Checkpoint {
            sequence: node.findtext("sequence-number")?.parse().ok()?,
            user: text("user"),
            client: text("client"),
            timestamp: text("date-time"),
            comment: text("comment").or_else(|| text("log")),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOptions {
    pub comment: Option<String>,
    /// Minutes before an unconfirmed commit is rolled back.
    pub confirmed: Option<u32>,
    /// RPC timeout for the commit, which may take longer than usual.
    pub timeout: Option<Duration>,
    pub full: bool,
    pub sync: bool,
    pub force_sync: bool,
    pub ignore_warning: IgnoreWarning,
}

impl CommitOptions {
    fn to_xml(&self) -> XmlNode {
        let mut commit = XmlNode::new("commit-configuration");
        if let Some(comment) = &self.comment {
            commit.push(XmlNode::with_text("log", comment.as_str()));
        }
        if let Some(minutes) = self.confirmed {
            commit.push(XmlNode::new("confirmed"));
            commit.push(XmlNode::with_text("confirm-timeout", minutes.to_string()));
        }
        if self.sync || self.force_sync {
            commit.push(XmlNode::new("synchronize"));
        }
        if self.force_sync {
            commit.push(XmlNode::new("force-synchronize"));
        }
        if self.full {
            commit.push(XmlNode::new("full"));
        }
        commit
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Database {
    #[default]
    Committed,
    Candidate,
}

impl Database {
    pub fn as_str(&self) -> &'static str {
        match self {
            Database::Committed => "committed",
            Database::Candidate => "candidate",
        }
    }
}

impl FromStr for Database {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "committed" => Ok(Database::Committed),
            "candidate" => Ok(Database::Candidate),
            _ => Err(JunosClientError::new(format!(
                "The configuration database {} is not in the list of recognized configuration databases: [\"candidate\", \"committed\"].",
                s
            ))),
        }
    }
}

/// Retrieved configuration: the text as returned and, for xml and json,
/// its JSON form.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedConfig {
    pub format: ConfigFormat,
    pub text: String,
    pub parsed: Option<Value>,
}

impl RetrievedConfig {
    pub fn lines(&self) -> Vec<String> {
        self.text.lines().map(|line| line.to_string()).collect()
    }
}

/// Retrieves `database` in `format`, `filter` is XML or a `/` separated
/// hierarchy. Extra `options` become attributes of `<get-configuration>`.
pub async fn retrieve(
    session: &mut DeviceSession,
    database: Database,
    format: ConfigFormat,
    filter: Option<&str>,
    options: &[(String, String)],
) -> JunosClientResult<RetrievedConfig> {
    let mut rpc = XmlNode::new("get-configuration")
        .attr("database", database.as_str())
        .attr("format", format.as_str());
    for (key, value) in options {
        rpc.set_attribute(key.as_str(), value.as_str());
    }
    if let Some(filter) = filter {
        rpc.push(filter_to_xml(filter)?);
    }
    debug!(target: session.host(), "Retrieving device configuration: {}", rpc.to_xml());
    let reply = session
        .rpc(rpc, &IgnoreWarning::Never)
        .await
        .map_err(|err| {
            JunosClientError::new(format!("Unable to retrieve the configuration: {}", err))
        })?;

    let expected = match format {
        ConfigFormat::Text => Some("configuration-text"),
        ConfigFormat::Set => Some("configuration-set"),
        ConfigFormat::Xml => Some("configuration"),
        ConfigFormat::Json => None,
    };
    if let Some(expected) = expected {
        let found = reply.content().map(|node| node.name.as_str());
        if found != Some(expected) {
            return Err(JunosClientError::new(format!(
                "Unexpected XML tag returned. Configuration is: {}",
                reply.raw()
            )));
        }
    }
    let output_format = match format {
        ConfigFormat::Xml => OutputFormat::Xml,
        ConfigFormat::Json => OutputFormat::Json,
        ConfigFormat::Text | ConfigFormat::Set => OutputFormat::Text,
    };
    let response = RpcResponse::from_reply(&reply, output_format)?;
    Ok(RetrievedConfig {
        format,
        text: response.text,
        parsed: response.parsed,
    })
}

/// Reads the commit history, most recent first.
pub async fn checkpoints(session: &mut DeviceSession) -> JunosClientResult<Vec<Checkpoint>> {
    let reply = session
        .rpc(XmlNode::new("get-commit-information"), &IgnoreWarning::Never)
        .await?;
    Ok(reply
        .body()
        .find_all("//commit-history")
        .into_iter()
        .filter_map(Checkpoint::from_node)
        .collect())
}

pub struct Transaction<'a> {
    session: &'a mut DeviceSession,
    mode: ConfigMode,
    token: Uuid,
    ignore_warning: IgnoreWarning,
    changes: Vec<String>,
    open: bool,
}

impl<'a> Transaction<'a> {
    /// Opens the candidate configuration. `ignore_warning` applies to the
    /// open and load requests, the uncommitted changes warning on open is
    /// always ignored.
    pub async fn open(
        session: &'a mut DeviceSession,
        mode: ConfigMode,
        ignore_warning: Option<IgnoreWarning>,
    ) -> JunosClientResult<Transaction<'a>> {
        let host = session.host().to_string();
        if session.configuration_lock().is_some() {
            return Err(JunosClientError::LockHeld(host));
        }
        let ignore_warning = ignore_warning.unwrap_or_default();
        let open_ignore = ignore_warning
            .clone()
            .with_pattern(UNCOMMITTED_CHANGES_WARNING);

        match session.rpc(mode.open_rpc(), &open_ignore).await {
            Ok(_) => {}
            Err(JunosClientError::Rpc(reply)) if is_lock_denied(&reply) => {
                return Err(JunosClientError::LockHeld(host));
            }
            Err(err) => {
                return Err(JunosClientError::new(format!(
                    "Unable to open the configuration in {} mode: {}",
                    mode, err
                )))
            }
        }

        let token = Uuid::new_v4();
        session.set_configuration_lock(Some(token));
        debug!(target: &host, "Configuration opened in {} mode.", mode);
        Ok(Transaction {
            session,
            mode,
            token,
            ignore_warning,
            changes: Vec::new(),
            open: true,
        })
    }

    pub fn mode(&self) -> &ConfigMode {
        &self.mode
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Descriptions of the fragments loaded so far, in load order.
    pub fn changes(&self) -> &[String] {
        &self.changes
    }

    pub fn session(&mut self) -> &mut DeviceSession {
        &mut *self.session
    }

    fn ensure_open(&self) -> JunosClientResult<()> {
        if !self.open || self.session.configuration_lock() != Some(self.token) {
            return Err(JunosClientError::ConfigurationNotOpen);
        }
        Ok(())
    }

    /// Loads a configuration fragment into the candidate. Without an
    /// explicit `format` it is taken from the file extension or guessed
    /// from the content; the `set` action always loads set commands.
    pub async fn load(
        &mut self,
        action: LoadAction,
        format: Option<ConfigFormat>,
        source: LoadSource,
        ignore_warning: Option<IgnoreWarning>,
    ) -> JunosClientResult<()> {
        self.ensure_open()?;
        let ignore = ignore_warning.unwrap_or_else(|| self.ignore_warning.clone());
        let (rpc, description) = load_rpc(action, format, source)
            .await
            .map_err(|err| {
                JunosClientError::new(format!("Failure loading the configuration: {}", err))
            })?;
        debug!(target: self.session.host(), "Loading configuration: {}", description);
        self.session.rpc(rpc, &ignore).await.map_err(|err| {
            JunosClientError::new(format!("Failure loading the configuration: {}", err))
        })?;
        self.changes.push(description);
        Ok(())
    }

    /// Differences between the candidate and rollback 0, `None` when there
    /// are none.
    pub async fn diff(&mut self) -> JunosClientResult<Option<String>> {
        self.ensure_open()?;
        let rpc = XmlNode::new("get-configuration")
            .attr("compare", "rollback")
            .attr("rollback", "0")
            .attr("format", "text");
        let reply = self
            .session
            .rpc(rpc, &self.ignore_warning)
            .await
            .map_err(|err| {
                JunosClientError::new(format!("Failure diffing the configuration: {}", err))
            })?;
        let diff = reply
            .body()
            .findtext("//configuration-output")
            .unwrap_or_default();
        if diff.is_empty() {
            return Ok(None);
        }
        Ok(Some(diff.to_string()))
    }

    /// `commit check`: validates the candidate without activating it.
    pub async fn check(&mut self) -> JunosClientResult<()> {
        self.ensure_open()?;
        let rpc = XmlNode::new("commit-configuration").child(XmlNode::new("check"));
        self.session
            .rpc(rpc, &self.ignore_warning)
            .await
            .map_err(|err| {
                JunosClientError::new(format!("Failure checking the configuration: {}", err))
            })?;
        debug!(target: self.session.host(), "Configuration checked.");
        Ok(())
    }

    pub async fn commit(&mut self, options: &CommitOptions) -> JunosClientResult<()> {
        self.ensure_open()?;
        let rpc = options.to_xml();
        let default_timeout = self.session.config().rpc_timeout;
        if let Some(timeout) = options.timeout {
            self.session.connection()?.set_rpc_timeout(timeout);
        }
        let result = self.session.rpc(rpc, &options.ignore_warning).await;
        if options.timeout.is_some() {
            if let Ok(connection) = self.session.connection() {
                connection.set_rpc_timeout(default_timeout);
            }
        }
        result.map_err(|err| {
            JunosClientError::new(format!("Failure committing the configuration: {}", err))
        })?;
        info!(
            target: self.session.host(),
            "Configuration committed{}",
            options
                .confirmed
                .map(|m| format!(", confirm within {} minutes", m))
                .unwrap_or_default()
        );
        Ok(())
    }

    /// Confirms a previous confirmed commit with a plain commit.
    pub async fn confirm(&mut self, comment: Option<&str>) -> JunosClientResult<()> {
        let options = CommitOptions {
            comment: comment.map(|c| c.to_string()),
            ignore_warning: self.ignore_warning.clone(),
            ..Default::default()
        };
        self.commit(&options).await
    }

    /// Loads a previous configuration into the candidate. Checkpoint ids
    /// are checked against the commit history first.
    pub async fn rollback(&mut self, id: RollbackId) -> JunosClientResult<()> {
        self.ensure_open()?;
        let rpc = match id {
            RollbackId::Rescue => XmlNode::new("load-configuration").attr("rescue", "rescue"),
            RollbackId::Checkpoint(checkpoint) => {
                let available = checkpoints(self.session).await?.len();
                if usize::from(checkpoint) >= available {
                    return Err(JunosClientError::MissingCheckpoint {
                        id: checkpoint,
                        available,
                    });
                }
                XmlNode::new("load-configuration")
                    .attr("compare", "rollback")
                    .attr("rollback", checkpoint.to_string())
            }
        };
        self.session
            .rpc(rpc, &self.ignore_warning)
            .await
            .map_err(|err| match id {
                RollbackId::Rescue => JunosClientError::new(format!(
                    "Unable to load the rescue configuration: {}",
                    err
                )),
                RollbackId::Checkpoint(checkpoint) => JunosClientError::new(format!(
                    "Unable to load the rollback {} configuration: {}",
                    checkpoint, err
                )),
            })?;
        self.changes.push(format!("rollback {}", id));
        Ok(())
    }

    /// Throws away uncommitted changes by reloading rollback 0.
    pub async fn discard(&mut self) -> JunosClientResult<()> {
        self.ensure_open()?;
        let rpc = XmlNode::new("load-configuration")
            .attr("compare", "rollback")
            .attr("rollback", "0");
        self.session.rpc(rpc, &self.ignore_warning).await?;
        self.changes.clear();
        Ok(())
    }

    /// Candidate or committed configuration seen from this transaction.
    pub async fn retrieve(
        &mut self,
        database: Database,
        format: ConfigFormat,
        filter: Option<&str>,
    ) -> JunosClientResult<RetrievedConfig> {
        self.ensure_open()?;
        retrieve(self.session, database, format, filter, &[]).await
    }

    /// Unlocks or closes the configuration database.
    pub async fn close(&mut self) -> JunosClientResult<()> {
        self.ensure_open()?;
        self.session
            .rpc(self.mode.close_rpc(), &IgnoreWarning::Never)
            .await
            .map_err(|err| {
                JunosClientError::new(format!("Unable to close the configuration: {}", err))
            })?;
        // Only a confirmed close releases the database.
        self.open = false;
        self.session.set_configuration_lock(None);
        debug!(target: self.session.host(), "Configuration closed.");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!(
                target: self.session.host(),
                "Configuration transaction {} dropped without close, the {} database stays open",
                self.token,
                self.mode
            );
        }
    }
}

fn is_lock_denied(reply: &RpcReply) -> bool {
    reply.errors().iter().any(|err| {
        matches!(err.tag, Some(ErrorTag::LockDenied) | Some(ErrorTag::InUse))
            || err
                .message
                .as_deref()
                .map(|message| {
                    let message = message.to_lowercase();
                    message.contains("configuration database locked")
                        || message.contains("database is locked")
                        || message.contains("modified by another user")
                })
                .unwrap_or(false)
    })
}

async fn load_rpc(
    action: LoadAction,
    format: Option<ConfigFormat>,
    source: LoadSource,
) -> JunosClientResult<(XmlNode, String)> {
    let rpc = XmlNode::new("load-configuration").attr("action", action.as_str());
    let (format, content, description) = match source {
        LoadSource::Url(url) => {
            let format = format.unwrap_or(ConfigFormat::Text);
            let rpc = rpc
                .attr("format", wire_format(action, format))
                .attr("url", url.as_str());
            return Ok((rpc, format!("{} {}", action.as_str(), url)));
        }
        LoadSource::Xml(node) => {
            let description = format!("{} <{}>", action.as_str(), node.name);
            (ConfigFormat::Xml, Content::Xml(node), description)
        }
        LoadSource::Lines(lines) => {
            let config = lines
                .iter()
                .map(|line| line.trim_end_matches('\n'))
                .collect::<Vec<_>>()
                .join("\n");
            let format = format.unwrap_or_else(|| ConfigFormat::sniff(&config));
            let description = format!("{} {} lines", action.as_str(), lines.len());
            (format, Content::Text(config), description)
        }
        LoadSource::File(path) => {
            let config = tokio::fs::read_to_string(&path).await.map_err(|err| {
                JunosClientError::new(format!("Unable to read {}: {}", path.display(), err))
            })?;
            let format = format
                .or_else(|| ConfigFormat::from_path(&path))
                .unwrap_or_else(|| ConfigFormat::sniff(&config));
            let description = format!("{} {}", action.as_str(), path.display());
            (format, Content::Text(config), description)
        }
    };
    let format = if action == LoadAction::Set {
        ConfigFormat::Set
    } else {
        format
    };

    let mut rpc = rpc.attr("format", wire_format(action, format));
    match (format, content) {
        (_, Content::Xml(node)) => rpc.push(wrap_configuration(node)),
        (ConfigFormat::Xml, Content::Text(text)) => {
            rpc.push(wrap_configuration(XmlNode::parse(text.trim())?))
        }
        (ConfigFormat::Set, Content::Text(text)) => {
            rpc.push(XmlNode::with_text("configuration-set", text))
        }
        (ConfigFormat::Json, Content::Text(text)) => {
            rpc.push(XmlNode::with_text("configuration-json", text))
        }
        (ConfigFormat::Text, Content::Text(text)) => {
            rpc.push(XmlNode::with_text("configuration-text", text))
        }
    }
    Ok((rpc, description))
}

enum Content {
    Text(String),
    Xml(XmlNode),
}

/// Junos loads set commands with `format="text"`.
fn wire_format(action: LoadAction, format: ConfigFormat) -> &'static str {
    match (action, format) {
        (LoadAction::Set, _) | (_, ConfigFormat::Set) | (_, ConfigFormat::Text) => "text",
        (_, ConfigFormat::Xml) => "xml",
        (_, ConfigFormat::Json) => "json",
    }
}

fn wrap_configuration(node: XmlNode) -> XmlNode {
    if node.name == "configuration" {
        node
    } else {
        XmlNode::new("configuration").child(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::testing::{connection, reply, requests, SentLog, OK};
    use pretty_assertions::assert_eq;

    pub(crate) const HISTORY: &str = r#"<commit-information>
  <commit-history>
    <sequence-number>0</sequence-number>
    <user>lab</user>
    <client>netconf</client>
    <date-time seconds="1718000000">2024-06-10 06:13:20 UTC</date-time>
    <log>host-name change</log>
  </commit-history>
  <commit-history>
    <sequence-number>1</sequence-number>
    <user>root</user>
    <client>cli</client>
    <date-time seconds="1717000000">2024-05-29 16:26:40 UTC</date-time>
  </commit-history>
</commit-information>"#;

    pub(crate) const DIFF: &str = "<configuration-information><configuration-output>\n[edit system]\n-  host-name old;\n+  host-name lab-mx;\n</configuration-output></configuration-information>";

    async fn session(replies: Vec<String>) -> (DeviceSession, SentLog) {
        let (conn, sent) = connection(replies).await;
        (
            DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn),
            sent,
        )
    }

    fn inner(request: &str) -> String {
        let start = request.find("\">").unwrap() + 2;
        request[start..request.len() - "</rpc>".len()].to_string()
    }

    #[test]
    fn test_rollback_id_validation() {
        assert_eq!("rescue".parse::<RollbackId>().unwrap(), RollbackId::Rescue);
        assert_eq!("49".parse::<RollbackId>().unwrap(), RollbackId::Checkpoint(49));
        assert_eq!(
            "50".parse::<RollbackId>().unwrap_err().to_string(),
            "The value of the rollback option (50) is invalid. Must be the string 'rescue' or an int between 0 and 49."
        );
        assert!("-1".parse::<RollbackId>().is_err());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            ConfigMode::parse("ephemeral", Some("eph1")).unwrap(),
            ConfigMode::Ephemeral(Some("eph1".to_string()))
        );
        assert_eq!(
            ConfigMode::parse("private", Some("eph1"))
                .unwrap_err()
                .to_string(),
            "Ephemeral instance is specified while the mode is not ephemeral. Specify the mode as ephemeral or do not specify the instance."
        );
        assert!(ConfigMode::parse("shared", None).is_err());
        assert_eq!(
            ConfigMode::Ephemeral(Some("eph1".to_string())).open_rpc().to_xml(),
            "<open-configuration><ephemeral-instance>eph1</ephemeral-instance></open-configuration>"
        );
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("junos.conf")),
            Some(ConfigFormat::Text)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("changes.set")),
            Some(ConfigFormat::Set)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("changes")), None);
        assert_eq!(
            ConfigFormat::sniff("set system host-name r1\ndelete system ntp"),
            ConfigFormat::Set
        );
        assert_eq!(
            ConfigFormat::sniff("system { host-name r1; }"),
            ConfigFormat::Text
        );
        assert_eq!(
            ConfigFormat::sniff("  <configuration/>"),
            ConfigFormat::Xml
        );
        assert_eq!(ConfigFormat::sniff("{\"configuration\": {}}"), ConfigFormat::Json);
    }

    #[tokio::test]
    async fn test_load_rpcs() {
        let (rpc, _) = load_rpc(
            LoadAction::Set,
            None,
            LoadSource::Lines(vec!["set system host-name r1\n".to_string()]),
        )
        .await
        .unwrap();
        assert_eq!(
            rpc.to_xml(),
            r#"<load-configuration action="set" format="text"><configuration-set>set system host-name r1</configuration-set></load-configuration>"#
        );

        let (rpc, _) = load_rpc(
            LoadAction::Override,
            None,
            LoadSource::Url("ftp://10.0.0.1/junos.conf".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(
            rpc.to_xml(),
            r#"<load-configuration action="override" format="text" url="ftp://10.0.0.1/junos.conf"/>"#
        );

        let (rpc, _) = load_rpc(
            LoadAction::Merge,
            None,
            LoadSource::Xml(XmlNode::new("system").child(XmlNode::with_text("host-name", "r1"))),
        )
        .await
        .unwrap();
        assert_eq!(
            rpc.to_xml(),
            r#"<load-configuration action="merge" format="xml"><configuration><system><host-name>r1</host-name></system></configuration></load-configuration>"#
        );

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("system.json");
        std::fs::write(&file, "{\"configuration\": {}}").unwrap();
        let (rpc, description) = load_rpc(LoadAction::Replace, None, LoadSource::File(file))
            .await
            .unwrap();
        assert_eq!(rpc.attribute("format"), Some("json"));
        assert_eq!(rpc.children[0].name, "configuration-json");
        assert!(description.starts_with("replace "));

        assert!(load_rpc(
            LoadAction::Merge,
            None,
            LoadSource::File(dir.path().join("missing.conf"))
        )
        .await
        .is_err());
    }

    #[test]
    fn test_commit_rpc() {
        let options = CommitOptions {
            comment: Some("lab change".to_string()),
            confirmed: Some(5),
            force_sync: true,
            full: true,
            ..Default::default()
        };
        assert_eq!(
            options.to_xml().to_xml(),
            "<commit-configuration><log>lab change</log><confirmed/><confirm-timeout>5</confirm-timeout><synchronize/><force-synchronize/><full/></commit-configuration>"
        );
    }

    #[tokio::test]
    async fn test_transaction_flow() {
        let (mut session, sent) = session(vec![
            reply("<rpc-error><error-severity>warning</error-severity><error-message>uncommitted changes will be discarded on exit</error-message></rpc-error>"),
            reply(&format!("<load-configuration-results>{}</load-configuration-results>", OK)),
            reply(DIFF),
            reply("<commit-results><routing-engine><name>re0</name><commit-check-success/></routing-engine></commit-results>"),
            reply(&format!("<commit-results>{}</commit-results>", OK)),
            reply(OK),
        ])
        .await;

        let mut tx = Transaction::open(&mut session, ConfigMode::Private, None)
            .await
            .unwrap();
        tx.load(
            LoadAction::Merge,
            Some(ConfigFormat::Text),
            LoadSource::Lines(vec!["system { host-name lab-mx; }".to_string()]),
            None,
        )
        .await
        .unwrap();
        let diff = tx.diff().await.unwrap().unwrap();
        assert!(diff.contains("+  host-name lab-mx;"));
        tx.check().await.unwrap();
        tx.commit(&CommitOptions {
            comment: Some("lab".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(tx.changes().len(), 1);
        tx.close().await.unwrap();
        assert!(matches!(
            tx.diff().await,
            Err(JunosClientError::ConfigurationNotOpen)
        ));
        drop(tx);
        assert!(session.configuration_lock().is_none());

        let sent = requests(&sent);
        assert_eq!(
            inner(&sent[0]),
            "<open-configuration><private/></open-configuration>"
        );
        assert_eq!(
            inner(&sent[2]),
            r#"<get-configuration compare="rollback" rollback="0" format="text"/>"#
        );
        assert_eq!(
            inner(&sent[3]),
            "<commit-configuration><check/></commit-configuration>"
        );
        assert_eq!(inner(&sent[5]), "<close-configuration/>");
    }

    #[tokio::test]
    async fn test_single_open_per_session() {
        let (mut session, _) = session(vec![reply(OK)]).await;
        let tx = Transaction::open(&mut session, ConfigMode::Exclusive, None)
            .await
            .unwrap();
        assert_eq!(tx.mode(), &ConfigMode::Exclusive);
        // Leaked without close: the session still holds the configuration.
        drop(tx);
        let err = Transaction::open(&mut session, ConfigMode::Exclusive, None)
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "The configuration database is already open by another transaction on r1"
        );
    }

    #[tokio::test]
    async fn test_failed_close_keeps_lock() {
        let (mut session, sent) = session(vec![
            reply(OK),
            reply("<rpc-error><error-severity>error</error-severity><error-message>unlock failed</error-message></rpc-error>"),
            reply(OK),
        ])
        .await;
        let mut tx = Transaction::open(&mut session, ConfigMode::Exclusive, None)
            .await
            .unwrap();
        let token = tx.token;
        let err = tx.close().await.unwrap_err();
        assert!(err.to_string().starts_with("Unable to close the configuration: "));
        assert!(tx.open);
        assert_eq!(tx.session.configuration_lock(), Some(token));

        tx.close().await.unwrap();
        assert!(!tx.open);
        drop(tx);
        assert!(session.configuration_lock().is_none());
        assert_eq!(requests(&sent).len(), 3);
    }

    #[tokio::test]
    async fn test_device_lock_denied() {
        let (mut session, _) = session(vec![reply(
            "<rpc-error><error-type>protocol</error-type><error-tag>lock-denied</error-tag><error-severity>error</error-severity><error-message>configuration database locked by:\n  root terminal p0 (pid 4433)</error-message></rpc-error>",
        )])
        .await;
        assert!(matches!(
            Transaction::open(&mut session, ConfigMode::Exclusive, None).await,
            Err(JunosClientError::LockHeld(host)) if host == "r1"
        ));
    }

    #[tokio::test]
    async fn test_empty_diff_is_none() {
        let (mut session, _) = session(vec![
            reply(OK),
            reply("<configuration-information><configuration-output>\n</configuration-output></configuration-information>"),
        ])
        .await;
        let mut tx = Transaction::open(&mut session, ConfigMode::Exclusive, None)
            .await
            .unwrap();
        assert_eq!(tx.diff().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rollback_checks_history() {
        let (mut session, sent) = session(vec![
            reply(OK),
            reply(HISTORY),
            reply(HISTORY),
            reply(&format!("<load-configuration-results>{}</load-configuration-results>", OK)),
        ])
        .await;
        let mut tx = Transaction::open(&mut session, ConfigMode::Exclusive, None)
            .await
            .unwrap();
        assert_eq!(
            tx.rollback(RollbackId::Checkpoint(5))
                .await
                .unwrap_err()
                .to_string(),
            "Rollback 5 does not exist. Device has 2 checkpoints."
        );
        tx.rollback(RollbackId::Checkpoint(1)).await.unwrap();
        assert_eq!(tx.changes(), &["rollback 1".to_string()]);
        assert_eq!(
            inner(&requests(&sent)[3]),
            r#"<load-configuration compare="rollback" rollback="1"/>"#
        );
    }

    #[tokio::test]
    async fn test_checkpoints_and_retrieve() {
        let (mut session, _) = session(vec![
            reply(HISTORY),
            reply("<configuration-text>\nsystem {\n    host-name lab-mx;\n}\n</configuration-text>"),
            reply("<rpc-error><error-severity>error</error-severity><error-message>syntax error</error-message></rpc-error>"),
        ])
        .await;
        let history = checkpoints(&mut session).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user.as_deref(), Some("lab"));
        assert_eq!(history[0].comment.as_deref(), Some("host-name change"));
        assert_eq!(history[1].sequence, 1);

        let config = retrieve(
            &mut session,
            Database::Committed,
            ConfigFormat::Text,
            Some("system"),
            &[],
        )
        .await
        .unwrap();
        assert_eq!(config.lines(), vec!["system {", "    host-name lab-mx;", "}"]);

        assert_eq!(
            retrieve(&mut session, Database::Candidate, ConfigFormat::Xml, None, &[])
                .await
                .unwrap_err()
                .to_string(),
            "Unable to retrieve the configuration: error: syntax error"
        );
    }
}

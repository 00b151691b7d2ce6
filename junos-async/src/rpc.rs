//! RPC dispatch and the batch `rpc` task.
use crate::error::{JunosClientError, JunosClientResult};
use crate::message::{IgnoreWarning, RpcReply};
use crate::output::{ExecutionResult, OutputSink, TaskOutcome};
use crate::session::DeviceSession;
use crate::xml::XmlNode;
use core::fmt;
use core::str::FromStr;
use log::{debug, info};
use serde_derive::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const OUTPUT_FORMATS: [&str; 3] = ["text", "xml", "json"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    #[default]
    Xml,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Xml => "xml",
            OutputFormat::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "xml" => Ok(OutputFormat::Xml),
            "json" => Ok(OutputFormat::Json),
            _ => Err(JunosClientError::new(format!(
                "The value {} in formats is invalid. Must be one of: {}",
                s,
                OUTPUT_FORMATS.join(", ")
            ))),
        }
    }
}

/// Keyword argument value: `true` adds an empty element, `false` is left
/// out, text becomes the element content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Flag(bool),
    Text(String),
}

impl ArgValue {
    /// `key=value` style values: booleans are recognised, everything else
    /// is text.
    pub fn parse(value: &str) -> ArgValue {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "on" => ArgValue::Flag(true),
            "false" | "no" | "off" => ArgValue::Flag(false),
            _ => ArgValue::Text(value.to_string()),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ArgValue::Flag(flag) => Value::Bool(*flag),
            ArgValue::Text(text) => Value::String(text.clone()),
        }
    }
}

pub type Kwargs = BTreeMap<String, ArgValue>;
pub type Attrs = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    pub name: String,
    pub kwargs: Option<Kwargs>,
    pub attrs: Option<Attrs>,
    pub format: OutputFormat,
    pub filter: Option<String>,
}

impl RpcRequest {
    /// Underscores in the RPC name are replaced by dashes.
    pub fn new(name: &str) -> RpcRequest {
        RpcRequest {
            name: name.replace('_', "-"),
            kwargs: None,
            attrs: None,
            format: OutputFormat::Xml,
            filter: None,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> RpcRequest {
        self.format = format;
        self
    }

    pub fn with_kwarg(mut self, key: &str, value: ArgValue) -> RpcRequest {
        self.kwargs
            .get_or_insert_with(Kwargs::new)
            .insert(key.to_string(), value);
        self
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> RpcRequest {
        self.attrs
            .get_or_insert_with(Attrs::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_filter(mut self, filter: &str) -> RpcRequest {
        self.filter = Some(filter.to_string());
        self
    }

    pub fn is_get_config(&self) -> bool {
        self.name == "get-config"
    }

    /// Builds the request element. `get-config` maps onto Junos
    /// `<get-configuration>` with the filter as its content.
    pub fn to_xml(&self) -> JunosClientResult<XmlNode> {
        let name = if self.is_get_config() {
            "get-configuration"
        } else {
            self.name.as_str()
        };
        let mut rpc = XmlNode::new(name).attr("format", self.format.as_str());
        for (key, value) in self.kwargs.iter().flatten() {
            let key = key.replace('_', "-");
            match value {
                ArgValue::Flag(true) => rpc.push(XmlNode::new(key)),
                ArgValue::Flag(false) => {}
                ArgValue::Text(text) => rpc.push(XmlNode::with_text(key, text.as_str())),
            }
        }
        for (key, value) in self.attrs.iter().flatten() {
            rpc.set_attribute(key.replace('_', "-"), value.as_str());
        }
        if let (true, Some(filter)) = (self.is_get_config(), &self.filter) {
            rpc.push(filter_to_xml(filter)?);
        }
        Ok(rpc)
    }

    fn kwargs_json(&self) -> Option<BTreeMap<String, Value>> {
        self.kwargs.as_ref().map(|kwargs| {
            kwargs
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect()
        })
    }
}

/// Configuration filter given either as XML or as a path such as
/// `system/services`, which selects that hierarchy.
pub fn filter_to_xml(filter: &str) -> JunosClientResult<XmlNode> {
    let filter = filter.trim();
    if filter.starts_with('<') {
        let node = XmlNode::parse(filter)?;
        if node.name == "configuration" {
            return Ok(node);
        }
        return Ok(XmlNode::new("configuration").child(node));
    }
    let mut node: Option<XmlNode> = None;
    for name in filter
        .trim_matches('/')
        .split('/')
        .filter(|name| !name.is_empty())
        .rev()
    {
        let mut parent = XmlNode::new(name);
        if let Some(child) = node.take() {
            parent.push(child);
        }
        node = Some(parent);
    }
    let mut configuration = XmlNode::new("configuration");
    if let Some(node) = node {
        configuration.push(node);
    }
    Ok(configuration)
}

#[derive(Debug, Clone)]
pub struct RpcResponse {
    pub message_id: Option<String>,
    pub raw: String,
    pub text: String,
    pub parsed: Option<Value>,
}

impl RpcResponse {
    /// Extracts the output of `reply` the way it was requested: text
    /// output, the payload element as XML plus its JSON conversion, or the
    /// JSON document Junos embeds as reply text.
    pub fn from_reply(reply: &RpcReply, format: OutputFormat) -> JunosClientResult<RpcResponse> {
        let (text, parsed) = match (format, reply.content()) {
            (OutputFormat::Json, _) if !reply.body().text.trim().is_empty() => {
                let text = reply.body().text.trim().to_string();
                let parsed: Value = serde_json::from_str(&text)?;
                (text, Some(parsed))
            }
            (_, None) => (String::new(), None),
            (OutputFormat::Text, Some(content)) => {
                (content.text_content().trim().to_string(), None)
            }
            (OutputFormat::Xml, Some(content)) | (OutputFormat::Json, Some(content)) => {
                (content.to_pretty_xml(), Some(content.to_json()))
            }
        };
        Ok(RpcResponse {
            message_id: reply.message_id().map(|id| id.to_string()),
            raw: reply.raw().to_string(),
            text,
            parsed,
        })
    }
}

/// Sends one request on `session`.
pub async fn execute(
    session: &mut DeviceSession,
    request: &RpcRequest,
    ignore: &IgnoreWarning,
) -> JunosClientResult<RpcResponse> {
    let body = request.to_xml()?;
    debug!(target: session.host(), "Executing RPC \"{}\".", body.to_xml());
    let reply = session.rpc(body, ignore).await?;
    RpcResponse::from_reply(&reply, request.format)
}

#[derive(Debug, Clone, Default)]
pub struct RpcOptions {
    pub rpcs: Vec<String>,
    pub formats: Vec<OutputFormat>,
    pub kwargs: Option<Vec<Kwargs>>,
    pub attrs: Option<Vec<Attrs>>,
    pub filter: Option<String>,
    pub dest: Option<PathBuf>,
    pub dest_dir: Option<PathBuf>,
    pub ignore_warning: IgnoreWarning,
    pub return_output: bool,
}

impl RpcOptions {
    pub fn new(rpcs: Vec<String>) -> RpcOptions {
        RpcOptions {
            rpcs,
            return_output: true,
            ..Default::default()
        }
    }

    /// Validates the option counts and pairs every RPC with its format,
    /// kwargs and attrs.
    pub fn requests(&self) -> JunosClientResult<Vec<RpcRequest>> {
        let count = self.rpcs.len();
        if count == 0 {
            return Err(JunosClientError::new(
                "The rpcs option must have a value.".to_string(),
            ));
        }
        let formats = match self.formats.len() {
            0 => vec![OutputFormat::Xml; count],
            1 => vec![self.formats[0]; count],
            n if n == count => self.formats.clone(),
            n => {
                return Err(JunosClientError::new(format!(
                    "The formats option must have a single value, or one value per rpc. There are {} rpcs and {} formats.",
                    count, n
                )))
            }
        };
        if let Some(kwargs) = &self.kwargs {
            if kwargs.len() != count {
                return Err(JunosClientError::new(format!(
                    "The kwargs option must have one value per rpc. There are {} rpcs and {} kwargs.",
                    count,
                    kwargs.len()
                )));
            }
        }
        if let Some(attrs) = &self.attrs {
            if attrs.len() != count {
                return Err(JunosClientError::new(format!(
                    "The attrs option must have one value per rpc. There are {} rpcs and {} attrs.",
                    count,
                    attrs.len()
                )));
            }
        }
        if self.filter.is_some()
            && (count != 1 || self.rpcs[0].replace('_', "-") != "get-config")
        {
            return Err(JunosClientError::new(
                "The filter option is only valid when the rpcs option value is a single 'get-config' RPC."
                    .to_string(),
            ));
        }

        Ok(self
            .rpcs
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut request = RpcRequest::new(name).with_format(formats[i]);
                request.kwargs = self.kwargs.as_ref().map(|kwargs| kwargs[i].clone());
                request.attrs = self.attrs.as_ref().map(|attrs| attrs[i].clone());
                request.filter = self.filter.clone();
                request
            })
            .collect())
    }
}

/// Runs every requested RPC in order. A failing RPC is reported in its
/// result and does not stop the batch; invalid options yield a single
/// failed result.
pub async fn run(session: &mut DeviceSession, options: &RpcOptions) -> TaskOutcome<ExecutionResult> {
    let prepared = options.requests().and_then(|requests| {
        let sink = OutputSink::new(
            session.host(),
            options.dest.clone(),
            options.dest_dir.clone(),
        )?;
        Ok((requests, sink))
    });
    let (requests, mut sink) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => return TaskOutcome::Single(ExecutionResult::failure(err.to_string())),
    };

    let mut results = Vec::with_capacity(requests.len());
    for request in &requests {
        let mut result = ExecutionResult {
            rpc: Some(request.name.clone()),
            format: request.format.to_string(),
            kwargs: request.kwargs_json(),
            attrs: request.attrs.clone(),
            changed: false,
            failed: true,
            ..Default::default()
        };

        let response = match execute(session, request, &options.ignore_warning).await {
            Ok(response) => response,
            Err(err) => {
                let rpc = request
                    .to_xml()
                    .map(|body| body.to_pretty_xml())
                    .unwrap_or_else(|_| request.name.clone());
                debug!(target: session.host(), "Unable to execute RPC \"{}\". Error: {}", rpc, err);
                result.msg = format!("Unable to execute the RPC: {}. Error: {}", rpc, err);
                results.push(result);
                continue;
            }
        };

        result.msg = if request.is_get_config() {
            "The \"get-config\" RPC executed successfully.".to_string()
        } else {
            "The RPC executed successfully.".to_string()
        };
        info!(target: session.host(), "RPC {} executed successfully", request.name);
        if options.return_output {
            result.set_output(&response.text, response.parsed.clone());
        }
        match sink.save(&request.name, request.format.as_str(), &response.text).await {
            Ok(_) => result.failed = false,
            Err(err) => {
                result.msg = format!("Unable to save the output of the RPC {}: {}", request.name, err);
            }
        }
        results.push(result);
    }
    TaskOutcome::from_results(results)
}

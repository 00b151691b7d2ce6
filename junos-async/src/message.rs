use crate::error::{JunosClientError, JunosClientResult};
use crate::xml::XmlNode;
use crate::NETCONF_URN;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use quick_xml::se::Serializer;
use regex::RegexBuilder;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename(serialize = "hello"))]
pub struct Hello {
    #[serde(rename = "@xmlns", default)]
    xmlns: String,
    capabilities: Capabilities,
    #[serde(rename = "session-id", skip_serializing_if = "Option::is_none")]
    session_id: Option<u64>,
}

impl Hello {
    pub fn new() -> Hello {
        Hello {
            xmlns: NETCONF_URN.to_string(),
            session_id: None,
            capabilities: Capabilities {
                capability: vec![
                    crate::NETCONF_BASE_10_CAP.to_string(),
                    crate::NETCONF_BASE_11_CAP.to_string(),
                ],
            },
        }
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.capabilities
            .capability
            .iter()
            .map(|capability| capability.trim().to_string())
            .collect()
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities
            .capability
            .iter()
            .any(|cap| cap.trim() == capability)
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }
}

impl Display for Hello {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use serde::Serialize;
        let mut buffer = String::with_capacity(206);
        let ser = Serializer::new(&mut buffer);
        self.serialize(ser).map_err(|_| fmt::Error)?;
        write!(f, "{}", buffer)
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Capabilities {
    #[serde(default)]
    capability: Vec<String>,
}

/// An `<rpc>` request carrying one operation element, stamped with a fresh
/// message-id.
#[derive(Debug, Clone)]
pub struct Rpc {
    message_id: String,
    body: XmlNode,
}

impl Rpc {
    pub fn new(body: XmlNode) -> Rpc {
        Rpc {
            message_id: Uuid::new_v4().to_string(),
            body,
        }
    }

    pub fn close_session() -> Rpc {
        Rpc::new(XmlNode::new("close-session"))
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn name(&self) -> &str {
        &self.body.name
    }
}

impl Display for Rpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<rpc message-id=\"{}\" xmlns=\"{}\">{}</rpc>",
            self.message_id,
            NETCONF_URN,
            self.body.to_xml()
        )
    }
}

/// A parsed `<rpc-reply>`.
///
/// `rpc-error` elements are collected from anywhere in the reply: Junos
/// nests them inside operation results such as `<load-configuration-results>`.
#[derive(Debug, Clone)]
pub struct RpcReply {
    message_id: Option<String>,
    errors: Vec<RpcError>,
    ok: bool,
    body: XmlNode,
    raw: String,
}

impl RpcReply {
    pub fn parse(reply: &str) -> JunosClientResult<RpcReply> {
        let body = XmlNode::parse(reply)?;
        if body.name != "rpc-reply" {
            return Err(JunosClientError::new(format!(
                "expected <rpc-reply>, received <{}>",
                body.name
            )));
        }
        let errors = body
            .find_all("//rpc-error")
            .into_iter()
            .map(RpcError::from_node)
            .collect();
        let ok = !body.find_all("//ok").is_empty();
        Ok(RpcReply {
            message_id: body.attribute("message-id").map(|id| id.to_string()),
            errors,
            ok,
            body,
            raw: reply.to_string(),
        })
    }

    pub fn is_ok(&self) -> bool {
        self.ok && self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|err| err.severity == ErrorSeverity::Error)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn errors(&self) -> &[RpcError] {
        &self.errors
    }

    pub fn warnings(&self) -> Vec<&RpcError> {
        self.errors
            .iter()
            .filter(|err| err.severity == ErrorSeverity::Warning)
            .collect()
    }

    /// Errors plus every warning not covered by `ignore`.
    pub fn failures(&self, ignore: &IgnoreWarning) -> Vec<&RpcError> {
        self.errors
            .iter()
            .filter(|err| match err.severity {
                ErrorSeverity::Error => true,
                ErrorSeverity::Warning => {
                    !ignore.ignores(err.message.as_deref().unwrap_or_default())
                }
            })
            .collect()
    }

    /// Returns a copy of the reply limited to `errors`, used as the error
    /// value when a reply is rejected.
    pub fn with_errors(&self, errors: Vec<RpcError>) -> RpcReply {
        RpcReply {
            message_id: self.message_id.clone(),
            errors,
            ok: false,
            body: self.body.clone(),
            raw: self.raw.clone(),
        }
    }

    /// The reply as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The whole `<rpc-reply>` element.
    pub fn body(&self) -> &XmlNode {
        &self.body
    }

    /// The first payload element, skipping `<ok/>` and `<rpc-error>`.
    pub fn content(&self) -> Option<&XmlNode> {
        self.body
            .children
            .iter()
            .find(|child| child.name != "ok" && child.name != "rpc-error")
    }
}

impl Display for RpcReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "rpc-reply {}", self.message_id().unwrap_or("-"));
        }
        let errors: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", errors.join("\n"))
    }
}

impl std::error::Error for RpcReply {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub severity: ErrorSeverity,
    pub error_type: Option<ErrorType>,
    pub tag: Option<ErrorTag>,
    pub app_tag: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
    pub bad_element: Option<String>,
}

impl RpcError {
    fn from_node(node: &XmlNode) -> RpcError {
        let text = |path: &str| {
            node.findtext(path)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
        };
        RpcError {
            severity: match text("error-severity").as_deref() {
                Some("warning") => ErrorSeverity::Warning,
                _ => ErrorSeverity::Error,
            },
            error_type: text("error-type").and_then(|value| value.parse().ok()),
            tag: text("error-tag").and_then(|value| value.parse().ok()),
            app_tag: text("error-app-tag"),
            path: text("error-path"),
            message: text("error-message"),
            bad_element: text("error-info/bad-element").or_else(|| text("bad-element")),
        }
    }
}

impl Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        };
        write!(
            f,
            "{}: {}",
            severity,
            self.message.as_deref().unwrap_or("unspecified error")
        )?;
        if let Some(bad_element) = &self.bad_element {
            write!(f, " (bad element: {})", bad_element)?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    App,
}

impl FromStr for ErrorType {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transport" => Ok(ErrorType::Transport),
            "rpc" => Ok(ErrorType::Rpc),
            "protocol" => Ok(ErrorType::Protocol),
            "application" | "app" => Ok(ErrorType::App),
            _ => Err(JunosClientError::new(format!("unknown error-type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
    Other(String),
}

impl FromStr for ErrorTag {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "in-use" => ErrorTag::InUse,
            "invalid-value" => ErrorTag::InvalidValue,
            "too-big" => ErrorTag::TooBig,
            "missing-attribute" => ErrorTag::MissingAttribute,
            "bad-attribute" => ErrorTag::BadAttribute,
            "unknown-attribute" => ErrorTag::UnknownAttribute,
            "missing-element" => ErrorTag::MissingElement,
            "bad-element" => ErrorTag::BadElement,
            "unknown-element" => ErrorTag::UnknownElement,
            "unknown-namespace" => ErrorTag::UnknownNamespace,
            "access-denied" => ErrorTag::AccessDenied,
            "lock-denied" => ErrorTag::LockDenied,
            "resource-denied" => ErrorTag::ResourceDenied,
            "rollback-failed" => ErrorTag::RollbackFailed,
            "data-exists" => ErrorTag::DataExists,
            "data-missing" => ErrorTag::DataMissing,
            "operation-not-supported" => ErrorTag::OperationNotSupported,
            "operation-failed" => ErrorTag::OperationFailed,
            "partial-operation" => ErrorTag::PartialOperation,
            "malformed-message" => ErrorTag::MalformedMessage,
            other => ErrorTag::Other(other.to_string()),
        })
    }
}

/// Which `rpc-error` warnings are tolerated.
///
/// Patterns are matched case-insensitively as regular expressions against
/// the warning message, falling back to a substring match when a pattern
/// is not a valid expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IgnoreWarning {
    #[default]
    Never,
    Always,
    Patterns(Vec<String>),
}

impl IgnoreWarning {
    /// Interprets option values: a single boolean-like value switches all
    /// warnings on or off, anything else is a list of patterns.
    pub fn from_values(values: &[String]) -> IgnoreWarning {
        if let [single] = values {
            match single.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => return IgnoreWarning::Always,
                "false" | "no" | "off" | "0" => return IgnoreWarning::Never,
                _ => {}
            }
        }
        if values.is_empty() {
            IgnoreWarning::Never
        } else {
            IgnoreWarning::Patterns(values.to_vec())
        }
    }

    /// Adds a pattern unless every warning is already ignored.
    pub fn with_pattern(self, pattern: &str) -> IgnoreWarning {
        match self {
            IgnoreWarning::Always => IgnoreWarning::Always,
            IgnoreWarning::Never => IgnoreWarning::Patterns(vec![pattern.to_string()]),
            IgnoreWarning::Patterns(mut patterns) => {
                patterns.push(pattern.to_string());
                IgnoreWarning::Patterns(patterns)
            }
        }
    }

    pub fn ignores(&self, message: &str) -> bool {
        match self {
            IgnoreWarning::Never => false,
            IgnoreWarning::Always => true,
            IgnoreWarning::Patterns(patterns) => patterns.iter().any(|pattern| {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(regex) => regex.is_match(message),
                    Err(_) => message.to_lowercase().contains(&pattern.to_lowercase()),
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quick_xml::de::from_str;

    #[test]
    fn test_parse_rpc_reply_errors() {
        let reply = r#"
<rpc-reply message-id="67d83d6b" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" xmlns:junos="http://xml.juniper.net/junos/21.4R0/junos">
  <load-configuration-results>
    <rpc-error>
      <error-type>protocol</error-type>
      <error-tag>operation-failed</error-tag>
      <error-severity>error</error-severity>
      <error-message>syntax error</error-message>
      <error-info>
        <bad-element>hots-name</bad-element>
      </error-info>
    </rpc-error>
    <rpc-error>
      <error-severity>warning</error-severity>
      <error-message>statement not found</error-message>
    </rpc-error>
    <ok/>
  </load-configuration-results>
</rpc-reply>
"#;
        let reply = RpcReply::parse(reply).unwrap();
        assert_eq!(reply.message_id(), Some("67d83d6b"));
        assert!(reply.has_errors());
        assert!(!reply.is_ok());
        assert_eq!(reply.errors().len(), 2);
        assert_eq!(reply.errors()[0].error_type, Some(ErrorType::Protocol));
        assert_eq!(reply.errors()[0].tag, Some(ErrorTag::OperationFailed));
        assert_eq!(reply.errors()[0].bad_element.as_deref(), Some("hots-name"));
        assert_eq!(reply.warnings().len(), 1);
        assert_eq!(
            reply.to_string(),
            "error: syntax error (bad element: hots-name)\nwarning: statement not found"
        );
        assert_eq!(
            reply.content().map(|c| c.name.as_str()),
            Some("load-configuration-results")
        );
    }

    #[test]
    fn test_parse_rpc_reply_ok_and_data() {
        let reply = RpcReply::parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rpc-reply message-id="938f1c28" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <ok/>
</rpc-reply>"#,
        )
        .unwrap();
        assert!(reply.is_ok());
        assert!(reply.content().is_none());

        let reply = RpcReply::parse(
            r#"<rpc-reply message-id="c60e637d"><data><configure><port><port-id>1/1/2</port-id></port></configure></data></rpc-reply>"#,
        )
        .unwrap();
        assert!(!reply.has_errors());
        assert!(!reply.is_ok());
        assert_eq!(
            reply.body().findtext("data/configure/port/port-id"),
            Some("1/1/2")
        );

        assert!(RpcReply::parse("<hello/>").is_err());
    }

    #[test]
    fn test_ignore_warning() {
        let reply = RpcReply::parse(
            r#"<rpc-reply message-id="1">
  <rpc-error>
    <error-severity>warning</error-severity>
    <error-message>uncommitted changes will be discarded on exit</error-message>
  </rpc-error>
  <rpc-error>
    <error-severity>warning</error-severity>
    <error-message>statement has no contents; ignored</error-message>
  </rpc-error>
</rpc-reply>"#,
        )
        .unwrap();
        assert!(!reply.has_errors());
        assert_eq!(reply.failures(&IgnoreWarning::Never).len(), 2);
        assert!(reply.failures(&IgnoreWarning::Always).is_empty());

        let ignore = IgnoreWarning::from_values(&["Statement has no contents".to_string()]);
        assert_eq!(reply.failures(&ignore).len(), 1);
        let ignore = ignore.with_pattern("uncommitted changes .* on exit");
        assert!(reply.failures(&ignore).is_empty());

        assert_eq!(
            IgnoreWarning::from_values(&["true".to_string()]),
            IgnoreWarning::Always
        );
        assert_eq!(
            IgnoreWarning::from_values(&["no".to_string()]),
            IgnoreWarning::Never
        );
        assert!(IgnoreWarning::Patterns(vec!["[unclosed".to_string()])
            .ignores("warning about [unclosed bracket"));
    }

    #[test]
    fn test_deserialize_hello() {
        let hello = r#"
<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <capabilities>
    <capability>urn:ietf:params:netconf:base:1.0</capability>
    <capability>urn:ietf:params:netconf:capability:candidate:1.0</capability>
    <capability>http://xml.juniper.net/netconf/junos/1.0</capability>
  </capabilities>
  <session-id>27700</session-id>
</hello>"#;
        let hello: Hello = from_str(hello).unwrap();
        assert_eq!(hello.session_id(), Some(27700));
        assert!(hello.has_capability("http://xml.juniper.net/netconf/junos/1.0"));
        assert!(!hello.has_capability(crate::NETCONF_BASE_11_CAP));
        assert_eq!(hello.capabilities().len(), 3);
    }

    #[test]
    fn test_serialize_hello() {
        let expected = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability><capability>urn:ietf:params:netconf:base:1.1</capability></capabilities></hello>"#;
        assert_eq!(Hello::new().to_string(), expected);
    }

    #[test]
    fn test_rpc_wraps_body() {
        let body = XmlNode::new("get-interface-information")
            .attr("format", "text")
            .child(XmlNode::with_text("interface-name", "ge-0/0/0"));
        let request = Rpc::new(body);
        assert_eq!(request.name(), "get-interface-information");
        assert_eq!(
            request.to_string(),
            format!(
                r#"<rpc message-id="{}" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><get-interface-information format="text"><interface-name>ge-0/0/0</interface-name></get-interface-information></rpc>"#,
                request.message_id()
            )
        );
        assert_ne!(Rpc::close_session().message_id(), request.message_id());
        assert!(Rpc::close_session().to_string().contains("<close-session/>"));
    }
}

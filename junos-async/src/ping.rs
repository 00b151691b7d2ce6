//! The `ping` task and the single ping helper shared with path MTU discovery.
use crate::error::JunosClientError;
use crate::message::{ErrorSeverity, IgnoreWarning};
use crate::output::TaskResult;
use crate::session::DeviceSession;
use crate::xml::XmlNode;
use log::debug;
use serde_derive::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingOptions {
    pub dest: String,
    pub count: u32,
    pub rapid: bool,
    pub ttl: Option<u8>,
    /// ICMP payload size in bytes.
    pub size: Option<u32>,
    pub do_not_fragment: bool,
    pub inet: bool,
    pub source: Option<String>,
    pub interface: Option<String>,
    pub routing_instance: Option<String>,
    pub acceptable_percent_loss: u8,
}

impl PingOptions {
    pub fn new(dest: &str) -> PingOptions {
        PingOptions {
            dest: dest.to_string(),
            count: 5,
            rapid: true,
            ttl: None,
            size: None,
            do_not_fragment: false,
            inet: false,
            source: None,
            interface: None,
            routing_instance: None,
            acceptable_percent_loss: 0,
        }
    }

    pub fn to_xml(&self) -> XmlNode {
        let mut ping = XmlNode::new("ping")
            .child(XmlNode::with_text("host", self.dest.as_str()))
            .child(XmlNode::with_text("count", self.count.to_string()));
        if self.rapid {
            ping.push(XmlNode::new("rapid"));
        }
        if self.inet {
            ping.push(XmlNode::new("inet"));
        }
        if self.do_not_fragment {
            ping.push(XmlNode::new("do-not-fragment"));
        }
        if let Some(ttl) = self.ttl {
            ping.push(XmlNode::with_text("ttl", ttl.to_string()));
        }
        if let Some(size) = self.size {
            ping.push(XmlNode::with_text("size", size.to_string()));
        }
        for (name, value) in [
            ("source", &self.source),
            ("interface", &self.interface),
            ("routing-instance", &self.routing_instance),
        ] {
            if let Some(value) = value {
                ping.push(XmlNode::with_text(name, value.as_str()));
            }
        }
        ping
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PingResult {
    pub msg: String,
    pub changed: bool,
    pub failed: bool,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_sent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_received: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_minimum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_maximum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_average: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_stddev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl PingResult {
    /// Rounded packet loss, 100 when unknown.
    pub fn loss(&self) -> u32 {
        self.packet_loss
            .as_deref()
            .and_then(|loss| loss.trim().parse::<f64>().ok())
            .map(|loss| loss.round() as u32)
            .unwrap_or(100)
    }
}

impl TaskResult for PingResult {
    fn failed(&self) -> bool {
        self.failed
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

/// Pings from the device. The result is failed when the ping could not run
/// or lost more packets than `acceptable_percent_loss`.
pub async fn ping(session: &mut DeviceSession, options: &PingOptions) -> PingResult {
    let mut result = PingResult {
        failed: true,
        host: options.dest.clone(),
        source: options.source.clone(),
        interface: options.interface.clone(),
        routing_instance: options.routing_instance.clone(),
        ..Default::default()
    };
    debug!(target: session.host(), "Executing ping with parameters: {}", options.to_xml().to_xml());
    let reply = match session.rpc(options.to_xml(), &IgnoreWarning::Always).await {
        Ok(reply) => reply,
        Err(JunosClientError::Rpc(reply)) if reply.has_errors() => {
            let errors: Vec<&str> = reply
                .errors()
                .iter()
                .filter(|err| err.severity == ErrorSeverity::Error)
                .filter_map(|err| err.message.as_deref())
                .collect();
            result.msg = format!("Ping returned errors: {}", errors.join(", "));
            return result;
        }
        Err(err) => {
            result.msg = format!("Unable to execute ping: {}", err);
            return result;
        }
    };

    let warnings: Vec<String> = reply
        .warnings()
        .iter()
        .filter_map(|warning| warning.message.clone())
        .collect();
    if !warnings.is_empty() {
        result.warnings = Some(warnings);
    }

    let response = reply
        .content()
        .map(|content| content.to_pretty_xml())
        .unwrap_or_else(|| reply.raw().to_string());
    let Some(summary) = reply.body().find("//probe-results-summary") else {
        result.msg = format!("Probe-results-summary not found in response: {}", response);
        return result;
    };
    let field = |name: &str| summary.findtext(name).map(|text| text.to_string());

    let required = [
        ("packet_loss", field("packet-loss")),
        ("packets_sent", field("probes-sent")),
        ("packets_received", field("responses-received")),
    ];
    if let Some((key, _)) = required.iter().find(|(_, value)| value.is_none()) {
        result.msg = format!("Expected field {} not found in response: {}", key, response);
        return result;
    }
    let [packet_loss, packets_sent, packets_received] = required.map(|(_, value)| value);
    result.packet_loss = packet_loss;
    result.packets_sent = packets_sent;
    result.packets_received = packets_received;

    // round trip times are only reported when something came back
    let loss = result.loss();
    let optional = [
        ("rtt_minimum", field("rtt-minimum")),
        ("rtt_maximum", field("rtt-maximum")),
        ("rtt_average", field("rtt-average")),
        ("rtt_stddev", field("rtt-stddev")),
    ];
    if loss < 100 {
        if let Some((key, _)) = optional.iter().find(|(_, value)| value.is_none()) {
            result.msg = format!("Expected field {} not found in response: {}", key, response);
            return result;
        }
    }
    let [rtt_minimum, rtt_maximum, rtt_average, rtt_stddev] = optional.map(|(_, value)| value);
    result.rtt_minimum = rtt_minimum;
    result.rtt_maximum = rtt_maximum;
    result.rtt_average = rtt_average;
    result.rtt_stddev = rtt_stddev;

    result.msg = format!(
        "Loss {}%, (Sent {} | Received {})",
        result.packet_loss.as_deref().unwrap_or_default(),
        result.packets_sent.as_deref().unwrap_or_default(),
        result.packets_received.as_deref().unwrap_or_default()
    );
    result.failed = loss > u32::from(options.acceptable_percent_loss);
    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::testing::{connection, reply, requests};
    use pretty_assertions::assert_eq;

    pub(crate) fn ping_reply(loss: u32) -> String {
        let rtt = if loss < 100 {
            "<rtt-minimum>1021</rtt-minimum><rtt-maximum>1573</rtt-maximum><rtt-average>1204</rtt-average><rtt-stddev>203</rtt-stddev>"
        } else {
            ""
        };
        reply(&format!(
            "<ping-results><target-host>192.0.2.9</target-host><probe-results-summary><probes-sent>3</probes-sent><responses-received>{}</responses-received><packet-loss>{}</packet-loss>{}</probe-results-summary></ping-results>",
            3 - 3 * loss / 100,
            loss,
            rtt
        ))
    }

    #[tokio::test]
    async fn test_ping_success() {
        let (conn, sent) = connection(vec![ping_reply(0)]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let mut options = PingOptions::new("192.0.2.9");
        options.routing_instance = Some("mgmt".to_string());
        let result = ping(&mut session, &options).await;
        assert!(!result.failed);
        assert_eq!(result.msg, "Loss 0%, (Sent 3 | Received 3)");
        assert_eq!(result.rtt_average.as_deref(), Some("1204"));
        assert!(requests(&sent)[0].contains(
            "<ping><host>192.0.2.9</host><count>5</count><rapid/><routing-instance>mgmt</routing-instance></ping>"
        ));
    }

    #[tokio::test]
    async fn test_ping_total_loss() {
        let (conn, _) = connection(vec![ping_reply(100)]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let result = ping(&mut session, &PingOptions::new("192.0.2.9")).await;
        assert!(result.failed);
        assert_eq!(result.msg, "Loss 100%, (Sent 3 | Received 0)");
        assert_eq!(result.rtt_minimum, None);

        let (conn, _) = connection(vec![ping_reply(100)]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let mut options = PingOptions::new("192.0.2.9");
        options.acceptable_percent_loss = 100;
        assert!(!ping(&mut session, &options).await.failed);
    }

    #[tokio::test]
    async fn test_ping_errors_and_warnings() {
        let (conn, _) = connection(vec![
            reply("<rpc-error><error-severity>error</error-severity><error-message>no route to host</error-message></rpc-error>"),
            reply("<ping-results><rpc-error><error-severity>warning</error-severity><error-message>ttl expired</error-message></rpc-error></ping-results>"),
        ])
        .await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let options = PingOptions::new("192.0.2.9");
        let result = ping(&mut session, &options).await;
        assert_eq!(result.msg, "Ping returned errors: no route to host");

        let result = ping(&mut session, &options).await;
        assert!(result.failed);
        assert_eq!(result.warnings, Some(vec!["ttl expired".to_string()]));
        assert!(result
            .msg
            .starts_with("Probe-results-summary not found in response: "));
    }
}

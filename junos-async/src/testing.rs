//! Scripted in-memory device used by the unit tests.
use crate::connection::Connection;
use crate::error::{JunosClientError, JunosClientResult};
use crate::transport::Transport;
use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub(crate) const OK: &str = "<ok/>";

pub(crate) const SERVER_HELLO: &str = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <capabilities>
    <capability>urn:ietf:params:netconf:base:1.0</capability>
    <capability>urn:ietf:params:netconf:capability:candidate:1.0</capability>
    <capability>urn:ietf:params:netconf:capability:confirmed-commit:1.0</capability>
    <capability>http://xml.juniper.net/netconf/junos/1.0</capability>
  </capabilities>
  <session-id>4711</session-id>
</hello>"#;

pub(crate) type SentLog = Arc<Mutex<Vec<String>>>;

/// Wraps `body` in an `<rpc-reply>` answering the last request.
pub(crate) fn reply(body: &str) -> String {
    format!(
        r#"<rpc-reply message-id="{{id}}" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">{}</rpc-reply>"#,
        body
    )
}

/// Replays canned replies in order. `{id}` in a reply is replaced with the
/// message-id of the request it answers; once the script runs out the peer
/// behaves as closed.
pub(crate) struct MockTransport {
    replies: VecDeque<String>,
    sent: SentLog,
    last_message_id: String,
}

impl MockTransport {
    pub(crate) fn new(replies: Vec<String>) -> (MockTransport, SentLog) {
        let sent = SentLog::default();
        let mut script = VecDeque::from(replies);
        script.push_front(SERVER_HELLO.to_string());
        (
            MockTransport {
                replies: script,
                sent: sent.clone(),
                last_message_id: String::new(),
            },
            sent,
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn receive(&mut self) -> JunosClientResult<String> {
        self.replies
            .pop_front()
            .map(|reply| reply.replace("{id}", &self.last_message_id))
            .ok_or(JunosClientError::ConnectionClosed)
    }

    async fn write(&mut self, rpc: &str) -> JunosClientResult<()> {
        let id = Regex::new(r#"message-id="([^"]+)""#).map_err(anyhow::Error::from)?;
        if let Some(captures) = id.captures(rpc) {
            self.last_message_id = captures[1].to_string();
        }
        self.sent
            .lock()
            .map_err(|_| JunosClientError::new("sent log poisoned".to_string()))?
            .push(rpc.to_string());
        Ok(())
    }

    async fn close(&mut self) -> JunosClientResult<()> {
        Ok(())
    }

    async fn upgrade(&mut self) {}
}

/// A connection that already exchanged hellos with the scripted device.
pub(crate) async fn connection(replies: Vec<String>) -> (Connection, SentLog) {
    let (transport, sent) = MockTransport::new(replies);
    let conn = Connection::new(transport).await.unwrap();
    (conn, sent)
}

/// Requests sent after the hello.
pub(crate) fn requests(sent: &SentLog) -> Vec<String> {
    sent.lock().unwrap().iter().skip(1).cloned().collect()
}

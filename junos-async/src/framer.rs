use crate::error::JunosClientResult;
use async_trait::async_trait;

pub mod async_framer;

pub const NETCONF_1_0_TERMINATOR: &str = "]]>]]>";

/// Message framing in use on a NETCONF channel.
///
/// See [RFC6242 4.1](https://tools.ietf.org/html/rfc6242#section-4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `]]>]]>` delimited messages, used for the hello exchange and with
    /// base:1.0 peers.
    EndOfMessage,
    /// Chunked framing negotiated with `urn:ietf:params:netconf:base:1.1`.
    Chunked,
}

/// Trait for NETCONF framer
#[async_trait]
pub trait Framer: Send {
    fn framing(&self) -> Framing;
    async fn upgrade(&mut self);
    async fn read_async(&mut self) -> JunosClientResult<String>;
    async fn write_async(&mut self, rpc: &str) -> JunosClientResult<()>;
}

use crate::error::{JunosClientError, JunosClientResult};
use crate::message::{Hello, IgnoreWarning, Rpc, RpcReply};
use crate::transport::Transport;
use crate::xml::XmlNode;
use crate::NETCONF_BASE_11_CAP;
use core::time::Duration;
use log::{debug, error, warn};
use quick_xml::de::from_str;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::block_in_place;
use tokio::time::timeout;

/// One NETCONF session: the hello exchange and request/reply correlation
/// over a framed transport.
pub struct Connection {
    pub(crate) transport: Box<dyn Transport + 'static>,

    session_id: Option<u64>,
    capabilities: Vec<String>,
    rpc_timeout: Option<Duration>,
    is_closed: bool,
}

impl Connection {
    pub async fn new<T>(transport: T) -> JunosClientResult<Connection>
    where
        T: Transport + 'static,
    {
        let mut conn = Connection {
            transport: Box::from(transport),
            session_id: None,
            capabilities: Vec::new(),
            rpc_timeout: None,
            is_closed: false,
        };
        conn.hello().await?;
        Ok(conn)
    }

    /// Bounds every following request/reply exchange.
    pub fn set_rpc_timeout(&mut self, rpc_timeout: Duration) {
        self.rpc_timeout = Some(rpc_timeout);
    }

    pub fn session_id(&self) -> u64 {
        self.session_id.unwrap_or(0)
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// True after `<close-session>` or once the transport failed.
    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    async fn hello(&mut self) -> JunosClientResult<()> {
        let hello = Hello::new();
        let response = self.transport.write_and_receive(&hello.to_string()).await?;
        debug!("Hello:\n{}", response);

        let hello: Hello = from_str(&response)?;
        if hello.has_capability(NETCONF_BASE_11_CAP) {
            self.transport.upgrade().await;
        }
        self.session_id = hello.session_id();
        self.capabilities = hello.capabilities();
        Ok(())
    }

    /// Sends an arbitrary RPC element, e.g. `<get-software-information/>`.
    ///
    /// Warnings matched by `ignore` do not fail the request.
    pub async fn rpc(
        &mut self,
        body: XmlNode,
        ignore: &IgnoreWarning,
    ) -> JunosClientResult<RpcReply> {
        self.run_rpc(Rpc::new(body), ignore).await
    }

    pub async fn close_session(&mut self) -> JunosClientResult<RpcReply> {
        self.is_closed = true;
        let reply = self.run_rpc(Rpc::close_session(), &IgnoreWarning::Never).await;
        if let Err(err) = self.transport.close().await {
            debug!("Error closing transport: {}", err);
        }
        reply
    }

    async fn run_rpc(&mut self, rpc: Rpc, ignore: &IgnoreWarning) -> JunosClientResult<RpcReply> {
        debug!("Sending <{}> with message-id {}", rpc.name(), rpc.message_id());
        let rpc_text = rpc.to_string();
        let exchange = self.transport.write_and_receive(&rpc_text);
        let response = match self.rpc_timeout {
            Some(limit) => match timeout(limit, exchange).await {
                Ok(response) => response,
                Err(_) => Err(JunosClientError::Timeout(limit.as_secs())),
            },
            None => exchange.await,
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                if err.is_connection_error() {
                    self.is_closed = true;
                }
                return Err(err);
            }
        };
        debug!("RPC:\n{}", response);

        let reply = RpcReply::parse(&response)?;
        if let Some(actual) = reply.message_id() {
            if actual != rpc.message_id() {
                return Err(JunosClientError::MessageIdMismatch {
                    expected: rpc.message_id().to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        for warning in reply.warnings() {
            debug!("Device warning: {}", warning);
        }
        let failures: Vec<_> = reply.failures(ignore).into_iter().cloned().collect();
        if !failures.is_empty() {
            return Err(JunosClientError::Rpc(reply.with_errors(failures)));
        }
        Ok(reply)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.is_closed {
            return;
        }
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                block_in_place(|| {
                    handle.block_on(async {
                        if let Err(err) = self.close_session().await {
                            error!("Error closing netconf session: {}", err);
                        }
                    });
                });
            }
            _ => warn!(
                "NETCONF session {} dropped without <close-session>",
                self.session_id()
            ),
        }
    }
}

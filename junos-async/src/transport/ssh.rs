use crate::error::{JunosClientError, JunosClientResult};
use crate::framer::async_framer::AsyncFramer;
use crate::framer::Framer;
use crate::session::SessionConfig;
use crate::transport::Transport;
use async_ssh2_lite::{ssh2, AsyncChannel, AsyncSession, SessionConfiguration};
use async_trait::async_trait;
use log::debug;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// NETCONF over the `netconf` subsystem of an authenticated SSH session.
pub struct SshTransport {
    session: AsyncSession<TcpStream>,
    framer: AsyncFramer<AsyncChannel<TcpStream>>,
}

impl SshTransport {
    pub async fn new(session: AsyncSession<TcpStream>) -> JunosClientResult<SshTransport> {
        if !session.authenticated() {
            return Err(JunosClientError::new(
                "SSH session is not authenticated".to_string(),
            ));
        }
        let mut channel = session.channel_session().await?;
        channel.subsystem("netconf").await?;
        Ok(SshTransport {
            session,
            framer: AsyncFramer::new(channel),
        })
    }
}

/// Password authenticated SSH session to `port` of the session host.
///
/// SCP transfers use it directly, without the NETCONF subsystem.
pub async fn password_session(
    config: &SessionConfig,
    port: u16,
    password: &str,
) -> JunosClientResult<AsyncSession<TcpStream>> {
    debug!(target: &config.host, "Opening ssh session to port {}", port);
    let limit = config.connect_timeout;
    let stream = match timeout(limit, TcpStream::connect((config.host.as_str(), port))).await {
        Ok(stream) => stream?,
        Err(_) => {
            return Err(JunosClientError::new(format!(
                "connection to {}:{} timed out after {}s",
                config.host,
                port,
                limit.as_secs()
            )))
        }
    };
    let mut settings = SessionConfiguration::new();
    settings.set_timeout(limit.as_millis() as u32);
    let mut session = AsyncSession::new(stream, settings)?;
    session.handshake().await?;
    session.userauth_password(&config.user, password).await?;
    Ok(session)
}

#[async_trait]
impl Transport for SshTransport {
    async fn receive(&mut self) -> JunosClientResult<String> {
        self.framer.read_async().await
    }

    async fn write(&mut self, rpc: &str) -> JunosClientResult<()> {
        self.framer.write_async(rpc).await
    }

    async fn close(&mut self) -> JunosClientResult<()> {
        Ok(self
            .session
            .disconnect(Some(ssh2::ByApplication), "Session closed", None)
            .await?)
    }

    async fn upgrade(&mut self) {
        self.framer.upgrade().await;
    }
}

use crate::error::JunosClientResult;
use crate::session::SessionConfig;
use crate::transfer::FileTransport;
use crate::transport::ssh::password_session;
use async_ssh2_lite::AsyncSession;
use async_trait::async_trait;
use log::debug;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{self, AsyncWriteExt};
use tokio::net::TcpStream;

const FILE_MODE: i32 = 0o644;

/// SCP over a dedicated SSH session, separate from the NETCONF one.
pub struct ScpTransport {
    session: AsyncSession<TcpStream>,
    host: String,
}

impl ScpTransport {
    pub async fn connect(config: &SessionConfig, password: &str) -> JunosClientResult<ScpTransport> {
        let session = password_session(config, crate::SSH_DEFAULT_PORT, password).await?;
        Ok(ScpTransport {
            session,
            host: config.host.clone(),
        })
    }
}

#[async_trait]
impl FileTransport for ScpTransport {
    async fn put(&mut self, local: &Path, remote: &str) -> JunosClientResult<()> {
        let mut file = File::open(local).await?;
        let size = file.metadata().await?.len();
        debug!(target: &self.host, "scp {} -> {} ({} bytes)", local.display(), remote, size);
        let mut channel = self
            .session
            .scp_send(Path::new(remote), FILE_MODE, size, None)
            .await?;
        io::copy(&mut file, &mut channel).await?;
        channel.flush().await?;
        channel.send_eof().await?;
        channel.wait_eof().await?;
        channel.close().await?;
        channel.wait_close().await?;
        Ok(())
    }

    async fn get(&mut self, remote: &str, local: &Path) -> JunosClientResult<()> {
        let (channel, stat) = self.session.scp_recv(Path::new(remote)).await?;
        debug!(target: &self.host, "scp {} <- {} ({} bytes)", local.display(), remote, stat.size());
        let mut file = File::create(local).await?;
        let mut limited = tokio::io::AsyncReadExt::take(channel, stat.size());
        io::copy(&mut limited, &mut file).await?;
        file.flush().await?;
        let mut channel = limited.into_inner();
        channel.send_eof().await?;
        channel.wait_eof().await?;
        channel.close().await?;
        channel.wait_close().await?;
        Ok(())
    }

    async fn close(&mut self) -> JunosClientResult<()> {
        self.session
            .disconnect(Some(async_ssh2_lite::ssh2::ByApplication), "Shutdown", None)
            .await?;
        Ok(())
    }
}

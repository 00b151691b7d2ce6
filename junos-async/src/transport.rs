use crate::error::JunosClientResult;
use async_trait::async_trait;

#[cfg(feature = "ssh")]
pub mod ssh;

/// Trait for NETCONF transport
#[async_trait]
pub trait Transport: Send {
    async fn receive(&mut self) -> JunosClientResult<String>;
    async fn write(&mut self, rpc: &str) -> JunosClientResult<()>;
    async fn write_and_receive(&mut self, rpc: &str) -> JunosClientResult<String> {
        self.write(rpc).await?;
        self.receive().await
    }
    async fn close(&mut self) -> JunosClientResult<()>;
    async fn upgrade(&mut self);
}

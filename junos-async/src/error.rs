use crate::message;
use thiserror::Error;

pub type JunosClientResult<T> = Result<T, JunosClientError>;

#[derive(Debug, Error)]
pub enum JunosClientError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(feature = "ssh")]
    #[error(transparent)]
    Ssh(#[from] async_ssh2_lite::Error),
    #[error(transparent)]
    SerializingFailure(#[from] quick_xml::DeError),
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    TestDefinition(#[from] toml::de::Error),
    #[error("{0}")]
    Rpc(#[from] message::RpcReply),
    #[error(
        "malformed message chunk (expected {:?}, actual {:?})",
        expected,
        actual
    )]
    MalformedChunk { expected: char, actual: char },
    #[error("reply message-id {actual} does not match request message-id {expected}")]
    MessageIdMismatch { expected: String, actual: String },
    #[error("NETCONF session closed by peer")]
    ConnectionClosed,
    #[error("RPC timed out after {0} seconds")]
    Timeout(u64),
    #[error("The configuration database is already open by another transaction on {0}")]
    LockHeld(String),
    #[error("The device or configuration is not open.")]
    ConfigurationNotOpen,
    #[error(
        "The value of the rollback option ({0}) is invalid. Must be the string 'rescue' or an int between 0 and 49."
    )]
    InvalidRollback(String),
    #[error("Rollback {id} does not exist. Device has {available} checkpoints.")]
    MissingCheckpoint { id: u8, available: usize },
    #[error("Transfer failed (different {algorithm} between local and remote) {local} | {remote}")]
    ChecksumMismatch {
        algorithm: String,
        local: String,
        remote: String,
    },
    #[error("FTP server replied {code}: {message}")]
    Ftp { code: u16, message: String },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl JunosClientError {
    pub fn new(msg: String) -> Self {
        JunosClientError::Anyhow(anyhow::Error::msg(msg))
    }

    /// Errors after which the session must be considered unusable.
    pub fn is_connection_error(&self) -> bool {
        match self {
            JunosClientError::Io(_)
            | JunosClientError::ConnectionClosed
            | JunosClientError::Timeout(_)
            | JunosClientError::MalformedChunk { .. } => true,
            #[cfg(feature = "ssh")]
            JunosClientError::Ssh(_) => true,
            _ => false,
        }
    }
}

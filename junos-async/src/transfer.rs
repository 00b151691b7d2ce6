//! File transfers between the controller and a device.
//!
//! A [`TransferJob`] describes one copy. [`transfer`] runs it over any
//! [`FileTransport`] and, when a checksum algorithm is set, skips files
//! already present and verifies the copy afterwards using digests computed
//! locally and by the device.
use crate::checksum::{local_checksum, remote_checksum, ChecksumAlgorithm};
use crate::error::{JunosClientError, JunosClientResult};
use crate::session::DeviceSession;
use async_trait::async_trait;
use core::fmt;
use core::str::FromStr;
use log::{debug, error, info};
use std::path::{Path, PathBuf};

pub mod ftp;
#[cfg(feature = "ssh")]
pub mod scp;

pub const FILE_PUSHED: &str = "File pushed OK";
pub const FILE_PRESENT: &str = "File already present, skipping the scp";
pub const TRANSFER_FAILED: &str = "Transfer failed";

/// Moves whole files, `remote` is a path on the device.
#[async_trait]
pub trait FileTransport: Send {
    async fn put(&mut self, local: &Path, remote: &str) -> JunosClientResult<()>;

    async fn get(&mut self, remote: &str, local: &Path) -> JunosClientResult<()>;

    async fn close(&mut self) -> JunosClientResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Scp,
    Ftp,
}

impl FromStr for Protocol {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scp" => Ok(Protocol::Scp),
            "ftp" => Ok(Protocol::Ftp),
            _ => Err(JunosClientError::new(format!(
                "The value of the protocol option ({}) is invalid. Must be one of: scp, ftp",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Put,
    Get,
}

impl FromStr for Direction {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "put" => Ok(Direction::Put),
            "get" => Ok(Direction::Get),
            _ => Err(JunosClientError::new(format!(
                "The value of the action option ({}) is invalid. Must be one of: put, get",
                s
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Put => f.write_str("put"),
            Direction::Get => f.write_str("get"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferStatus {
    #[default]
    Pending,
    /// Destination already had identical content.
    Skipped,
    Completed,
    Failed(String),
}

impl TransferStatus {
    pub fn message(&self) -> &str {
        match self {
            TransferStatus::Pending => "Transfer pending",
            TransferStatus::Skipped => FILE_PRESENT,
            TransferStatus::Completed => FILE_PUSHED,
            TransferStatus::Failed(msg) => msg,
        }
    }

    pub fn changed(&self) -> bool {
        *self == TransferStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub protocol: Protocol,
    pub direction: Direction,
    pub local: PathBuf,
    pub remote: String,
    pub checksum: ChecksumAlgorithm,
    pub status: TransferStatus,
}

impl TransferJob {
    pub fn new(direction: Direction, local: PathBuf, remote: &str) -> TransferJob {
        TransferJob {
            protocol: Protocol::default(),
            direction,
            local,
            remote: remote.to_string(),
            checksum: ChecksumAlgorithm::default(),
            status: TransferStatus::Pending,
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> TransferJob {
        self.protocol = protocol;
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumAlgorithm) -> TransferJob {
        self.checksum = checksum;
        self
    }

    pub fn is_complete(&self) -> bool {
        matches!(
            self.status,
            TransferStatus::Completed | TransferStatus::Skipped
        )
    }

    async fn copy(&self, transport: &mut dyn FileTransport) -> JunosClientResult<()> {
        match self.direction {
            Direction::Put => transport.put(&self.local, &self.remote).await,
            Direction::Get => transport.get(&self.remote, &self.local).await,
        }
    }
}

/// Runs `job`, leaving the final status on it.
///
/// Checksum failures and errors while checksumming are returned as errors,
/// transport errors of unverified copies only fail the job.
pub async fn transfer(
    session: &mut DeviceSession,
    transport: &mut dyn FileTransport,
    job: &mut TransferJob,
) -> JunosClientResult<()> {
    let algorithm = job.checksum;
    if !algorithm.is_enabled() {
        job.status = match job.copy(transport).await {
            Ok(()) => TransferStatus::Completed,
            Err(err) => {
                error!(target: session.host(), "{} of {} failed: {}", job.direction, job.local.display(), err);
                TransferStatus::Failed(format!("Error: {}", err))
            }
        };
        return Ok(());
    }

    debug!(target: session.host(), "Computing local {} checksum on: {}", algorithm, job.local.display());
    let local = local_checksum(&job.local, algorithm).await?;
    debug!(target: session.host(), "Computing remote {} checksum on: {}", algorithm, job.remote);
    let remote = remote_checksum(session, &job.remote, algorithm).await?;

    let source = match job.direction {
        Direction::Put => local.clone().ok_or_else(|| {
            JunosClientError::new(format!(
                "Local file {} does not exist.",
                job.local.display()
            ))
        })?,
        Direction::Get => remote.clone().ok_or_else(|| {
            JunosClientError::new(format!("Remote file {} does not exist.", job.remote))
        })?,
    };
    let destination = match job.direction {
        Direction::Put => remote,
        Direction::Get => local,
    };
    if destination.as_deref() == Some(source.as_str()) {
        info!(target: session.host(), "{}", FILE_PRESENT);
        job.status = TransferStatus::Skipped;
        return Ok(());
    }

    info!(target: session.host(), "File not present, need to transfer");
    if let Err(err) = job.copy(transport).await {
        error!(target: session.host(), "{} of {} failed: {}", job.direction, job.local.display(), err);
        job.status = TransferStatus::Failed(format!("Error: {}", err));
        return Err(err);
    }

    let (local, remote) = match job.direction {
        Direction::Put => (
            source,
            remote_checksum(session, &job.remote, algorithm).await?,
        ),
        Direction::Get => (local_checksum(&job.local, algorithm).await?.unwrap_or_default(), Some(source)),
    };
    let remote = remote.unwrap_or_default();
    if local != remote {
        let err = JunosClientError::ChecksumMismatch {
            algorithm: algorithm.to_string(),
            local,
            remote,
        };
        error!(target: session.host(), "{}", err);
        job.status = TransferStatus::Failed(err.to_string());
        return Err(err);
    }
    info!(target: session.host(), "Checksum check passed. {}", FILE_PUSHED);
    job.status = TransferStatus::Completed;
    Ok(())
}

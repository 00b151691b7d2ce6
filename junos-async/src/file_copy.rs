//! The `file_copy` task.
use crate::checksum::ChecksumAlgorithm;
use crate::error::{JunosClientError, JunosClientResult};
use crate::output::TaskResult;
use crate::session::{DeviceSession, SessionConfig};
use crate::transfer::ftp::{FtpTransport, FTP_DEFAULT_PORT};
use crate::transfer::{transfer, Direction, FileTransport, Protocol, TransferJob};
use log::info;
use serde_derive::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct FileCopyOptions {
    pub local_dir: PathBuf,
    pub remote_dir: String,
    pub file: String,
    pub action: Direction,
    pub protocol: Protocol,
    pub checksum: ChecksumAlgorithm,
}

impl FileCopyOptions {
    pub fn job(&self) -> TransferJob {
        let remote = format!("{}/{}", self.remote_dir.trim_end_matches('/'), self.file);
        TransferJob::new(self.action, self.local_dir.join(&self.file), &remote)
            .with_protocol(self.protocol)
            .with_checksum(self.checksum)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileCopyResult {
    pub msg: String,
    pub changed: bool,
    pub failed: bool,
}

impl TaskResult for FileCopyResult {
    fn failed(&self) -> bool {
        self.failed
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

/// Opens the file transport for `protocol` with the session's credentials.
pub async fn open_transport(
    config: &SessionConfig,
    protocol: Protocol,
) -> JunosClientResult<Box<dyn FileTransport>> {
    let password = config.password.as_deref().ok_or_else(|| {
        JunosClientError::new(format!("No password provided for {} transfers", match protocol {
            Protocol::Scp => "scp",
            Protocol::Ftp => "ftp",
        }))
    })?;
    match protocol {
        #[cfg(feature = "ssh")]
        Protocol::Scp => Ok(Box::new(
            crate::transfer::scp::ScpTransport::connect(config, password).await?,
        )),
        #[cfg(not(feature = "ssh"))]
        Protocol::Scp => Err(JunosClientError::new(
            "scp transfers need the ssh feature".to_string(),
        )),
        Protocol::Ftp => Ok(Box::new(
            FtpTransport::connect(
                &config.host,
                FTP_DEFAULT_PORT,
                &config.user,
                password,
                config.connect_timeout,
            )
            .await?,
        )),
    }
}

pub async fn run(
    session: &mut DeviceSession,
    transport: &mut dyn FileTransport,
    options: &FileCopyOptions,
) -> FileCopyResult {
    let mut job = options.job();
    info!(
        target: session.host(),
        "{} {} ({:?}, checksum {})",
        job.direction,
        options.file,
        job.protocol,
        job.checksum
    );
    match transfer(session, transport, &mut job).await {
        Ok(()) => FileCopyResult {
            msg: job.status.message().to_string(),
            changed: job.status.changed(),
            failed: !job.is_complete(),
        },
        Err(err) => FileCopyResult {
            msg: err.to_string(),
            changed: false,
            failed: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::connection;
    use crate::transfer::tests::{checksum_reply, missing_file_reply, MemoryTransport};
    use pretty_assertions::assert_eq;

    fn options(dir: &tempfile::TempDir, action: Direction) -> FileCopyOptions {
        FileCopyOptions {
            local_dir: dir.path().to_path_buf(),
            remote_dir: "/var/tmp/".to_string(),
            file: "junos.tgz".to_string(),
            action,
            protocol: Protocol::Scp,
            checksum: ChecksumAlgorithm::Md5,
        }
    }

    #[test]
    fn test_job_paths() {
        let dir = tempfile::tempdir().unwrap();
        let job = options(&dir, Direction::Put).job();
        assert_eq!(job.remote, "/var/tmp/junos.tgz");
        assert_eq!(job.local, dir.path().join("junos.tgz"));
    }

    #[tokio::test]
    async fn test_put_changes_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("junos.tgz"), "abc").unwrap();
        let (conn, _) = connection(vec![
            missing_file_reply(),
            checksum_reply("900150983cd24fb0d6963f7d28e17f72"),
            checksum_reply("900150983cd24fb0d6963f7d28e17f72"),
        ])
        .await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let mut transport = MemoryTransport::default();

        let first = run(&mut session, &mut transport, &options(&dir, Direction::Put)).await;
        assert_eq!(
            first,
            FileCopyResult {
                msg: "File pushed OK".to_string(),
                changed: true,
                failed: false,
            }
        );
        let second = run(&mut session, &mut transport, &options(&dir, Direction::Put)).await;
        assert_eq!(second.msg, "File already present, skipping the scp");
        assert!(!second.changed);
        assert!(!second.failed);
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, _) = connection(vec![missing_file_reply()]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let result = run(
            &mut session,
            &mut MemoryTransport::default(),
            &options(&dir, Direction::Put),
        )
        .await;
        assert!(result.failed);
        assert_eq!(
            result.msg,
            format!("Local file {} does not exist.", dir.path().join("junos.tgz").display())
        );
    }
}

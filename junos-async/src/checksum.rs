//! File digests, computed locally or by the device.
use crate::error::{JunosClientError, JunosClientResult};
use crate::message::IgnoreWarning;
use crate::session::DeviceSession;
use crate::xml::XmlNode;
use core::fmt;
use core::str::FromStr;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const READ_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
    Sha1,
    Sha256,
    /// No verification, transfers always happen.
    None,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::None => "none",
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != ChecksumAlgorithm::None
    }

    fn remote_rpc(&self) -> Option<&'static str> {
        match self {
            ChecksumAlgorithm::Md5 => Some("get-checksum-information"),
            ChecksumAlgorithm::Sha1 => Some("get-sha1-checksum-information"),
            ChecksumAlgorithm::Sha256 => Some("get-sha256-checksum-information"),
            ChecksumAlgorithm::None => None,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha1" => Ok(ChecksumAlgorithm::Sha1),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "none" | "" => Ok(ChecksumAlgorithm::None),
            _ => Err(JunosClientError::new(format!(
                "The value of the checksum_algorithm option ({}) is invalid. Must be one of: md5, sha1, sha256, none",
                s
            ))),
        }
    }
}

async fn digest_file<D: Digest>(path: &Path) -> JunosClientResult<String> {
    let mut file = File::open(path).await?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex digest of a local file, `None` when the file is missing.
pub async fn local_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> JunosClientResult<Option<String>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }
    let digest = match algorithm {
        ChecksumAlgorithm::Md5 => digest_file::<Md5>(path).await?,
        ChecksumAlgorithm::Sha1 => digest_file::<Sha1>(path).await?,
        ChecksumAlgorithm::Sha256 => digest_file::<Sha256>(path).await?,
        ChecksumAlgorithm::None => return Ok(None),
    };
    Ok(Some(digest))
}

/// Digest of a file on the device, `None` when the device cannot read it.
pub async fn remote_checksum(
    session: &mut DeviceSession,
    path: &str,
    algorithm: ChecksumAlgorithm,
) -> JunosClientResult<Option<String>> {
    let Some(rpc) = algorithm.remote_rpc() else {
        return Ok(None);
    };
    let request = XmlNode::new(rpc).child(XmlNode::with_text("path", path));
    match session.rpc(request, &IgnoreWarning::Never).await {
        Ok(reply) => Ok(reply
            .body()
            .findtext("//checksum")
            .filter(|digest| !digest.is_empty())
            .map(|digest| digest.to_lowercase())),
        // a missing file is reported as an rpc-error
        Err(JunosClientError::Rpc(reply)) => {
            log::debug!(target: session.host(), "No remote checksum for {}: {}", path, reply);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::testing::{connection, reply, requests};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_local_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junos.tgz");
        std::fs::write(&path, "abc").unwrap();

        assert_eq!(
            local_checksum(&path, ChecksumAlgorithm::Md5).await.unwrap().unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            local_checksum(&path, ChecksumAlgorithm::Sha1).await.unwrap().unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            local_checksum(&path, ChecksumAlgorithm::Sha256).await.unwrap().unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            local_checksum(&dir.path().join("missing"), ChecksumAlgorithm::Md5)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_remote_checksum() {
        let (conn, sent) = connection(vec![
            reply("<checksum-information><file-checksum><computation-method>MD5</computation-method><input-file>/var/tmp/junos.tgz</input-file><checksum>900150983CD24FB0D6963F7D28E17F72</checksum></file-checksum></checksum-information>"),
            reply("<rpc-error><error-severity>error</error-severity><error-message>Could not open file</error-message></rpc-error>"),
        ])
        .await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let digest = remote_checksum(&mut session, "/var/tmp/junos.tgz", ChecksumAlgorithm::Md5)
            .await
            .unwrap();
        assert_eq!(digest.as_deref(), Some("900150983cd24fb0d6963f7d28e17f72"));
        let missing = remote_checksum(&mut session, "/var/tmp/none", ChecksumAlgorithm::Sha256)
            .await
            .unwrap();
        assert_eq!(missing, None);

        let sent = requests(&sent);
        assert!(sent[0].contains("<get-checksum-information><path>/var/tmp/junos.tgz</path></get-checksum-information>"));
        assert!(sent[1].contains("<get-sha256-checksum-information>"));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("SHA256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert_eq!(ChecksumAlgorithm::Md5.to_string(), "MD5");
        assert!("crc".parse::<ChecksumAlgorithm>().is_err());
    }
}

use crate::error::{JunosClientError, JunosClientResult};
use crate::transfer::FileTransport;
use async_trait::async_trait;
use log::{debug, trace};
use regex::Regex;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const FTP_DEFAULT_PORT: u16 = 21;

/// Minimal passive mode, binary type FTP client.
pub struct FtpTransport {
    control: BufStream<TcpStream>,
    host: String,
    /// Also bounds the passive data connection.
    connect_timeout: Duration,
}

impl FtpTransport {
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        connect_timeout: Duration,
    ) -> JunosClientResult<FtpTransport> {
        debug!(target: host, "Opening FTP control connection to {}:{}", host, port);
        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| JunosClientError::Timeout(connect_timeout.as_secs()))??;
        let mut ftp = FtpTransport {
            control: BufStream::new(stream),
            host: host.to_string(),
            connect_timeout,
        };
        ftp.expect(&[220]).await?;
        let (code, _) = ftp.command(&format!("USER {}", user), &[230, 331]).await?;
        if code == 331 {
            ftp.command(&format!("PASS {}", password), &[202, 230])
                .await?;
        }
        ftp.command("TYPE I", &[200]).await?;
        Ok(ftp)
    }

    async fn read_reply(&mut self) -> JunosClientResult<(u16, String)> {
        let mut line = String::new();
        if self.control.read_line(&mut line).await? == 0 {
            return Err(JunosClientError::ConnectionClosed);
        }
        let code = parse_code(&line)?;
        let mut message = line[3..].trim_start_matches([' ', '-']).trim_end().to_string();
        // multi-line replies end with "<code> "
        if line.as_bytes().get(3) == Some(&b'-') {
            let end = format!("{} ", code);
            loop {
                line.clear();
                if self.control.read_line(&mut line).await? == 0 {
                    return Err(JunosClientError::ConnectionClosed);
                }
                message.push('\n');
                message.push_str(line.trim_end());
                if line.starts_with(&end) {
                    break;
                }
            }
        }
        trace!(target: &self.host, "<- {} {}", code, message);
        Ok((code, message))
    }

    async fn expect(&mut self, expected: &[u16]) -> JunosClientResult<(u16, String)> {
        let (code, message) = self.read_reply().await?;
        if !expected.contains(&code) {
            return Err(JunosClientError::Ftp { code, message });
        }
        Ok((code, message))
    }

    async fn command(&mut self, command: &str, expected: &[u16]) -> JunosClientResult<(u16, String)> {
        if command.starts_with("PASS ") {
            trace!(target: &self.host, "-> PASS ****");
        } else {
            trace!(target: &self.host, "-> {}", command);
        }
        self.control
            .write_all(format!("{}\r\n", command).as_bytes())
            .await?;
        self.control.flush().await?;
        self.expect(expected).await
    }

    async fn passive(&mut self) -> JunosClientResult<TcpStream> {
        let (_, message) = self.command("PASV", &[227]).await?;
        let (ip, port) = parse_pasv(&message)?;
        debug!(target: &self.host, "Opening FTP data connection to {}:{}", ip, port);
        let limit = self.connect_timeout;
        Ok(timeout(limit, TcpStream::connect((ip, port)))
            .await
            .map_err(|_| JunosClientError::Timeout(limit.as_secs()))??)
    }
}

fn parse_code(line: &str) -> JunosClientResult<u16> {
    line.get(..3)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| JunosClientError::new(format!("Invalid FTP reply: {}", line.trim_end())))
}

fn parse_pasv(message: &str) -> JunosClientResult<(Ipv4Addr, u16)> {
    let pattern = Regex::new(r"(\d+),(\d+),(\d+),(\d+),(\d+),(\d+)").map_err(anyhow::Error::from)?;
    let invalid = || JunosClientError::new(format!("Invalid PASV reply: {}", message));
    let captures = pattern.captures(message).ok_or_else(invalid)?;
    let mut parts = [0u8; 6];
    for (i, part) in parts.iter_mut().enumerate() {
        *part = captures[i + 1].parse().map_err(|_| invalid())?;
    }
    Ok((
        Ipv4Addr::new(parts[0], parts[1], parts[2], parts[3]),
        u16::from(parts[4]) << 8 | u16::from(parts[5]),
    ))
}

#[async_trait]
impl FileTransport for FtpTransport {
    async fn put(&mut self, local: &Path, remote: &str) -> JunosClientResult<()> {
        let mut file = File::open(local).await?;
        let mut data = self.passive().await?;
        self.command(&format!("STOR {}", remote), &[125, 150])
            .await?;
        let sent = io::copy(&mut file, &mut data).await?;
        data.shutdown().await?;
        drop(data);
        self.expect(&[226, 250]).await?;
        debug!(target: &self.host, "ftp put {} -> {} ({} bytes)", local.display(), remote, sent);
        Ok(())
    }

    async fn get(&mut self, remote: &str, local: &Path) -> JunosClientResult<()> {
        let mut data = self.passive().await?;
        self.command(&format!("RETR {}", remote), &[125, 150])
            .await?;
        let mut file = File::create(local).await?;
        let received = io::copy(&mut data, &mut file).await?;
        file.flush().await?;
        self.expect(&[226, 250]).await?;
        debug!(target: &self.host, "ftp get {} <- {} ({} bytes)", local.display(), remote, received);
        Ok(())
    }

    async fn close(&mut self) -> JunosClientResult<()> {
        self.command("QUIT", &[221]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, BufReader};
    use tokio::net::TcpListener;

    /// Accepts one client and stores a single uploaded file.
    async fn server(listener: TcpListener) -> (Vec<String>, Vec<u8>) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut commands = Vec::new();
        let mut upload = Vec::new();
        let mut data_listener: Option<TcpListener> = None;
        write.write_all(b"220-Junos FTP\r\n220 ready\r\n").await.unwrap();
        while let Some(line) = lines.next_line().await.unwrap() {
            commands.push(line.clone());
            let reply = match line.split(' ').next().unwrap() {
                "USER" => "331 Password required".to_string(),
                "PASS" => "230 User logged in".to_string(),
                "TYPE" => "200 Type set to I".to_string(),
                "PASV" => {
                    let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
                    let port = data.local_addr().unwrap().port();
                    data_listener = Some(data);
                    format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})",
                        port >> 8,
                        port & 0xff
                    )
                }
                "STOR" => {
                    write.write_all(b"150 Opening BINARY connection\r\n").await.unwrap();
                    let (mut data, _) = data_listener.take().unwrap().accept().await.unwrap();
                    data.read_to_end(&mut upload).await.unwrap();
                    "226 Transfer complete".to_string()
                }
                "RETR" => "550 No such file".to_string(),
                "QUIT" => {
                    write.write_all(b"221 Goodbye\r\n").await.unwrap();
                    break;
                }
                _ => "502 Not implemented".to_string(),
            };
            write.write_all(format!("{}\r\n", reply).as_bytes()).await.unwrap();
        }
        (commands, upload)
    }

    #[tokio::test]
    async fn test_put_and_failed_get() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(server(listener));
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("junos.tgz");
        std::fs::write(&local, "package").unwrap();

        let mut ftp = FtpTransport::connect("127.0.0.1", port, "lab", "lab123", Duration::from_secs(5))
            .await
            .unwrap();
        ftp.put(&local, "/var/tmp/junos.tgz").await.unwrap();
        let err = ftp
            .get("/var/tmp/none", &dir.path().join("none"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "FTP server replied 550: No such file");
        ftp.close().await.unwrap();

        let (commands, upload) = server.await.unwrap();
        assert_eq!(upload, b"package".to_vec());
        assert_eq!(
            commands,
            vec![
                "USER lab",
                "PASS lab123",
                "TYPE I",
                "PASV",
                "STOR /var/tmp/junos.tgz",
                "PASV",
                "RETR /var/tmp/none",
                "QUIT"
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_data_connection_is_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"220 ready\r\n").await.unwrap();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = match line.split(' ').next().unwrap() {
                    "USER" => "230 User logged in",
                    "TYPE" => "200 Type set to I",
                    // TEST-NET-1, nothing answers there
                    "PASV" => "227 Entering Passive Mode (192,0,2,1,195,80)",
                    _ => "502 Not implemented",
                };
                write.write_all(format!("{}\r\n", reply).as_bytes()).await.unwrap();
            }
        });
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("junos.tgz");
        std::fs::write(&local, "package").unwrap();

        let mut ftp = FtpTransport::connect("127.0.0.1", port, "lab", "lab123", Duration::from_millis(200))
            .await
            .unwrap();
        let outcome = timeout(Duration::from_secs(10), ftp.put(&local, "/var/tmp/junos.tgz"))
            .await
            .expect("data connection was not bounded by the connect timeout");
        assert!(outcome.is_err());
        drop(ftp);
        server.await.unwrap();
    }

    #[test]
    fn test_parse_pasv() {
        assert_eq!(
            parse_pasv("Entering Passive Mode (10,0,0,1,195,80).").unwrap(),
            (Ipv4Addr::new(10, 0, 0, 1), 50000)
        );
        assert!(parse_pasv("Entering Passive Mode").is_err());
    }
}

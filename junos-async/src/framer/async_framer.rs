use crate::error::{JunosClientError, JunosClientResult};
use crate::framer::{Framer, Framing, NETCONF_1_0_TERMINATOR};
use async_trait::async_trait;
use log::{debug, trace};
use memmem::{Searcher, TwoWaySearcher};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_CHUNK_SIZE: u64 = 4_294_967_295;
const READ_BUFFER: usize = 8192;

/// RFC6242 message framer over any async byte channel.
pub struct AsyncFramer<T> {
    channel: T,
    framing: Framing,
    read_buffer: Vec<u8>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncFramer<T> {
    pub fn new(channel: T) -> Self {
        AsyncFramer {
            channel,
            framing: Framing::EndOfMessage,
            read_buffer: Vec::new(),
        }
    }

    pub fn into_inner(self) -> T {
        self.channel
    }

    async fn read_byte(&mut self) -> JunosClientResult<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte).await?;
        Ok(byte[0])
    }

    async fn read_exact(&mut self, buffer: &mut [u8]) -> JunosClientResult<()> {
        match self.channel.read_exact(buffer).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Err(JunosClientError::ConnectionClosed)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn expect_byte(&mut self, expected: u8) -> JunosClientResult<()> {
        let actual = self.read_byte().await?;
        if actual != expected {
            return Err(JunosClientError::MalformedChunk {
                expected: expected.into(),
                actual: actual.into(),
            });
        }
        Ok(())
    }

    /// Reads one chunk header, `\n#<size>\n` or the end-of-chunks marker
    /// `\n##\n` which yields `None`.
    async fn read_chunk_header(&mut self) -> JunosClientResult<Option<u64>> {
        self.expect_byte(b'\n').await?;
        self.expect_byte(b'#').await?;

        let first = self.read_byte().await?;
        if first == b'#' {
            self.expect_byte(b'\n').await?;
            return Ok(None);
        }
        if !(b'1'..=b'9').contains(&first) {
            return Err(JunosClientError::MalformedChunk {
                expected: '1',
                actual: first.into(),
            });
        }

        let mut chunk_size = u64::from(first - b'0');
        loop {
            let next = self.read_byte().await?;
            if next == b'\n' {
                return Ok(Some(chunk_size));
            }
            if !next.is_ascii_digit() {
                return Err(JunosClientError::MalformedChunk {
                    expected: '0',
                    actual: next.into(),
                });
            }
            chunk_size = chunk_size * 10 + u64::from(next - b'0');
            if chunk_size > MAX_CHUNK_SIZE {
                return Err(JunosClientError::MalformedChunk {
                    expected: '\n',
                    actual: next.into(),
                });
            }
        }
    }

    async fn read_chunked(&mut self) -> JunosClientResult<String> {
        let mut message = Vec::new();
        while let Some(chunk_size) = self.read_chunk_header().await? {
            trace!("Reading chunk of {} bytes", chunk_size);
            // The buffer only grows with bytes actually received.
            let mut remaining = chunk_size as usize;
            let mut buffer = [0u8; READ_BUFFER];
            while remaining > 0 {
                let want = remaining.min(READ_BUFFER);
                self.read_exact(&mut buffer[..want]).await?;
                message.extend_from_slice(&buffer[..want]);
                remaining -= want;
            }
        }
        Ok(String::from_utf8_lossy(&message).trim().to_string())
    }

    async fn read_end_of_message(&mut self) -> JunosClientResult<String> {
        let search = TwoWaySearcher::new(NETCONF_1_0_TERMINATOR.as_bytes());
        let mut scanned = 0usize;
        let mut buffer = [0u8; 4096];
        loop {
            // Resume the search just before the previous end so a terminator
            // split across reads is still found.
            let from = scanned.saturating_sub(NETCONF_1_0_TERMINATOR.len());
            if let Some(pos) = search.search_in(&self.read_buffer[from..]) {
                let end = from + pos;
                let message = String::from_utf8_lossy(&self.read_buffer[..end])
                    .trim()
                    .to_string();
                self.read_buffer
                    .drain(..end + NETCONF_1_0_TERMINATOR.len());
                return Ok(message);
            }
            scanned = self.read_buffer.len();
            let read = self.channel.read(&mut buffer).await?;
            if read == 0 {
                return Err(JunosClientError::ConnectionClosed);
            }
            self.read_buffer.extend_from_slice(&buffer[..read]);
        }
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Framer for AsyncFramer<T> {
    fn framing(&self) -> Framing {
        self.framing
    }

    async fn upgrade(&mut self) {
        debug!("Switching to chunked framing");
        self.framing = Framing::Chunked;
    }

    async fn read_async(&mut self) -> JunosClientResult<String> {
        match self.framing {
            Framing::Chunked => self.read_chunked().await,
            Framing::EndOfMessage => self.read_end_of_message().await,
        }
    }

    async fn write_async(&mut self, rpc: &str) -> JunosClientResult<()> {
        trace!("Writing message:\n{}", rpc);
        let bytes = rpc.as_bytes();
        match self.framing {
            Framing::Chunked => {
                self.channel
                    .write_all(format!("\n#{}\n", bytes.len()).as_bytes())
                    .await?;
                self.channel.write_all(bytes).await?;
                self.channel.write_all(b"\n##\n").await?;
            }
            Framing::EndOfMessage => {
                self.channel.write_all(bytes).await?;
                self.channel
                    .write_all(NETCONF_1_0_TERMINATOR.as_bytes())
                    .await?;
            }
        }
        self.channel.flush().await?;
        Ok(())
    }
}

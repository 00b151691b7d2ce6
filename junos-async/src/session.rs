//! Device sessions and the manager sharing them between tasks.
//!
//! A [`SessionManager`] keeps one [`DeviceSession`] per `user@host:port`.
//! Concurrent callers for the same device get the same session behind an
//! async mutex, different devices never wait on each other. Sessions that
//! were closed, broke, or sat idle for longer than their idle timeout are
//! re-established on the next [`SessionManager::acquire`], retrying with
//! exponential backoff.
use crate::connection::Connection;
use crate::error::{JunosClientError, JunosClientResult};
use crate::message::{IgnoreWarning, RpcReply};
#[cfg(feature = "ssh")]
use crate::transport::ssh::{password_session, SshTransport};
use crate::xml::XmlNode;
use crate::{NETCONF_DEFAULT_PORT, SSH_DEFAULT_PORT};
use async_trait::async_trait;
use backoff::future::retry_notify;
use backoff::ExponentialBackoff;
use core::str::FromStr;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

pub type SharedSession = Arc<Mutex<DeviceSession>>;

/// `netconf` speaks NETCONF on port 830, `ssh` reaches the same subsystem
/// through the regular SSH port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Netconf,
    Ssh,
}

impl TransportKind {
    pub fn default_port(self) -> u16 {
        match self {
            TransportKind::Netconf => NETCONF_DEFAULT_PORT,
            TransportKind::Ssh => SSH_DEFAULT_PORT,
        }
    }
}

impl FromStr for TransportKind {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "netconf" => Ok(TransportKind::Netconf),
            "ssh" => Ok(TransportKind::Ssh),
            _ => Err(JunosClientError::new(format!(
                "unknown transport {}, (expected netconf or ssh)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: Option<String>,
    pub transport: TransportKind,
    pub connect_timeout: Duration,
    pub rpc_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub attempts: u32,
    pub retry_interval: Duration,
}

impl SessionConfig {
    pub fn new(host: &str, user: &str) -> SessionConfig {
        SessionConfig {
            host: host.to_string(),
            port: None,
            user: user.to_string(),
            password: None,
            transport: TransportKind::Netconf,
            connect_timeout: Duration::from_secs(30),
            rpc_timeout: Duration::from_secs(30),
            idle_timeout: None,
            attempts: 3,
            retry_interval: Duration::from_secs(1),
        }
    }

    pub fn with_password(mut self, password: &str) -> SessionConfig {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_port(mut self, port: u16) -> SessionConfig {
        self.port = Some(port);
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> SessionConfig {
        self.transport = transport;
        self
    }

    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> SessionConfig {
        self.rpc_timeout = rpc_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> SessionConfig {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> SessionConfig {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> SessionConfig {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> SessionConfig {
        self.retry_interval = retry_interval;
        self
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(self.transport.default_port())
    }

    /// Sessions are shared between requests with the same key.
    pub fn key(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port())
    }
}

/// Establishes NETCONF connections for the session manager.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &SessionConfig) -> JunosClientResult<Connection>;
}

/// Password authenticated NETCONF over SSH.
#[cfg(feature = "ssh")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

#[cfg(feature = "ssh")]
#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, config: &SessionConfig) -> JunosClientResult<Connection> {
        let password = config
            .password
            .as_deref()
            .ok_or_else(|| JunosClientError::new("No password provided".to_string()))?;
        let session = password_session(config, config.port(), password).await?;
        let transport = SshTransport::new(session).await?;
        let mut connection = Connection::new(transport).await?;
        connection.set_rpc_timeout(config.rpc_timeout);
        Ok(connection)
    }
}

pub struct DeviceSession {
    config: SessionConfig,
    connection: Option<Connection>,
    last_used: Instant,
    configuration_lock: Option<Uuid>,
}

impl DeviceSession {
    pub fn new(config: SessionConfig) -> DeviceSession {
        DeviceSession {
            config,
            connection: None,
            last_used: Instant::now(),
            configuration_lock: None,
        }
    }

    /// A session around an already established connection.
    pub fn with_connection(config: SessionConfig, connection: Connection) -> DeviceSession {
        let mut session = DeviceSession::new(config);
        session.connection = Some(connection);
        session
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.connection
            .as_ref()
            .map(|connection| !connection.is_closed())
            .unwrap_or(false)
    }

    pub fn is_idle(&self) -> bool {
        self.config
            .idle_timeout
            .map(|idle| self.last_used.elapsed() > idle)
            .unwrap_or(false)
    }

    pub fn connection(&mut self) -> JunosClientResult<&mut Connection> {
        self.last_used = Instant::now();
        match self.connection.as_mut() {
            Some(connection) if !connection.is_closed() => Ok(connection),
            _ => Err(JunosClientError::ConnectionClosed),
        }
    }

    /// Sends an arbitrary RPC element on this session.
    pub async fn rpc(
        &mut self,
        body: XmlNode,
        ignore: &IgnoreWarning,
    ) -> JunosClientResult<RpcReply> {
        self.connection()?.rpc(body, ignore).await
    }

    pub(crate) fn configuration_lock(&self) -> Option<Uuid> {
        self.configuration_lock
    }

    pub(crate) fn set_configuration_lock(&mut self, token: Option<Uuid>) {
        self.configuration_lock = token;
    }

    /// Sends `<close-session>` if the session is still open.
    pub async fn close(&mut self) -> JunosClientResult<()> {
        self.configuration_lock = None;
        if let Some(mut connection) = self.connection.take() {
            if !connection.is_closed() {
                debug!(target: &self.config.host, "Closing session {}", connection.session_id());
                connection.close_session().await?;
            }
        }
        Ok(())
    }

    fn replace_connection(&mut self, connection: Connection) {
        self.connection = Some(connection);
        self.configuration_lock = None;
        self.last_used = Instant::now();
    }
}

pub struct SessionManager<C> {
    connector: C,
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C) -> SessionManager<C> {
        SessionManager {
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared session for `config`, connecting or reconnecting
    /// it when needed.
    pub async fn acquire(&self, config: &SessionConfig) -> JunosClientResult<SharedSession> {
        let shared = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry(config.key())
                .or_insert_with(|| Arc::new(Mutex::new(DeviceSession::new(config.clone()))))
                .clone()
        };

        {
            let mut session = shared.lock().await;
            if session.is_open() && session.is_idle() {
                info!(target: &config.host, "Session idle for too long, reconnecting");
                if let Err(err) = session.close().await {
                    debug!(target: &config.host, "Error closing idle session: {}", err);
                }
            }
            if !session.is_open() {
                let connection = self.connect(config).await?;
                session.replace_connection(connection);
            }
        }
        Ok(shared)
    }

    async fn connect(&self, config: &SessionConfig) -> JunosClientResult<Connection> {
        let policy = ExponentialBackoff {
            current_interval: config.retry_interval,
            initial_interval: config.retry_interval,
            multiplier: 2.0,
            max_interval: config.retry_interval * 8,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        let attempts = AtomicU32::new(0);
        let (attempts, connector) = (&attempts, &self.connector);
        let max_attempts = config.attempts.max(1);

        retry_notify(
            policy,
            || async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    target: &config.host,
                    "Connecting to {}, attempt {}/{}",
                    config.key(),
                    attempt,
                    max_attempts
                );
                match connector.connect(config).await {
                    Ok(connection) => Ok(connection),
                    Err(err) if attempt >= max_attempts => Err(backoff::Error::permanent(err)),
                    Err(err) => Err(backoff::Error::transient(err)),
                }
            },
            |err: JunosClientError, delay: Duration| {
                warn!(
                    target: &config.host,
                    "Connection failed: {}, retrying in {:?}", err, delay
                );
            },
        )
        .await
        .map_err(|err| {
            JunosClientError::new(format!(
                "Unable to make a NETCONF connection to {}: {}",
                config.host, err
            ))
        })
    }

    /// Closes and forgets the session for `config`.
    pub async fn release(&self, config: &SessionConfig) -> JunosClientResult<()> {
        let shared = self.sessions.lock().await.remove(&config.key());
        if let Some(shared) = shared {
            shared.lock().await.close().await?;
        }
        Ok(())
    }

    pub async fn close_all(&self) {
        let sessions: Vec<(String, SharedSession)> =
            self.sessions.lock().await.drain().collect();
        for (key, shared) in sessions {
            if let Err(err) = shared.lock().await.close().await {
                warn!("Error closing session {}: {}", key, err);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{reply, MockTransport, OK};
    use pretty_assertions::assert_eq;

    /// Fails the first `failures` connects, then hands out scripted sessions.
    struct ScriptedConnector {
        failures: u32,
        calls: AtomicU32,
        replies: Vec<String>,
    }

    impl ScriptedConnector {
        fn new(failures: u32, replies: Vec<String>) -> ScriptedConnector {
            ScriptedConnector {
                failures,
                calls: AtomicU32::new(0),
                replies,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, _config: &SessionConfig) -> JunosClientResult<Connection> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(JunosClientError::new("connection refused".to_string()));
            }
            let (transport, _) = MockTransport::new(self.replies.clone());
            Connection::new(transport).await
        }
    }

    fn config(host: &str) -> SessionConfig {
        SessionConfig::new(host, "lab")
            .with_password("lab123")
            .with_retry_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_session_config_ports() {
        let config = SessionConfig::new("10.0.0.1", "lab");
        assert_eq!(config.port(), 830);
        assert_eq!(config.key(), "lab@10.0.0.1:830");
        let config = config.with_transport("ssh".parse().unwrap());
        assert_eq!(config.port(), 22);
        assert_eq!(config.with_port(2222).key(), "lab@10.0.0.1:2222");
        assert!("telnet".parse::<TransportKind>().is_err());
    }

    #[tokio::test]
    async fn test_acquire_shares_session_per_device() {
        let manager = SessionManager::new(ScriptedConnector::new(0, vec![reply(OK)]));
        let first = manager.acquire(&config("r1")).await.unwrap();
        let second = manager.acquire(&config("r1")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.connector.calls(), 1);

        let other = manager.acquire(&config("r2")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(manager.connector.calls(), 2);
        assert_eq!(manager.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_connects_once() {
        let manager = Arc::new(SessionManager::new(ScriptedConnector::new(0, vec![])));
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.acquire(&config("r1")).await.is_ok() })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(manager.connector.calls(), 1);
    }

    #[tokio::test]
    async fn test_acquire_retries_with_backoff() {
        let manager = SessionManager::new(ScriptedConnector::new(2, vec![]));
        let session = manager
            .acquire(&config("r1").with_attempts(3))
            .await
            .unwrap();
        assert!(session.lock().await.is_open());
        assert_eq!(manager.connector.calls(), 3);
    }

    #[tokio::test]
    async fn test_acquire_gives_up_after_attempts() {
        let manager = SessionManager::new(ScriptedConnector::new(5, vec![]));
        let err = manager
            .acquire(&config("r1").with_attempts(2))
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Unable to make a NETCONF connection to r1: connection refused"
        );
        assert_eq!(manager.connector.calls(), 2);
    }

    #[tokio::test]
    async fn test_closed_session_reconnects() {
        let manager = SessionManager::new(ScriptedConnector::new(0, vec![reply(OK)]));
        let session = manager.acquire(&config("r1")).await.unwrap();
        session.lock().await.close().await.unwrap();
        assert!(!session.lock().await.is_open());

        let again = manager.acquire(&config("r1")).await.unwrap();
        assert!(Arc::ptr_eq(&session, &again));
        assert!(again.lock().await.is_open());
        assert_eq!(manager.connector.calls(), 2);
    }

    #[tokio::test]
    async fn test_idle_session_reconnects() {
        let manager = SessionManager::new(ScriptedConnector::new(0, vec![]));
        let config = config("r1").with_idle_timeout(Duration::from_millis(5));
        manager.acquire(&config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.acquire(&config).await.unwrap();
        assert_eq!(manager.connector.calls(), 2);
    }

    #[tokio::test]
    async fn test_release_and_close_all() {
        let manager = SessionManager::new(ScriptedConnector::new(0, vec![reply(OK)]));
        manager.acquire(&config("r1")).await.unwrap();
        manager.acquire(&config("r2")).await.unwrap();
        manager.release(&config("r1")).await.unwrap();
        assert_eq!(manager.len().await, 1);
        manager.close_all().await;
        assert_eq!(manager.len().await, 0);
    }
}

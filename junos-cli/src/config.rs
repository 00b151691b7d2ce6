use crate::commands::builtin::{value_of, value_of_if_exists, values_of};
use async_ssh2_lite::{AsyncSession, SessionConfiguration};
use async_trait::async_trait;
use clap::ArgMatches;
use dirs::home_dir;
use junos_async::connection::Connection;
use junos_async::error::{JunosClientError, JunosClientResult};
use junos_async::session::{Connector, SessionConfig, TransportKind};
use junos_async::transport::ssh::SshTransport;
use log::{debug, warn};
use ssh2::MethodType;
use ssh2_config::{HostParams, ParseRule, SshConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub inner: Arc<Config>,
}

#[derive(Debug)]
pub struct Config {
    pub args: ArgMatches,
    pub ssh_config: Option<SshConfig>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub addresses: Vec<String>,
    pub port: Option<u16>,
    pub transport: TransportKind,
    pub rpc_timeout: Duration,
    pub attempts: u32,
}

impl CliConfig {
    pub fn new(args: ArgMatches) -> JunosClientResult<Self> {
        let ssh_config = home_dir().and_then(|home| read_ssh_config(&home.join(".ssh/config")));
        let config = Config {
            ssh_config,
            username: value_of_if_exists::<String>("username", &args).cloned(),
            password: value_of_if_exists::<String>("password", &args).cloned(),
            addresses: values_of::<String>("host", &args).into_iter().cloned().collect(),
            port: value_of_if_exists::<u16>("port", &args).copied(),
            transport: value_of::<String>("transport", &args).parse()?,
            rpc_timeout: Duration::from_secs(*value_of::<u64>("timeout", &args)),
            attempts: *value_of::<u32>("attempts", &args),
            args,
        };
        Ok(Self {
            inner: Arc::new(config),
        })
    }

    fn params(&self, host: &str) -> HostParams {
        match &self.inner.ssh_config {
            Some(ssh_config) => ssh_config.query(host),
            None => HostParams::default(),
        }
    }

    /// Session settings for one `--host` value, `address[:port]`.
    ///
    /// The username comes from `--username`, the ssh config `User`, or the
    /// local user, in that order.
    pub fn session_config(&self, addr: &str) -> JunosClientResult<SessionConfig> {
        let (address, port) = match addr.rsplit_once(':') {
            Some((address, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    JunosClientError::new(format!("Invalid port in host address '{}'", addr))
                })?;
                (address, Some(port))
            }
            None => (addr, None),
        };
        let params = self.params(address);
        let username = match (&self.inner.username, params.user.as_deref()) {
            (Some(user), _) => user.clone(),
            (None, Some(user)) => user.to_string(),
            (None, None) => whoami::username(),
        };
        let mut config = SessionConfig::new(address, &username)
            .with_transport(self.inner.transport)
            .with_rpc_timeout(self.inner.rpc_timeout)
            .with_attempts(self.inner.attempts);
        if let Some(timeout) = params.connect_timeout {
            config = config.with_connect_timeout(timeout);
        }
        if let Some(port) = port.or(self.inner.port).or(params.port) {
            config = config.with_port(port);
        }
        if let Some(password) = &self.inner.password {
            config = config.with_password(password);
        } else if params.identity_file.is_none() {
            debug!(target: address, "No password or identity file, trying the ssh agent");
        }
        Ok(config)
    }
}

fn read_ssh_config(path: &Path) -> Option<SshConfig> {
    let file = File::open(path)
        .map_err(|err| debug!("No ssh config at '{}': {}", path.display(), err))
        .ok()?;
    SshConfig::default()
        .parse(&mut BufReader::new(file), ParseRule::ALLOW_UNKNOWN_FIELDS)
        .map_err(|err| warn!("Ignoring ssh config '{}': {}", path.display(), err))
        .ok()
}

/// Connects with the `~/.ssh/config` settings of each host. Without a
/// password the keys of the ssh agent are tried in turn.
#[derive(Debug, Clone)]
pub struct CliConnector {
    cfg: CliConfig,
}

impl CliConnector {
    pub fn new(cfg: CliConfig) -> CliConnector {
        CliConnector { cfg }
    }

    async fn connect_ssh(
        &self,
        config: &SessionConfig,
        params: &HostParams,
    ) -> JunosClientResult<AsyncSession<TcpStream>> {
        let address = params.host_name.as_deref().unwrap_or(&config.host);
        let stream = timeout(
            config.connect_timeout,
            TcpStream::connect((address, config.port())),
        )
        .await
        .map_err(|e| JunosClientError::new(format!("connection to {}: {}", address, e)))??;
        let mut configuration = SessionConfiguration::new();
        configuration.set_timeout(config.connect_timeout.as_millis() as u32);
        if let Some(compress) = &params.compression {
            debug!(target: &config.host, "Setting compression: {}", compress);
            configuration.set_compress(*compress);
        }
        if let (Some(true), Some(interval)) = (params.tcp_keep_alive, params.server_alive_interval)
        {
            let interval = interval.as_secs() as u32;
            debug!(target: &config.host, "Setting keepalive interval: {} seconds", interval);
            configuration.set_keepalive(true, interval);
        }
        let mut session = AsyncSession::new(stream, configuration)?;
        configure_session(&mut session, params).await?;
        session.handshake().await?;

        if let Some(password) = &config.password {
            session.userauth_password(&config.user, password).await?;
            return Ok(session);
        }

        let mut agent = session.agent()?;
        agent.connect().await?;
        agent.list_identities().await?;
        for identity in agent.identities().map_err(async_ssh2_lite::Error::from)? {
            match agent.userauth(&config.user, &identity).await {
                Ok(()) => {
                    debug!(target: &config.host, "Authenticated with key '{}'", identity.comment());
                    break;
                }
                Err(err) => debug!(
                    target: &config.host,
                    "Key '{}' rejected: {}",
                    identity.comment(),
                    err
                ),
            }
        }
        match session.authenticated() {
            true => Ok(session),
            false => Err(JunosClientError::new(format!(
                "No password given and the ssh agent has no key accepted for {}",
                config.key()
            ))),
        }
    }
}

#[async_trait]
impl Connector for CliConnector {
    async fn connect(&self, config: &SessionConfig) -> JunosClientResult<Connection> {
        let params = self.cfg.params(&config.host);
        let session = self.connect_ssh(config, &params).await?;
        let transport = SshTransport::new(session).await?;
        let mut connection = Connection::new(transport).await?;
        connection.set_rpc_timeout(config.rpc_timeout);
        debug!(
            target: &config.host,
            "Started NETCONF session with session-id: {}",
            connection.session_id()
        );
        Ok(connection)
    }
}

/// Applies the `KexAlgorithms`, `HostKeyAlgorithms`, `Ciphers` and `MACs`
/// preferences of the host.
async fn configure_session(
    session: &mut AsyncSession<TcpStream>,
    params: &HostParams,
) -> JunosClientResult<()> {
    let prefs = [
        (MethodType::Kex, &params.kex_algorithms),
        (MethodType::HostKey, &params.host_key_algorithms),
        (MethodType::CryptCs, &params.ciphers),
        (MethodType::CryptSc, &params.ciphers),
        (MethodType::MacCs, &params.mac),
        (MethodType::MacSc, &params.mac),
    ];
    for (method, algorithms) in prefs {
        if let Some(algorithms) = algorithms {
            session.method_pref(method, &algorithms.join(",")).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::cli;
    use pretty_assertions::assert_eq;

    fn cli_config(args: &[&str]) -> CliConfig {
        let mut matches = cli().try_get_matches_from(args).unwrap();
        let (_, sub) = matches.remove_subcommand().unwrap();
        CliConfig::new(sub).unwrap()
    }

    #[test]
    fn test_session_config_from_args() {
        let cfg = cli_config(&[
            "junos",
            "--host",
            "r1,r2:2830",
            "--username",
            "lab",
            "--password",
            "secret",
            "--timeout",
            "60",
            "facts",
        ]);
        assert_eq!(cfg.inner.addresses, vec!["r1", "r2:2830"]);

        let r1 = cfg.session_config("r1").unwrap();
        assert_eq!(r1.key(), "lab@r1:830");
        assert_eq!(r1.rpc_timeout, Duration::from_secs(60));
        assert_eq!(r1.password.as_deref(), Some("secret"));
        assert_eq!(cfg.session_config("r2:2830").unwrap().port(), 2830);
        assert!(cfg.session_config("r3:x").is_err());
    }

    #[test]
    fn test_ssh_transport_port() {
        let cfg = cli_config(&[
            "junos", "--host", "r1", "--username", "lab", "--transport", "ssh", "facts",
        ]);
        let r1 = cfg.session_config("r1").unwrap();
        assert_eq!(r1.transport, TransportKind::Ssh);
        assert_eq!(r1.port(), 22);
        assert_eq!(r1.password, None);
    }
}

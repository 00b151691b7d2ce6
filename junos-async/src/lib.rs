//! # junos-async
//!
//! ```toml
//! junos-async = "^0.1.0"
//! ```
//!
//! Async NETCONF client for Junos devices: sessions, RPC dispatch,
//! configuration transactions, file transfer and snapshot checks.
//!
//! ## Example
//!
//! ```rust,no_run
//! use junos_async::configuration::{ConfigMode, LoadAction, LoadSource, Transaction};
//! use junos_async::session::{SessionConfig, SessionManager, SshConnector};
//!
//! # async fn example() -> junos_async::error::JunosClientResult<()> {
//! let manager = SessionManager::new(SshConnector);
//! let config = SessionConfig::new("192.0.2.1", "admin").with_password("secret");
//! let session = manager.acquire(&config).await?;
//! let mut session = session.lock().await;
//!
//! let mut tx = Transaction::open(&mut session, ConfigMode::Private, None).await?;
//! tx.load(
//!     LoadAction::Set,
//!     None,
//!     LoadSource::Lines(vec!["set system host-name lab-router".to_string()]),
//!     None,
//! )
//! .await?;
//! if let Some(diff) = tx.diff().await? {
//!     println!("{}", diff);
//!     tx.commit(&Default::default()).await?;
//! }
//! tx.close().await?;
//! # Ok(())
//! # }
//! ```
//!
pub mod checksum;
pub mod command;
pub mod configuration;
pub mod connection;
pub mod error;
pub mod facts;
pub mod file_copy;
pub mod framer;
pub mod jsnapy;
pub mod message;
pub mod output;
pub mod ping;
pub mod pmtud;
pub mod rpc;
pub mod session;
pub mod snapshot;
pub mod software;
pub mod system;
pub mod transfer;
pub mod transport;
pub mod xml;

#[cfg(test)]
pub(crate) mod testing;

pub const NETCONF_URN: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
pub const NETCONF_BASE_10_CAP: &str = "urn:ietf:params:netconf:base:1.0";
pub const NETCONF_BASE_11_CAP: &str = "urn:ietf:params:netconf:base:1.1";
pub const NETCONF_DEFAULT_PORT: u16 = 830;
pub const SSH_DEFAULT_PORT: u16 = 22;

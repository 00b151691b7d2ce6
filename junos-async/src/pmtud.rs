//! Path MTU discovery with do-not-fragment pings.
use crate::error::{JunosClientError, JunosClientResult};
use crate::output::TaskResult;
use crate::ping::{ping, PingOptions};
use crate::session::DeviceSession;
use log::debug;
use serde_derive::Serialize;

/// RFC 791 minimum.
pub const INET_MIN_MTU_SIZE: u32 = 68;
/// Largest IP packet Junos ping accepts.
pub const INET_MAX_MTU_SIZE: u32 = 65496;
const INET_AND_ICMP_HEADER_SIZE: u32 = 20 + 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtudOptions {
    pub dest: String,
    pub max_size: u32,
    /// Search window below `max_size`, zero or a power of two up to 65536.
    pub max_range: u32,
    pub source: Option<String>,
    pub interface: Option<String>,
    pub routing_instance: Option<String>,
}

impl PmtudOptions {
    pub fn new(dest: &str) -> PmtudOptions {
        PmtudOptions {
            dest: dest.to_string(),
            max_size: 1500,
            max_range: 512,
            source: None,
            interface: None,
            routing_instance: None,
        }
    }

    pub fn validate(&self) -> JunosClientResult<()> {
        if !(INET_MIN_MTU_SIZE..=INET_MAX_MTU_SIZE).contains(&self.max_size) {
            return Err(JunosClientError::new(format!(
                "The value of the max_size option({}) must be between {} and {}.",
                self.max_size, INET_MIN_MTU_SIZE, INET_MAX_MTU_SIZE
            )));
        }
        if self.max_range != 0 && (!self.max_range.is_power_of_two() || self.max_range < 2 || self.max_range > 65536) {
            return Err(JunosClientError::new(format!(
                "The value of the max_range option({}) must be 0 or a power of two between 2 and 65536.",
                self.max_range
            )));
        }
        Ok(())
    }

    fn ping_options(&self, mtu: u32) -> PingOptions {
        PingOptions {
            count: 3,
            inet: true,
            do_not_fragment: true,
            size: Some(mtu - INET_AND_ICMP_HEADER_SIZE),
            source: self.source.clone(),
            interface: self.interface.clone(),
            routing_instance: self.routing_instance.clone(),
            acceptable_percent_loss: 100,
            ..PingOptions::new(&self.dest)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PmtudResult {
    pub msg: String,
    pub changed: bool,
    pub failed: bool,
    pub host: String,
    pub inet_mtu: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_instance: Option<String>,
}

impl TaskResult for PmtudResult {
    fn failed(&self) -> bool {
        self.failed
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

pub async fn run(session: &mut DeviceSession, options: &PmtudOptions) -> PmtudResult {
    let mut result = PmtudResult {
        failed: true,
        host: options.dest.clone(),
        source: options.source.clone(),
        interface: options.interface.clone(),
        routing_instance: options.routing_instance.clone(),
        ..Default::default()
    };
    if let Err(err) = options.validate() {
        result.msg = err.to_string();
        return result;
    }

    debug!(target: session.host(), "Verifying basic connectivity.");
    if ping(session, &options.ping_options(INET_MIN_MTU_SIZE)).await.loss() == 100 {
        result.msg = format!("Basic connectivity to {} failed.", options.dest);
        return result;
    }

    let max_size = options.max_size;
    let min_test_size = max_size
        .saturating_sub(options.max_range.saturating_sub(1))
        .max(INET_MIN_MTU_SIZE);
    let mut test_size = max_size;
    let mut step = options.max_range;
    loop {
        test_size = test_size.clamp(INET_MIN_MTU_SIZE, max_size);
        debug!(target: session.host(), "Probing with size: {}", test_size);
        step = if step >= 2 { step / 2 } else { 0 };
        let loss = ping(session, &options.ping_options(test_size)).await.loss();
        if loss < 100 {
            result.inet_mtu = test_size;
            if test_size == max_size {
                break;
            }
            test_size += step;
        } else {
            test_size = test_size.saturating_sub(step);
        }
        if step < 1 {
            break;
        }
    }

    if result.inet_mtu == 0 {
        result.msg = format!(
            "The MTU of the path to {} is less than the minimum tested size({}). Try decreasing max_size({}) or increasing max_range({}).",
            options.dest, min_test_size, max_size, options.max_range
        );
        return result;
    }
    result.failed = false;
    result.msg = format!("Path MTU to {} is {}.", options.dest, result.inet_mtu);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ping::tests::ping_reply;
    use crate::session::SessionConfig;
    use crate::testing::{connection, requests};
    use pretty_assertions::assert_eq;
    use regex::Regex;

    /// Answers every ping the device would send for a path MTU of `mtu`.
    async fn search(mtu: u32, options: &PmtudOptions) -> (PmtudResult, Vec<u32>) {
        // replay the search to script the replies in order
        let mut replies = vec![ping_reply(0)];
        let mut test_size = options.max_size;
        let mut step = options.max_range;
        loop {
            test_size = test_size.clamp(INET_MIN_MTU_SIZE, options.max_size);
            step = if step >= 2 { step / 2 } else { 0 };
            let passes = test_size <= mtu;
            replies.push(ping_reply(if passes { 0 } else { 100 }));
            if passes {
                if test_size == options.max_size {
                    break;
                }
                test_size += step;
            } else {
                test_size = test_size.saturating_sub(step);
            }
            if step < 1 {
                break;
            }
        }
        let (conn, sent) = connection(replies).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let result = run(&mut session, options).await;
        let size = Regex::new(r"<size>(\d+)</size>").unwrap();
        let sizes = requests(&sent)
            .iter()
            .filter_map(|rpc| size.captures(rpc).map(|c| c[1].parse::<u32>().unwrap() + 28))
            .collect();
        (result, sizes)
    }

    #[tokio::test]
    async fn test_finds_path_mtu() {
        let (result, sizes) = search(1400, &PmtudOptions::new("192.0.2.9")).await;
        assert!(!result.failed);
        assert_eq!(result.inet_mtu, 1400);
        assert_eq!(sizes[0], 68);
        assert_eq!(sizes[1], 1500);
        assert_eq!(result.msg, "Path MTU to 192.0.2.9 is 1400.");
    }

    #[tokio::test]
    async fn test_full_size_passes_first_ping() {
        let (result, sizes) = search(9000, &PmtudOptions::new("192.0.2.9")).await;
        assert_eq!(result.inet_mtu, 1500);
        assert_eq!(sizes, vec![68, 1500]);
    }

    #[tokio::test]
    async fn test_mtu_below_window() {
        let options = PmtudOptions {
            max_range: 16,
            ..PmtudOptions::new("192.0.2.9")
        };
        let (result, _) = search(1000, &options).await;
        assert!(result.failed);
        assert_eq!(
            result.msg,
            "The MTU of the path to 192.0.2.9 is less than the minimum tested size(1485). Try decreasing max_size(1500) or increasing max_range(16)."
        );
    }

    #[tokio::test]
    async fn test_no_connectivity() {
        let (conn, _) = connection(vec![ping_reply(100)]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let result = run(&mut session, &PmtudOptions::new("192.0.2.9")).await;
        assert!(result.failed);
        assert_eq!(result.msg, "Basic connectivity to 192.0.2.9 failed.");
    }

    #[test]
    fn test_validation() {
        let options = PmtudOptions {
            max_size: 65500,
            ..PmtudOptions::new("192.0.2.9")
        };
        assert_eq!(
            options.validate().unwrap_err().to_string(),
            "The value of the max_size option(65500) must be between 68 and 65496."
        );
        let options = PmtudOptions {
            max_range: 100,
            ..PmtudOptions::new("192.0.2.9")
        };
        assert!(options.validate().is_err());
    }
}

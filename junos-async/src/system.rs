//! The `system` task: reboot, power off, halt or zeroize a device.
use crate::error::{JunosClientError, JunosClientResult};
use crate::message::IgnoreWarning;
use crate::output::TaskResult;
use crate::session::DeviceSession;
use crate::xml::XmlNode;
use core::fmt;
use core::str::FromStr;
use log::{info, warn};
use serde_derive::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAction {
    Reboot,
    Shutdown,
    Halt,
    Zeroize,
}

impl SystemAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemAction::Reboot => "reboot",
            SystemAction::Shutdown => "shutdown",
            SystemAction::Halt => "halt",
            SystemAction::Zeroize => "zeroize",
        }
    }

    fn rpc_name(&self, vmhost: bool) -> &'static str {
        match (self, vmhost) {
            (SystemAction::Reboot, false) => "request-reboot",
            (SystemAction::Reboot, true) => "request-vmhost-reboot",
            (SystemAction::Shutdown, false) => "request-power-off",
            (SystemAction::Shutdown, true) => "request-vmhost-poweroff",
            (SystemAction::Halt, false) => "request-halt",
            (SystemAction::Halt, true) => "request-vmhost-halt",
            (SystemAction::Zeroize, _) => "request-system-zeroize",
        }
    }
}

impl fmt::Display for SystemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemAction {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reboot" => Ok(SystemAction::Reboot),
            "shutdown" | "off" | "power-off" | "power_off" => Ok(SystemAction::Shutdown),
            "halt" => Ok(SystemAction::Halt),
            "zeroize" => Ok(SystemAction::Zeroize),
            _ => Err(JunosClientError::new(format!(
                "The value of the action option ({}) is invalid. Must be one of: reboot, shutdown, off, power-off, power_off, halt, zeroize",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemOptions {
    pub action: SystemAction,
    /// Minutes from now.
    pub in_min: Option<u32>,
    /// Junos time string, e.g. `now` or `yymmddhhmm`.
    pub at: Option<String>,
    pub all_re: bool,
    pub other_re: bool,
    pub media: bool,
    pub vmhost: bool,
    pub member_id: Vec<String>,
    pub check_mode: bool,
}

impl SystemOptions {
    pub fn new(action: SystemAction) -> SystemOptions {
        SystemOptions {
            action,
            in_min: None,
            at: None,
            all_re: true,
            other_re: false,
            media: false,
            vmhost: false,
            member_id: Vec::new(),
            check_mode: false,
        }
    }

    pub fn validate(&self) -> JunosClientResult<()> {
        if self.in_min.is_some() && self.at.is_some() {
            return Err(JunosClientError::new(
                "parameters are mutually exclusive: in_min|at".to_string(),
            ));
        }
        if self.all_re && self.other_re {
            return Err(JunosClientError::new(
                "parameters are mutually exclusive: all_re|other_re".to_string(),
            ));
        }
        if self.media && self.action != SystemAction::Zeroize {
            return Err(JunosClientError::new(format!(
                "The media option ({}) is only valid with the zeroize action.",
                self.media
            )));
        }
        if self.action == SystemAction::Zeroize && (self.in_min.is_some() || self.at.is_some()) {
            return Err(JunosClientError::new(
                "The in_min and at options are not valid with the zeroize action.".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_xml(&self) -> XmlNode {
        let mut rpc = XmlNode::new(self.action.rpc_name(self.vmhost));
        if self.action == SystemAction::Zeroize {
            if self.media {
                rpc.push(XmlNode::new("media"));
            }
            return rpc;
        }
        if let Some(minutes) = self.in_min {
            rpc.push(XmlNode::with_text("in", minutes.to_string()));
        }
        if let Some(at) = &self.at {
            rpc.push(XmlNode::with_text("at", at.as_str()));
        }
        if self.all_re {
            rpc.push(XmlNode::new("both-routing-engines"));
        } else if self.other_re {
            rpc.push(XmlNode::new("other-routing-engine"));
        }
        for member in &self.member_id {
            rpc.push(XmlNode::with_text("member", member.as_str()));
        }
        rpc
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemResult {
    pub msg: String,
    pub action: String,
    pub changed: bool,
    pub failed: bool,
    pub check_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reboot_message: Option<String>,
}

impl TaskResult for SystemResult {
    fn failed(&self) -> bool {
        self.failed
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

/// Sends the action RPC and returns the device's status message. A session
/// dropped by the device while acting counts as success.
pub async fn request(
    session: &mut DeviceSession,
    options: &SystemOptions,
) -> JunosClientResult<Option<String>> {
    let rpc = options.to_xml();
    match session.rpc(rpc, &IgnoreWarning::Always).await {
        Ok(reply) => Ok(reply
            .body()
            .findtext("//request-reboot-status")
            .or_else(|| reply.body().findtext("//output"))
            .map(|text| text.to_string())),
        Err(err) if err.is_connection_error() => {
            warn!(target: session.host(), "Session lost during {}: {}", options.action, err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub async fn run(session: &mut DeviceSession, options: &SystemOptions) -> SystemResult {
    let mut result = SystemResult {
        action: options.action.to_string(),
        check_mode: options.check_mode,
        failed: true,
        ..Default::default()
    };
    if let Err(err) = options.validate() {
        result.msg = err.to_string();
        return result;
    }
    if !options.check_mode {
        match request(session, options).await {
            Ok(message) => result.reboot_message = message,
            Err(err) => {
                result.msg = format!("Unable to {}: {}", options.action, err);
                return result;
            }
        }
    }
    info!(target: session.host(), "{} successfully initiated.", options.action);
    result.msg = format!("{} successfully initiated.", options.action);
    result.changed = true;
    result.failed = false;
    result
}

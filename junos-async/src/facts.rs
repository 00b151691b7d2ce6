//! Device facts from `get-software-information`.
use crate::error::{JunosClientError, JunosClientResult};
use crate::message::IgnoreWarning;
use crate::output::TaskResult;
use crate::session::DeviceSession;
use crate::xml::XmlNode;
use log::debug;
use regex::Regex;
use serde_derive::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facts {
    pub hostname: Option<String>,
    pub model: Option<String>,
    /// Version of the routing engine the session is connected to.
    pub version: Option<String>,
    pub re_name: Option<String>,
    /// Version per routing engine, a single `re0` entry on single-RE devices.
    pub junos_info: BTreeMap<String, String>,
    pub vmhost: bool,
}

fn version_of(info: &XmlNode) -> Option<String> {
    if let Some(version) = info.findtext("junos-version") {
        return Some(version.to_string());
    }
    // older releases only carry "JUNOS Base OS boot [18.2R1.9]"
    let comment = info
        .findtext("package-information[name='junos']/comment")
        .or_else(|| info.findtext("package-information/comment"))?;
    let bracketed = Regex::new(r"\[([^\]]+)\]").ok()?;
    bracketed
        .captures(comment)
        .map(|captures| captures[1].to_string())
}

impl Facts {
    pub fn from_software_information(reply: &XmlNode) -> JunosClientResult<Facts> {
        let mut facts = Facts::default();
        let items = reply.find_all("//multi-routing-engine-item");
        if items.is_empty() {
            let info = reply.find("//software-information").ok_or_else(|| {
                JunosClientError::new("No software-information in the reply".to_string())
            })?;
            facts.fill(info);
            if let Some(version) = &facts.version {
                facts.junos_info.insert("re0".to_string(), version.clone());
            }
            return Ok(facts);
        }
        for item in items {
            let Some(info) = item.find("software-information") else {
                continue;
            };
            let re_name = item.findtext("re-name").unwrap_or("re0").to_string();
            if facts.hostname.is_none() {
                facts.fill(info);
                facts.re_name = Some(re_name.clone());
            }
            if let Some(version) = version_of(info) {
                facts.junos_info.insert(re_name, version);
            }
        }
        Ok(facts)
    }

    fn fill(&mut self, info: &XmlNode) {
        self.hostname = info.findtext("host-name").map(|s| s.to_string());
        self.model = info
            .findtext("product-model")
            .map(|s| s.to_uppercase());
        self.version = version_of(info);
        self.vmhost = info.find("vm-host-information").is_some()
            || self
                .model
                .as_deref()
                .map(|model| model.contains("VMHOST"))
                .unwrap_or(false);
    }
}

pub async fn gather(session: &mut DeviceSession) -> JunosClientResult<Facts> {
    let rpc = XmlNode::new("get-software-information");
    let reply = session.rpc(rpc, &IgnoreWarning::Always).await?;
    let facts = Facts::from_software_information(reply.body())?;
    debug!(target: session.host(), "Facts gathered: {:?}", facts);
    Ok(facts)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FactsResult {
    pub msg: String,
    pub changed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<Facts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts_file: Option<PathBuf>,
}

impl TaskResult for FactsResult {
    fn failed(&self) -> bool {
        self.failed
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

/// Gathers facts, writing them to `<savedir>/<hostname>-facts.json` when
/// `savedir` is set.
pub async fn run(session: &mut DeviceSession, savedir: Option<&Path>) -> FactsResult {
    let facts = match gather(session).await {
        Ok(facts) => facts,
        Err(err) => {
            return FactsResult {
                msg: format!("Unable to gather facts: {}", err),
                failed: true,
                ..Default::default()
            }
        }
    };
    let mut result = FactsResult {
        msg: "Facts have been successfully gathered.".to_string(),
        ..Default::default()
    };
    if let Some(dir) = savedir {
        let name = facts.hostname.as_deref().unwrap_or(session.host());
        let path = dir.join(format!("{}-facts.json", name));
        let written = match serde_json::to_vec_pretty(&facts) {
            Ok(json) => tokio::fs::write(&path, json).await.map_err(JunosClientError::from),
            Err(err) => Err(err.into()),
        };
        if let Err(err) = written {
            result.msg = format!("Unable to save facts to {}: {}", path.display(), err);
            result.failed = true;
        } else {
            result.facts_file = Some(path);
        }
    }
    result.facts = Some(facts);
    result
}

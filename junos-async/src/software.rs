//! The `software` task: install a Junos package when the running version
//! differs from the target.
use crate::checksum::ChecksumAlgorithm;
use crate::error::{JunosClientError, JunosClientResult};
use crate::facts::{gather, Facts};
use crate::message::IgnoreWarning;
use crate::output::TaskResult;
use crate::session::DeviceSession;
use crate::system::{self, SystemAction, SystemOptions};
use crate::transfer::{transfer, Direction, FileTransport, TransferJob};
use crate::xml::XmlNode;
use log::{debug, info};
use regex::Regex;
use serde_derive::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name prefixes of Junos software packages.
pub const JUNOS_PACKAGE_PREFIXES: [&str; 8] = [
    "jbundle",
    "jinstall",
    "junos-install",
    "junos-srx",
    "junos-vmhost-install",
    "junos-vrr",
    "vmx-bundle",
    "junos-arm",
];

pub const DEFAULT_REMOTE_DIR: &str = "/var/tmp";

/// Version embedded in a Junos package file name, e.g. `21.4R3.15` from
/// `junos-install-mx-x86-64-21.4R3.15.tgz`. `None` for other packages.
pub fn parse_version_from_filename(filename: &str) -> Option<String> {
    if !JUNOS_PACKAGE_PREFIXES
        .iter()
        .any(|prefix| filename.starts_with(prefix))
    {
        return None;
    }
    let version = Regex::new(r"-(\d{2}\..*\d).*").ok()?;
    version
        .captures(filename)
        .map(|captures| captures[1].to_string())
}

#[derive(Debug, Clone)]
pub struct SoftwareOptions {
    pub local_package: Option<PathBuf>,
    /// Path on the device or a URL the device fetches itself.
    pub remote_package: Option<String>,
    pub version: Option<String>,
    pub no_copy: bool,
    pub reboot: bool,
    pub reboot_pause: Duration,
    pub validate: bool,
    pub cleanfs: bool,
    pub all_re: bool,
    pub member_id: Vec<String>,
    pub vmhost: bool,
    pub issu: bool,
    pub nssu: bool,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub install_timeout: Duration,
    pub check_mode: bool,
}

impl Default for SoftwareOptions {
    fn default() -> SoftwareOptions {
        SoftwareOptions {
            local_package: None,
            remote_package: None,
            version: None,
            no_copy: false,
            reboot: true,
            reboot_pause: Duration::from_secs(10),
            validate: false,
            cleanfs: true,
            all_re: true,
            member_id: Vec::new(),
            vmhost: false,
            issu: false,
            nssu: false,
            checksum_algorithm: ChecksumAlgorithm::Md5,
            install_timeout: Duration::from_secs(1800),
            check_mode: false,
        }
    }
}

/// Where the package comes from and where it goes on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Plan {
    url: Option<String>,
    remote_dir: String,
    filename: String,
    local: Option<PathBuf>,
    no_copy: bool,
    cleanfs: bool,
    version: Option<String>,
}

impl Plan {
    fn package(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("{}/{}", self.remote_dir, self.filename),
        }
    }
}

impl SoftwareOptions {
    fn plan(&self) -> JunosClientResult<Plan> {
        if self.issu && self.nssu {
            return Err(JunosClientError::new(
                "parameters are mutually exclusive: issu|nssu".to_string(),
            ));
        }
        if self.local_package.is_none() && self.remote_package.is_none() {
            return Err(JunosClientError::new(
                "one of the following is required: local_package, remote_package".to_string(),
            ));
        }
        let mut url = None;
        let mut remote_dir = DEFAULT_REMOTE_DIR.to_string();
        let mut filename = String::new();
        if let Some(remote) = &self.remote_package {
            if remote.contains("://") {
                url = Some(remote.clone());
                filename = remote.rsplit('/').next().unwrap_or_default().to_string();
            } else {
                let (dir, name) = remote.rsplit_once('/').unwrap_or(("", remote));
                remote_dir = dir.to_string();
                filename = name.to_string();
            }
        }
        if let Some(remote) = &self.remote_package {
            if url.is_some() && self.local_package.is_some() {
                return Err(JunosClientError::new(format!(
                    "The remote_package ({}) is a URL. The local_package option is not allowed.",
                    remote
                )));
            }
            if url.is_some() && self.no_copy {
                return Err(JunosClientError::new(format!(
                    "The remote_package ({}) is a URL. The no_copy option is not allowed.",
                    remote
                )));
            }
        }

        let mut no_copy = self.no_copy;
        let mut local_filename = None;
        if url.is_none() {
            if let Some(local) = &self.local_package {
                let name = local
                    .file_name()
                    .and_then(|name| name.to_str())
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        JunosClientError::new(format!(
                            "There is no filename component to the local_package ({}).",
                            local.display()
                        ))
                    })?;
                local_filename = Some(name.to_string());
            } else {
                no_copy = true;
            }
            if !no_copy {
                if let Some(local) = &self.local_package {
                    if !local.is_file() {
                        return Err(JunosClientError::new(format!(
                            "The local_package ({}) is not a valid file on the local machine.",
                            local.display()
                        )));
                    }
                }
            }
            if filename.is_empty() {
                filename = local_filename.clone().unwrap_or_default();
            }
            if let Some(local_filename) = &local_filename {
                if *local_filename != filename {
                    return Err(JunosClientError::new(format!(
                        "The filename of the remote_package ({}) must be the same as the filename of the local_package ({}).",
                        filename, local_filename
                    )));
                }
            }
        }

        let version = self
            .version
            .clone()
            .or_else(|| parse_version_from_filename(&filename));
        Ok(Plan {
            url,
            remote_dir,
            filename,
            local: self.local_package.clone(),
            no_copy,
            cleanfs: self.cleanfs && !no_copy,
            version,
        })
    }

    fn install_rpc(&self, package: &str) -> XmlNode {
        let name = if self.issu {
            "request-package-in-service-upgrade"
        } else if self.nssu {
            "request-package-nonstop-upgrade"
        } else if self.vmhost {
            "request-vmhost-package-add"
        } else {
            "request-package-add"
        };
        let mut rpc = XmlNode::new(name).child(XmlNode::with_text("package-name", package));
        if !self.issu && !self.nssu {
            rpc.push(XmlNode::new("no-copy"));
            if self.validate {
                rpc.push(XmlNode::new("validate"));
            } else {
                rpc.push(XmlNode::new("no-validate"));
            }
        }
        for member in &self.member_id {
            rpc.push(XmlNode::with_text("member", member.as_str()));
        }
        rpc
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SoftwareResult {
    pub msg: String,
    pub changed: bool,
    pub check_mode: bool,
    pub failed: bool,
}

impl TaskResult for SoftwareResult {
    fn failed(&self) -> bool {
        self.failed
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

/// Compares `target` with the running version, per routing engine when
/// `all_re` is set. Returns whether an install is needed plus a note for
/// every routing engine already running the target.
fn compare_versions(facts: &Facts, target: &str, all_re: bool) -> (bool, String) {
    let mut changed = false;
    let mut msg = String::new();
    let versions: Vec<(String, Option<String>)> = if all_re && !facts.junos_info.is_empty() {
        facts
            .junos_info
            .iter()
            .map(|(re, version)| (re.clone(), Some(version.clone())))
            .collect()
    } else {
        vec![(
            facts.re_name.clone().unwrap_or_else(|| "re0".to_string()),
            facts.version.clone(),
        )]
    };
    for (re, current) in versions {
        if current.as_deref() == Some(target) {
            msg.push_str(&format!(
                "Current version on {}: {} same as Targeted version: {}.\n",
                re,
                current.as_deref().unwrap_or_default(),
                target
            ));
        } else {
            debug!(
                "Current version on {}: {:?}. Target version: {}.",
                re, current, target
            );
            changed = true;
        }
    }
    (changed, msg)
}

async fn install(
    session: &mut DeviceSession,
    transport: Option<&mut (dyn FileTransport + '_)>,
    options: &SoftwareOptions,
    plan: &Plan,
) -> JunosClientResult<String> {
    if plan.cleanfs {
        debug!(target: session.host(), "Cleaning up the file system");
        session
            .rpc(XmlNode::new("request-system-storage-cleanup"), &IgnoreWarning::Always)
            .await?;
    }
    if let (false, None, Some(local)) = (plan.no_copy, &plan.url, &plan.local) {
        let transport = transport.ok_or_else(|| {
            JunosClientError::new("A file transport is required to copy the package".to_string())
        })?;
        let mut job = TransferJob::new(Direction::Put, local.clone(), &plan.package())
            .with_checksum(options.checksum_algorithm);
        transfer(session, transport, &mut job).await?;
        if !job.is_complete() {
            return Err(JunosClientError::new(format!(
                "Package copy failed. {}",
                job.status.message()
            )));
        }
        info!(target: session.host(), "{}", job.status.message());
    }

    let package = plan.package();
    let default_timeout = session.config().rpc_timeout;
    session.connection()?.set_rpc_timeout(options.install_timeout);
    let reply = session
        .rpc(options.install_rpc(&package), &IgnoreWarning::Always)
        .await;
    if let Ok(connection) = session.connection() {
        connection.set_rpc_timeout(default_timeout);
    }
    let reply = reply?;
    let output: Vec<&str> = reply
        .body()
        .find_all("//output")
        .into_iter()
        .map(|node| node.text.trim())
        .filter(|text| !text.is_empty())
        .collect();
    let response = output.join("\n");
    let status = reply.body().findtext("//package-result");
    if status.map(|s| s != "0").unwrap_or(false) {
        return Err(JunosClientError::new(response));
    }
    Ok(response)
}

/// Runs the task. `transport` is only used when a local package has to be
/// copied to the device.
pub async fn run(
    session: &mut DeviceSession,
    transport: Option<&mut (dyn FileTransport + '_)>,
    options: &SoftwareOptions,
) -> SoftwareResult {
    let mut result = SoftwareResult {
        check_mode: options.check_mode,
        failed: true,
        ..Default::default()
    };
    let plan = match options.plan() {
        Ok(plan) => plan,
        Err(err) => {
            result.msg = err.to_string();
            return result;
        }
    };
    debug!(target: session.host(), "New target version is: {:?}.", plan.version);

    match &plan.version {
        Some(target) => {
            let facts = match gather(session).await {
                Ok(facts) => facts,
                Err(err) => {
                    result.msg = format!("Unable to gather facts: {}", err);
                    return result;
                }
            };
            let (changed, msg) = compare_versions(&facts, target, options.all_re);
            result.changed = changed;
            result.msg = msg;
        }
        // not a Junos package, always install
        None => result.changed = true,
    }

    if result.changed && !options.check_mode {
        let package = plan
            .local
            .as_deref()
            .map(Path::display)
            .map(|p| p.to_string())
            .unwrap_or_else(|| plan.package());
        info!(target: session.host(), "Beginning installation of {}.", plan.filename);
        match install(session, transport, options, &plan).await {
            Ok(response) => {
                result.msg = format!(
                    "Package {} successfully installed. Response from device is: {}",
                    package, response
                );
            }
            Err(err) => {
                result.msg = format!("Installation failed. Error: {}", err);
                return result;
            }
        }

        if options.reboot {
            let reboot = SystemOptions {
                all_re: options.all_re,
                vmhost: options.vmhost,
                member_id: options.member_id.clone(),
                ..SystemOptions::new(SystemAction::Reboot)
            };
            match system::request(session, &reboot).await {
                Ok(Some(message)) => result.msg.push_str(&format!(
                    " Reboot successfully initiated. Reboot message: {}",
                    message
                )),
                Ok(None) => result.msg.push_str(" Reboot succeeded."),
                Err(err) => {
                    result.msg.push_str(&format!(" Reboot failed. Error: {}", err));
                    return result;
                }
            }
            if !options.reboot_pause.is_zero() {
                debug!(target: session.host(), "Sleeping for {} seconds", options.reboot_pause.as_secs());
                tokio::time::sleep(options.reboot_pause).await;
            }
        }
    }
    result.failed = false;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::tests::DUAL_RE;
    use crate::session::SessionConfig;
    use crate::testing::{connection, reply, requests, OK};
    use crate::transfer::tests::{checksum_reply, missing_file_reply, MemoryTransport};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_version_from_filename() {
        assert_eq!(
            parse_version_from_filename("junos-install-mx-x86-64-21.4R3.15.tgz").as_deref(),
            Some("21.4R3.15")
        );
        assert_eq!(
            parse_version_from_filename("junos-srxsme-18.2R1.9.tgz").as_deref(),
            Some("18.2R1.9")
        );
        assert_eq!(
            parse_version_from_filename("jinstall-ex-4200-12.3R12.4-domestic-signed.tgz")
                .as_deref(),
            Some("12.3R12.4")
        );
        assert_eq!(parse_version_from_filename("my-script-1.0.tgz"), None);
    }

    #[test]
    fn test_plan_validation() {
        let options = SoftwareOptions {
            remote_package: Some("https://files.example.net/junos-install-mx-x86-64-21.4R3.15.tgz".to_string()),
            no_copy: true,
            ..Default::default()
        };
        assert_eq!(
            options.plan().unwrap_err().to_string(),
            "The remote_package (https://files.example.net/junos-install-mx-x86-64-21.4R3.15.tgz) is a URL. The no_copy option is not allowed."
        );

        let options = SoftwareOptions {
            remote_package: Some("/var/tmp/junos-install-mx-x86-64-21.4R3.15.tgz".to_string()),
            ..Default::default()
        };
        let plan = options.plan().unwrap();
        assert!(plan.no_copy);
        assert!(!plan.cleanfs);
        assert_eq!(plan.version.as_deref(), Some("21.4R3.15"));
        assert_eq!(plan.package(), "/var/tmp/junos-install-mx-x86-64-21.4R3.15.tgz");
    }

    #[tokio::test]
    async fn test_same_version_is_unchanged() {
        let (conn, sent) = connection(vec![reply(DUAL_RE)]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let options = SoftwareOptions {
            remote_package: Some("/var/tmp/junos-install-mx-x86-64-21.4R3.15.tgz".to_string()),
            ..Default::default()
        };
        let result = run(&mut session, None, &options).await;
        assert!(!result.changed);
        assert!(!result.failed);
        assert_eq!(
            result.msg,
            "Current version on re0: 21.4R3.15 same as Targeted version: 21.4R3.15.\nCurrent version on re1: 21.4R3.15 same as Targeted version: 21.4R3.15.\n"
        );
        assert_eq!(requests(&sent).len(), 1);
    }

    #[tokio::test]
    async fn test_copy_install_and_reboot() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("junos-install-mx-x86-64-22.2R1.9.tgz");
        std::fs::write(&local, "abc").unwrap();
        let (conn, sent) = connection(vec![
            reply(DUAL_RE),
            reply(OK),
            missing_file_reply(),
            checksum_reply("900150983cd24fb0d6963f7d28e17f72"),
            reply("<package-result>0</package-result><output>Installing package '/var/tmp/junos-install-mx-x86-64-22.2R1.9.tgz' ...</output><output>Reboot the system to complete installation</output>"),
            reply("<request-reboot-results><request-reboot-status>Rebooting both routing engines</request-reboot-status></request-reboot-results>"),
        ])
        .await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let mut transport = MemoryTransport::default();
        let options = SoftwareOptions {
            local_package: Some(local.clone()),
            reboot_pause: Duration::ZERO,
            ..Default::default()
        };
        let result = run(&mut session, Some(&mut transport), &options).await;
        assert!(result.changed);
        assert!(!result.failed, "{}", result.msg);
        assert_eq!(
            result.msg,
            format!(
                "Package {} successfully installed. Response from device is: Installing package '/var/tmp/junos-install-mx-x86-64-22.2R1.9.tgz' ...\nReboot the system to complete installation Reboot successfully initiated. Reboot message: Rebooting both routing engines",
                local.display()
            )
        );
        assert!(transport
            .files
            .contains_key("/var/tmp/junos-install-mx-x86-64-22.2R1.9.tgz"));
        let sent = requests(&sent);
        assert!(sent[1].contains("<request-system-storage-cleanup/>"));
        assert!(sent[4].contains("<request-package-add><package-name>/var/tmp/junos-install-mx-x86-64-22.2R1.9.tgz</package-name><no-copy/><no-validate/></request-package-add>"));
    }

    #[tokio::test]
    async fn test_failed_unverified_copy_stops_install() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("junos-install-mx-x86-64-22.2R1.9.tgz");
        std::fs::write(&local, "abc").unwrap();
        let (conn, sent) = connection(vec![reply(DUAL_RE), reply(OK)]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let mut transport = MemoryTransport {
            fail: true,
            ..Default::default()
        };
        let options = SoftwareOptions {
            local_package: Some(local),
            checksum_algorithm: ChecksumAlgorithm::None,
            reboot_pause: Duration::ZERO,
            ..Default::default()
        };
        let result = run(&mut session, Some(&mut transport), &options).await;
        assert!(result.failed);
        assert_eq!(
            result.msg,
            "Installation failed. Error: Package copy failed. Error: scp: permission denied"
        );
        assert!(!requests(&sent)
            .iter()
            .any(|request| request.contains("<request-package-add>")));
    }

    #[tokio::test]
    async fn test_check_mode_reports_change() {
        let (conn, sent) = connection(vec![reply(DUAL_RE)]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let options = SoftwareOptions {
            remote_package: Some("/var/tmp/junos-install-mx-x86-64-22.2R1.9.tgz".to_string()),
            check_mode: true,
            ..Default::default()
        };
        let result = run(&mut session, None, &options).await;
        assert!(result.changed);
        assert!(result.check_mode);
        assert_eq!(requests(&sent).len(), 1);
    }
}

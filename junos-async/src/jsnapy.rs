//! The `jsnapy` task: take snapshots and evaluate snapshot tests.
use crate::error::{JunosClientError, JunosClientResult};
use crate::output::TaskResult;
use crate::session::DeviceSession;
use crate::snapshot::{capture, evaluate, AssertionResult, SnapshotStore, TestFile};
use core::str::FromStr;
use log::info;
use serde_derive::Serialize;
use std::path::PathBuf;

pub const PRE_TAG: &str = "PRE";
pub const POST_TAG: &str = "POST";
pub const SNAPCHECK_TAG: &str = "snap_temp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapAction {
    SnapPre,
    SnapPost,
    Snapcheck,
    Check,
}

impl SnapAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapAction::SnapPre => "snap_pre",
            SnapAction::SnapPost => "snap_post",
            SnapAction::Snapcheck => "snapcheck",
            SnapAction::Check => "check",
        }
    }
}

impl FromStr for SnapAction {
    type Err = JunosClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snap_pre" => Ok(SnapAction::SnapPre),
            "snap_post" => Ok(SnapAction::SnapPost),
            "snapcheck" => Ok(SnapAction::Snapcheck),
            "check" => Ok(SnapAction::Check),
            _ => Err(JunosClientError::new(format!(
                "The value of the action option ({}) is invalid. Must be one of: check, snapcheck, snap_pre, snap_post",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsnapyOptions {
    pub action: SnapAction,
    pub test_files: Vec<PathBuf>,
    /// Base directory for relative test file paths.
    pub dir: Option<PathBuf>,
    pub snapshot_dir: PathBuf,
}

impl JsnapyOptions {
    pub fn new(action: SnapAction, test_files: Vec<PathBuf>) -> JsnapyOptions {
        JsnapyOptions {
            action,
            test_files,
            dir: None,
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }

    fn test_paths(&self) -> Vec<PathBuf> {
        self.test_files
            .iter()
            .map(|file| match &self.dir {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JsnapyResult {
    pub msg: String,
    pub action: String,
    pub changed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_passed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_failed: Option<usize>,
    #[serde(rename = "passPercentage", skip_serializing_if = "Option::is_none")]
    pub pass_percentage: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub test_results: Vec<AssertionResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<PathBuf>,
}

impl TaskResult for JsnapyResult {
    fn failed(&self) -> bool {
        self.failed
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

impl JsnapyResult {
    /// Fills the totals from per assertion results. An assertion counts as
    /// passed only when it held for every item.
    fn summarize(&mut self, results: Vec<AssertionResult>) {
        let passed = results.iter().filter(|r| r.result).count();
        let failed = results.len() - passed;
        let percentage = if results.is_empty() { 0 } else { passed * 100 / results.len() };
        self.total_passed = Some(passed);
        self.total_failed = Some(failed);
        self.pass_percentage = Some(percentage);
        self.test_results = results;
        if failed == 0 {
            self.final_result = Some("Passed".to_string());
            self.msg = "Test Succeeded.".to_string();
        } else {
            self.final_result = Some("Failed".to_string());
            self.msg = format!("Test Failed: Passed {}, Failed {}", passed, failed);
            self.failed = true;
        }
    }
}

async fn execute(
    session: &mut DeviceSession,
    options: &JsnapyOptions,
    result: &mut JsnapyResult,
) -> JunosClientResult<()> {
    let store = SnapshotStore::new(&options.snapshot_dir, session.host());
    let mut tests = Vec::new();
    for path in options.test_paths() {
        tests.extend(TestFile::load(&path).await?.tests);
    }

    let mut evaluated = Vec::new();
    for test in &tests {
        match options.action {
            SnapAction::SnapPre | SnapAction::SnapPost => {
                let tag = if options.action == SnapAction::SnapPre { PRE_TAG } else { POST_TAG };
                let snapshot = capture(session, test).await?;
                result.snapshots.push(store.save(tag, test, &snapshot).await?);
            }
            SnapAction::Snapcheck => {
                let snapshot = capture(session, test).await?;
                result.snapshots.push(store.save(SNAPCHECK_TAG, test, &snapshot).await?);
                evaluated.extend(evaluate(test, None, &snapshot));
            }
            SnapAction::Check => {
                let pre = store.load(PRE_TAG, test).await?;
                let post = store.load(POST_TAG, test).await?;
                evaluated.extend(evaluate(test, Some(&pre), &post));
            }
        }
    }

    match options.action {
        SnapAction::SnapPre | SnapAction::SnapPost => {
            result.msg = format!("The {} action successfully executed.", options.action.as_str());
        }
        SnapAction::Snapcheck | SnapAction::Check => result.summarize(evaluated),
    }
    Ok(())
}

pub async fn run(session: &mut DeviceSession, options: &JsnapyOptions) -> JsnapyResult {
    let mut result = JsnapyResult {
        action: options.action.as_str().to_string(),
        ..Default::default()
    };
    if let Err(err) = execute(session, options, &mut result).await {
        result.failed = true;
        result.msg = format!("Error running the {} action: {}", options.action.as_str(), err);
        return result;
    }
    info!(target: session.host(), "{}", result.msg);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::snapshot::tests::{POST, PRE, TESTS};
    use crate::testing::{connection, reply, requests};
    use pretty_assertions::assert_eq;

    const INTERFACES_ONLY: &str = r#"
[[tests]]
name = "interfaces"
rpc = "get-interface-information"
iterate = "//physical-interface"
id = ["name"]

[[tests.assert]]
op = "is-equal"
xpath = "oper-status"
value = "up"

[[tests.assert]]
op = "list-not-less"
xpath = "name"
"#;

    fn options(dir: &tempfile::TempDir, action: SnapAction) -> JsnapyOptions {
        std::fs::write(dir.path().join("interfaces.toml"), INTERFACES_ONLY).unwrap();
        JsnapyOptions {
            dir: Some(dir.path().to_path_buf()),
            snapshot_dir: dir.path().join("snapshots"),
            ..JsnapyOptions::new(action, vec![PathBuf::from("interfaces.toml")])
        }
    }

    #[tokio::test]
    async fn test_pre_post_check() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, sent) = connection(vec![reply(PRE), reply(POST)]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);

        let pre = run(&mut session, &options(&dir, SnapAction::SnapPre)).await;
        assert_eq!(pre.msg, "The snap_pre action successfully executed.");
        assert_eq!(
            pre.snapshots,
            vec![dir
                .path()
                .join("snapshots/r1_PRE_get-interface-information.xml")]
        );
        run(&mut session, &options(&dir, SnapAction::SnapPost)).await;
        assert_eq!(requests(&sent).len(), 2);

        let check = run(&mut session, &options(&dir, SnapAction::Check)).await;
        assert!(check.failed);
        assert_eq!(check.final_result.as_deref(), Some("Failed"));
        assert_eq!(check.msg, "Test Failed: Passed 0, Failed 2");
        assert_eq!(check.pass_percentage, Some(0));
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["passPercentage"], 0);
    }

    #[tokio::test]
    async fn test_snapcheck_passes() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, _) = connection(vec![reply(PRE)]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        std::fs::write(
            dir.path().join("interfaces.toml"),
            TESTS.split("[[tests]]\nname = \"bgp\"").next().unwrap().replace(
                "[[tests.assert]]\nop = \"list-not-less\"\nxpath = \"name\"\n",
                "",
            ),
        )
        .unwrap();
        let options = JsnapyOptions {
            dir: Some(dir.path().to_path_buf()),
            snapshot_dir: dir.path().join("snapshots"),
            ..JsnapyOptions::new(SnapAction::Snapcheck, vec![PathBuf::from("interfaces.toml")])
        };
        let result = run(&mut session, &options).await;
        assert!(!result.failed, "{}", result.msg);
        assert_eq!(result.msg, "Test Succeeded.");
        assert_eq!(result.total_passed, Some(1));
        assert_eq!(result.pass_percentage, Some(100));
    }

    #[tokio::test]
    async fn test_missing_pre_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, _) = connection(vec![]).await;
        let mut session = DeviceSession::with_connection(SessionConfig::new("r1", "lab"), conn);
        let result = run(&mut session, &options(&dir, SnapAction::Check)).await;
        assert!(result.failed);
        assert!(result
            .msg
            .starts_with("Error running the check action: Unable to read the snapshot "));
    }
}

//! Task result shapes and local output files.
use crate::error::{JunosClientError, JunosClientResult};
use log::debug;
use serde_derive::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Implemented by every per-item task result.
pub trait TaskResult {
    fn failed(&self) -> bool;
    fn changed(&self) -> bool;
}

/// A single result, or a batch whose `failed` is set only when every item
/// failed.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TaskOutcome<T: serde::Serialize> {
    Single(T),
    Batch {
        results: Vec<T>,
        changed: bool,
        failed: bool,
    },
}

impl<T: serde::Serialize + TaskResult> TaskOutcome<T> {
    pub fn from_results(mut results: Vec<T>) -> TaskOutcome<T> {
        if results.len() == 1 {
            if let Some(result) = results.pop() {
                return TaskOutcome::Single(result);
            }
        }
        TaskOutcome::Batch {
            changed: results.iter().any(|r| r.changed()),
            failed: results.iter().all(|r| r.failed()),
            results,
        }
    }

    pub fn failed(&self) -> bool {
        match self {
            TaskOutcome::Single(result) => result.failed(),
            TaskOutcome::Batch { failed, .. } => *failed,
        }
    }

    pub fn results(&self) -> Vec<&T> {
        match self {
            TaskOutcome::Single(result) => vec![result],
            TaskOutcome::Batch { results, .. } => results.iter().collect(),
        }
    }

    pub fn to_json(&self) -> JunosClientResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Result of one RPC or CLI command execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<BTreeMap<String, String>>,
    pub changed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_lines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_output: Option<Value>,
}

impl ExecutionResult {
    /// A failed result for a task that stopped before running anything.
    pub fn failure(msg: impl Into<String>) -> ExecutionResult {
        ExecutionResult {
            msg: msg.into(),
            failed: true,
            ..Default::default()
        }
    }

    /// Fills the output keys, `parsed` only applies to xml and json formats.
    pub fn set_output(&mut self, text: &str, parsed: Option<Value>) {
        self.stdout = Some(text.to_string());
        self.stdout_lines = Some(text.lines().map(|line| line.to_string()).collect());
        self.parsed_output = parsed;
    }
}

impl TaskResult for ExecutionResult {
    fn failed(&self) -> bool {
        self.failed
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

/// Saves task output next to the controller.
///
/// With `dest` every output goes to one file: the first save truncates it,
/// later saves append. With `dest_dir` each output gets its own
/// `<host>_<name>.<format>` file, spaces and `|` in the name replaced by
/// `_`. Configuration output is saved as `<host>.<format>` and diffs as
/// `<host>.diff`, or into `diffs_file` when given.
#[derive(Debug, Default)]
pub struct OutputSink {
    host: String,
    dest: Option<PathBuf>,
    dest_dir: Option<PathBuf>,
    diffs_file: Option<PathBuf>,
    dest_written: bool,
}

impl OutputSink {
    pub fn new(
        host: &str,
        dest: Option<PathBuf>,
        dest_dir: Option<PathBuf>,
    ) -> JunosClientResult<OutputSink> {
        if dest.is_some() && dest_dir.is_some() {
            return Err(JunosClientError::new(
                "parameters are mutually exclusive: dest|dest_dir".to_string(),
            ));
        }
        Ok(OutputSink {
            host: host.to_string(),
            dest,
            dest_dir,
            diffs_file: None,
            dest_written: false,
        })
    }

    pub fn with_diffs_file(mut self, diffs_file: Option<PathBuf>) -> OutputSink {
        self.diffs_file = diffs_file;
        self
    }

    fn target(&mut self, name: &str, format: &str) -> Option<(PathBuf, bool)> {
        if name == "diff" {
            if let Some(file) = &self.diffs_file {
                return Some((file.clone(), false));
            }
            return self
                .dest_dir
                .as_ref()
                .map(|dir| (dir.join(format!("{}.diff", self.host)), false));
        }
        if let Some(dest) = &self.dest {
            let append = self.dest_written;
            self.dest_written = true;
            return Some((dest.clone(), append));
        }
        self.dest_dir.as_ref().map(|dir| {
            let name = name.replace([' ', '|'], "_");
            let name = if name == "config" {
                String::new()
            } else {
                format!("_{}", name)
            };
            (dir.join(format!("{}{}.{}", self.host, name, format)), false)
        })
    }

    /// Writes `text`, returning the path used or `None` when no
    /// destination was configured.
    pub async fn save(
        &mut self,
        name: &str,
        format: &str,
        text: &str,
    ) -> JunosClientResult<Option<PathBuf>> {
        let Some((path, append)) = self.target(name, format) else {
            return Ok(None);
        };
        let failed = |_| {
            JunosClientError::new(format!(
                "Unable to save output. Failed to open the {} file.",
                path.display()
            ))
        };
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await
            .map_err(failed)?;
        file.write_all(text.as_bytes()).await.map_err(failed)?;
        file.flush().await.map_err(failed)?;
        debug!("Output saved to: {}.", path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(failed: bool) -> ExecutionResult {
        ExecutionResult {
            msg: "The RPC executed successfully.".to_string(),
            rpc: Some("get-software-information".to_string()),
            format: "xml".to_string(),
            failed,
            ..Default::default()
        }
    }

    #[test]
    fn test_outcome_failed_only_when_all_failed() {
        let single = TaskOutcome::from_results(vec![result(true)]);
        assert!(matches!(single, TaskOutcome::Single(_)));
        assert!(single.failed());

        let batch = TaskOutcome::from_results(vec![result(true), result(false)]);
        assert!(!batch.failed());
        assert_eq!(batch.results().len(), 2);
        let json = batch.to_json().unwrap();
        assert_eq!(json["failed"], Value::Bool(false));
        assert_eq!(json["results"][0]["rpc"], "get-software-information");

        assert!(TaskOutcome::from_results(vec![result(true), result(true)]).failed());
    }

    #[test]
    fn test_set_output_splits_lines() {
        let mut result = result(false);
        result.set_output("line one\nline two", None);
        assert_eq!(
            result.stdout_lines,
            Some(vec!["line one".to_string(), "line two".to_string()])
        );
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("parsed_output").is_none());
        assert!(json.get("command").is_none());
    }

    #[test]
    fn test_dest_and_dest_dir_are_exclusive() {
        let err = OutputSink::new(
            "r1",
            Some(PathBuf::from("/tmp/a")),
            Some(PathBuf::from("/tmp")),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "parameters are mutually exclusive: dest|dest_dir"
        );
    }

    #[tokio::test]
    async fn test_dest_truncates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.txt");
        std::fs::write(&dest, "stale").unwrap();

        let mut sink = OutputSink::new("r1", Some(dest.clone()), None).unwrap();
        sink.save("get-software-information", "text", "first\n")
            .await
            .unwrap();
        sink.save("get-route-information", "text", "second\n")
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_dest_dir_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = OutputSink::new("r1", None, Some(dir.path().to_path_buf())).unwrap();
        let path = sink
            .save("show interfaces | match ge", "text", "ge-0/0/0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path, dir.path().join("r1_show_interfaces___match_ge.text"));

        let path = sink.save("config", "xml", "<configuration/>").await.unwrap();
        assert_eq!(path, Some(dir.path().join("r1.xml")));
        let path = sink.save("diff", "diff", "+ host-name r1;").await.unwrap();
        assert_eq!(path, Some(dir.path().join("r1.diff")));

        let mut none = OutputSink::new("r1", None, None).unwrap();
        assert_eq!(none.save("x", "text", "y").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unwritable_destination() {
        let mut sink =
            OutputSink::new("r1", Some(PathBuf::from("/nonexistent/dir/out")), None).unwrap();
        let err = sink.save("rpc", "text", "x").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to save output. Failed to open the /nonexistent/dir/out file."
        );
    }
}

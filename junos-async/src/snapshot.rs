//! Snapshot capture and comparison.
//!
//! Test files are TOML documents holding `[[tests]]` tables. Each test names
//! the RPC (or CLI command) whose XML reply is snapshotted, an `iterate`
//! path selecting the items to check, optional `id` paths identifying an
//! item across snapshots, and a list of `[[tests.assert]]` operations:
//!
//! ```toml
//! [[tests]]
//! name = "interfaces-up"
//! rpc = "get-interface-information"
//! args = { terse = true }
//! iterate = "//physical-interface"
//! id = ["name"]
//!
//! [[tests.assert]]
//! op = "is-equal"
//! xpath = "oper-status"
//! value = "up"
//! ```
//!
//! Single snapshot operations check one capture, the `no-diff`,
//! `list-not-less`, `list-not-more` and `delta` operations compare a pre and
//! a post capture.
use crate::error::{JunosClientError, JunosClientResult};
use crate::message::IgnoreWarning;
use crate::session::DeviceSession;
use crate::xml::XmlNode;
use core::fmt;
use log::debug;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operator {
    Exists,
    NotExists,
    IsEqual,
    NotEqual,
    Contains,
    IsIn,
    NotIn,
    IsGt,
    IsLt,
    InRange,
    AllSame,
    NoDiff,
    ListNotLess,
    ListNotMore,
    Delta,
}

impl Operator {
    /// Operations comparing a pre and a post snapshot.
    pub fn needs_pre(&self) -> bool {
        matches!(
            self,
            Operator::NoDiff | Operator::ListNotLess | Operator::ListNotMore | Operator::Delta
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Exists => "exists",
            Operator::NotExists => "not-exists",
            Operator::IsEqual => "is-equal",
            Operator::NotEqual => "not-equal",
            Operator::Contains => "contains",
            Operator::IsIn => "is-in",
            Operator::NotIn => "not-in",
            Operator::IsGt => "is-gt",
            Operator::IsLt => "is-lt",
            Operator::InRange => "in-range",
            Operator::AllSame => "all-same",
            Operator::NoDiff => "no-diff",
            Operator::ListNotLess => "list-not-less",
            Operator::ListNotMore => "list-not-more",
            Operator::Delta => "delta",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Assertion {
    pub op: Operator,
    pub xpath: String,
    #[serde(default)]
    pub value: Option<String>,
    /// Candidates for `is-in`/`not-in`, bounds for `in-range`.
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnapshotTest {
    pub name: String,
    #[serde(default)]
    pub rpc: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, toml::Value>,
    pub iterate: String,
    #[serde(default)]
    pub id: Vec<String>,
    #[serde(rename = "assert", default)]
    pub assertions: Vec<Assertion>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestFile {
    #[serde(default)]
    pub tests: Vec<SnapshotTest>,
}

impl TestFile {
    pub fn parse(text: &str) -> JunosClientResult<TestFile> {
        let file: TestFile = toml::from_str(text)?;
        for test in &file.tests {
            if test.rpc.is_some() == test.command.is_some() {
                return Err(JunosClientError::new(format!(
                    "Test {} must name exactly one of rpc or command.",
                    test.name
                )));
            }
            if test
                .assertions
                .iter()
                .any(|a| a.op == Operator::InRange && a.values.len() != 2)
            {
                return Err(JunosClientError::new(format!(
                    "Test {}: in-range needs two values.",
                    test.name
                )));
            }
        }
        Ok(file)
    }

    pub async fn load(path: &Path) -> JunosClientResult<TestFile> {
        let text = tokio::fs::read_to_string(path).await.map_err(|err| {
            JunosClientError::new(format!(
                "Unable to read the test file {}: {}",
                path.display(),
                err
            ))
        })?;
        TestFile::parse(&text)
    }
}

impl SnapshotTest {
    /// Name used in snapshot file names.
    pub fn source_name(&self) -> String {
        self.rpc
            .clone()
            .or_else(|| self.command.clone())
            .unwrap_or_default()
            .replace([' ', '|', '/'], "_")
    }

    fn request(&self) -> XmlNode {
        if let Some(command) = &self.command {
            return XmlNode::with_text("command", command.as_str()).attr("format", "xml");
        }
        let mut rpc = XmlNode::new(self.rpc.as_deref().unwrap_or_default().replace('_', "-"));
        for (key, value) in &self.args {
            let name = key.replace('_', "-");
            match value {
                toml::Value::Boolean(true) => rpc.push(XmlNode::new(name)),
                toml::Value::Boolean(false) => {}
                toml::Value::String(text) => rpc.push(XmlNode::with_text(name, text.as_str())),
                other => rpc.push(XmlNode::with_text(name, other.to_string())),
            }
        }
        rpc
    }

    fn items<'a>(&self, snapshot: &'a XmlNode) -> Vec<&'a XmlNode> {
        snapshot.find_all(&self.iterate)
    }

    /// Items keyed by their id, or by position when the test has no id.
    fn index<'a>(&self, snapshot: &'a XmlNode) -> BTreeMap<String, &'a XmlNode> {
        self.items(snapshot)
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let id = if self.id.is_empty() { i.to_string() } else { self.item_id(item) };
                (id, item)
            })
            .collect()
    }

    fn item_id(&self, item: &XmlNode) -> String {
        self.id
            .iter()
            .map(|path| item.findtext(path).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Snapshots stored as `<dir>/<host>_<tag>_<source>.xml`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    host: String,
}

impl SnapshotStore {
    pub fn new(dir: &Path, host: &str) -> SnapshotStore {
        SnapshotStore {
            dir: dir.to_path_buf(),
            host: host.to_string(),
        }
    }

    pub fn path(&self, tag: &str, test: &SnapshotTest) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.xml", self.host, tag, test.source_name()))
    }

    pub async fn save(&self, tag: &str, test: &SnapshotTest, snapshot: &XmlNode) -> JunosClientResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path(tag, test);
        tokio::fs::write(&path, snapshot.to_pretty_xml()).await?;
        debug!(target: &self.host, "Snapshot saved to {}", path.display());
        Ok(path)
    }

    pub async fn load(&self, tag: &str, test: &SnapshotTest) -> JunosClientResult<XmlNode> {
        let path = self.path(tag, test);
        let text = tokio::fs::read_to_string(&path).await.map_err(|err| {
            JunosClientError::new(format!(
                "Unable to read the snapshot {}: {}",
                path.display(),
                err
            ))
        })?;
        XmlNode::parse(&text)
    }
}

/// Runs the test's RPC and returns its payload.
pub async fn capture(session: &mut DeviceSession, test: &SnapshotTest) -> JunosClientResult<XmlNode> {
    let reply = session.rpc(test.request(), &IgnoreWarning::Always).await?;
    reply
        .content()
        .cloned()
        .ok_or_else(|| JunosClientError::new(format!("Empty reply for test {}", test.name)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionResult {
    pub test_name: String,
    pub op: Operator,
    pub xpath: String,
    pub passed: usize,
    pub failed: usize,
    pub result: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

fn number(text: &str) -> Option<f64> {
    text.trim().trim_end_matches('%').parse().ok()
}

/// Evaluates a single snapshot assertion against every item.
fn check_item(assertion: &Assertion, item: &XmlNode) -> Result<(), String> {
    let found = item.find(&assertion.xpath).is_some();
    let text = item.findtext(&assertion.xpath);
    let expected = assertion.value.as_deref().unwrap_or_default();
    let ok = match assertion.op {
        Operator::Exists => found,
        Operator::NotExists => !found,
        Operator::IsEqual => text == Some(expected),
        Operator::NotEqual => text != Some(expected),
        Operator::Contains => text.map(|t| t.contains(expected)).unwrap_or(false),
        Operator::IsIn => text
            .map(|t| assertion.values.iter().any(|v| v == t))
            .unwrap_or(false),
        Operator::NotIn => text
            .map(|t| !assertion.values.iter().any(|v| v == t))
            .unwrap_or(true),
        Operator::IsGt | Operator::IsLt => match (text.and_then(number), number(expected)) {
            (Some(actual), Some(limit)) if assertion.op == Operator::IsGt => actual > limit,
            (Some(actual), Some(limit)) => actual < limit,
            _ => false,
        },
        Operator::InRange => match (
            text.and_then(number),
            assertion.values.first().and_then(|v| number(v)),
            assertion.values.get(1).and_then(|v| number(v)),
        ) {
            (Some(actual), Some(low), Some(high)) => low <= actual && actual <= high,
            _ => false,
        },
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!(
            "{} {} failed: found {:?}",
            assertion.xpath,
            assertion.op,
            text.unwrap_or("nothing")
        ))
    }
}

fn summarize(test: &SnapshotTest, assertion: &Assertion, outcomes: Vec<Result<(), String>>) -> AssertionResult {
    let failures: Vec<String> = outcomes.into_iter().filter_map(|o| o.err()).collect();
    let failed = failures.len();
    AssertionResult {
        test_name: test.name.clone(),
        op: assertion.op,
        xpath: assertion.xpath.clone(),
        passed: 0,
        failed,
        result: failed == 0,
        failures,
    }
}

fn evaluate_single(test: &SnapshotTest, assertion: &Assertion, snapshot: &XmlNode) -> AssertionResult {
    let items = test.items(snapshot);
    let outcomes: Vec<Result<(), String>> = if assertion.op == Operator::AllSame {
        let values: Vec<&str> = items
            .iter()
            .map(|item| item.findtext(&assertion.xpath).unwrap_or_default())
            .collect();
        let reference = assertion
            .value
            .as_deref()
            .or_else(|| values.first().copied())
            .unwrap_or_default();
        values
            .iter()
            .map(|value| {
                if *value == reference {
                    Ok(())
                } else {
                    Err(format!("{} differs: {} != {}", assertion.xpath, value, reference))
                }
            })
            .collect()
    } else if items.is_empty() && assertion.op != Operator::NotExists {
        vec![Err(format!("No items found for {}", test.iterate))]
    } else {
        items
            .iter()
            .map(|item| {
                check_item(assertion, item).map_err(|err| match test.id.is_empty() {
                    true => err,
                    false => format!("[{}] {}", test.item_id(item), err),
                })
            })
            .collect()
    };
    let passed = outcomes.iter().filter(|o| o.is_ok()).count();
    AssertionResult {
        passed,
        ..summarize(test, assertion, outcomes)
    }
}

/// Limit for `delta`: `10%` relative or `5` absolute, `+`/`-` restrict the
/// direction of the change.
fn within_delta(delta: &str, pre: f64, post: f64) -> bool {
    let delta = delta.trim();
    let (direction, amount) = match delta.chars().next() {
        Some('+') => (1, &delta[1..]),
        Some('-') => (-1, &delta[1..]),
        _ => (0, delta),
    };
    let Some(limit) = number(amount) else {
        return false;
    };
    let limit = if amount.ends_with('%') {
        pre.abs() * limit / 100.0
    } else {
        limit
    };
    let change = post - pre;
    match direction {
        1 => change >= 0.0 && change <= limit,
        -1 => change <= 0.0 && -change <= limit,
        _ => change.abs() <= limit,
    }
}

fn evaluate_pair(test: &SnapshotTest, assertion: &Assertion, pre: &XmlNode, post: &XmlNode) -> AssertionResult {
    let pre_items = test.index(pre);
    let post_items = test.index(post);
    let value = |item: &XmlNode| item.findtext(&assertion.xpath).map(|v| v.to_string());

    let mut outcomes = Vec::new();
    match assertion.op {
        Operator::ListNotLess => {
            for (id, item) in &pre_items {
                outcomes.push(match post_items.get(id) {
                    Some(after) if value(*item) == value(*after) || item.find(&assertion.xpath).is_none() => Ok(()),
                    Some(_) => Err(format!("[{}] {} changed", id, assertion.xpath)),
                    None => Err(format!("[{}] missing after", id)),
                });
            }
        }
        Operator::ListNotMore => {
            for id in post_items.keys() {
                outcomes.push(match pre_items.contains_key(id) {
                    true => Ok(()),
                    false => Err(format!("[{}] added after", id)),
                });
            }
        }
        Operator::NoDiff | Operator::Delta => {
            for (id, item) in &pre_items {
                let Some(after) = post_items.get(id) else {
                    outcomes.push(Err(format!("[{}] missing after", id)));
                    continue;
                };
                let (before, after) = (value(*item), value(*after));
                let ok = match assertion.op {
                    Operator::NoDiff => before == after,
                    _ => match (
                        before.as_deref().and_then(number),
                        after.as_deref().and_then(number),
                    ) {
                        (Some(b), Some(a)) => {
                            within_delta(assertion.value.as_deref().unwrap_or("0"), b, a)
                        }
                        _ => false,
                    },
                };
                outcomes.push(match ok {
                    true => Ok(()),
                    false => Err(format!(
                        "[{}] {}: {} -> {}",
                        id,
                        assertion.xpath,
                        before.unwrap_or_default(),
                        after.unwrap_or_default()
                    )),
                });
            }
        }
        _ => return evaluate_single(test, assertion, post),
    }
    let passed = outcomes.iter().filter(|o| o.is_ok()).count();
    AssertionResult {
        passed,
        ..summarize(test, assertion, outcomes)
    }
}

/// Evaluates every assertion of `test`. Without a pre snapshot the
/// comparing operations fail.
pub fn evaluate(test: &SnapshotTest, pre: Option<&XmlNode>, post: &XmlNode) -> Vec<AssertionResult> {
    test.assertions
        .iter()
        .map(|assertion| match (assertion.op.needs_pre(), pre) {
            (true, Some(pre)) => evaluate_pair(test, assertion, pre, post),
            (true, None) => summarize(
                test,
                assertion,
                vec![Err(format!("{} needs pre and post snapshots", assertion.op))],
            ),
            (false, _) => evaluate_single(test, assertion, post),
        })
        .collect()
}

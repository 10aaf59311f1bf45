use std::time::{Instant, SystemTime};

use humantime::format_rfc3339_millis;
use serde::Serialize;
use serde_json::Value;

use crate::outcome::Status;
use crate::output::LogMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Keyword,
    Setup,
    Teardown,
    ForLoop,
    ForIteration,
}

impl NodeType {
    pub fn is_fixture(&self) -> bool {
        matches!(self, NodeType::Setup | NodeType::Teardown)
    }
}

pub(crate) fn timestamp(time: SystemTime) -> String {
    format_rfc3339_millis(time).to_string()
}

/// One node of the call tree as reported to listeners and kept in the
/// result tree.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordResult {
    pub name: String,
    pub node_type: NodeType,
    pub args: Vec<String>,
    pub assign: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_args: Option<Vec<Value>>,
    pub status: Status,
    pub message: String,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub elapsed_ms: u64,
    pub messages: Vec<LogMessage>,
    pub children: Vec<KeywordResult>,
    #[serde(skip)]
    started: Option<Instant>,
}

impl KeywordResult {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
            args: Vec::new(),
            assign: Vec::new(),
            resolved_args: None,
            status: Status::NotRun,
            message: String::new(),
            start_time: String::new(),
            end_time: None,
            elapsed_ms: 0,
            messages: Vec::new(),
            children: Vec::new(),
            started: None,
        }
    }

    pub fn with_args(mut self, args: &[String]) -> Self {
        self.args = args.to_vec();
        self
    }

    pub fn with_assign(mut self, assign: &[String]) -> Self {
        self.assign = assign.to_vec();
        self
    }

    pub(crate) fn mark_started(&mut self) {
        self.start_time = timestamp(SystemTime::now());
        self.started = Some(Instant::now());
    }

    pub(crate) fn mark_finished(&mut self, status: Status, message: String) {
        self.status = status;
        self.message = message;
        self.end_time = Some(timestamp(SystemTime::now()));
        self.elapsed_ms = self
            .started
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    /// Depth-first search by name, including this node.
    pub fn find(&self, name: &str) -> Option<&KeywordResult> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

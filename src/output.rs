use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::time::SystemTime;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::outcome::{cut_long_message, Outcome, Status};
use crate::registry::Context;
use crate::result::{timestamp, KeywordResult, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Fail,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Fail => "FAIL",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "FAIL" => Ok(LogLevel::Fail),
            other => Err(anyhow!("unsupported log level: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
}

impl LogMessage {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: timestamp(SystemTime::now()),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "level": self.level.as_str(),
            "message": self.message,
            "timestamp": self.timestamp,
        })
    }
}

/// Observer of the start/end event stream. All methods default to no-ops.
pub trait Listener {
    fn start_keyword(&mut self, _node: &KeywordResult) {}

    fn end_keyword(&mut self, _node: &KeywordResult) {}

    fn log_message(&mut self, _message: &LogMessage) {}
}

/// Trace sink of a run. Open nodes form a stack; finished nodes are moved
/// into their parent or, at the top, into the result list.
pub struct Output {
    level: LogLevel,
    stack: Vec<KeywordResult>,
    results: Vec<KeywordResult>,
    warnings: Vec<LogMessage>,
    listeners: Vec<Box<dyn Listener>>,
}

impl Output {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            stack: Vec::new(),
            results: Vec::new(),
            warnings: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn set_level(&mut self, level: LogLevel) -> LogLevel {
        std::mem::replace(&mut self.level, level)
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.level
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn start_keyword(&mut self, mut node: KeywordResult) {
        node.mark_started();
        for listener in &mut self.listeners {
            listener.start_keyword(&node);
        }
        self.stack.push(node);
    }

    pub fn end_keyword(&mut self, status: Status, message: String) {
        let Some(mut node) = self.stack.pop() else {
            return;
        };
        node.mark_finished(status, message);
        for listener in &mut self.listeners {
            listener.end_keyword(&node);
        }
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.results.push(node),
        }
    }

    pub fn current_mut(&mut self) -> Option<&mut KeywordResult> {
        self.stack.last_mut()
    }

    /// Records the argument values the open node was actually called with.
    pub fn set_resolved_args(&mut self, values: Vec<Value>) {
        if let Some(node) = self.stack.last_mut() {
            node.resolved_args = Some(values);
        }
    }

    /// Removes finished top-level nodes starting from `index`.
    pub fn drain_results(&mut self, index: usize) -> Vec<KeywordResult> {
        let index = index.min(self.results.len());
        self.results.drain(index..).collect()
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if !self.is_enabled(level) && level != LogLevel::Warn {
            return;
        }
        let entry = LogMessage::new(level, message);
        if level == LogLevel::Warn {
            self.warnings.push(entry.clone());
            if !self.is_enabled(level) {
                return;
            }
        }
        for listener in &mut self.listeners {
            listener.log_message(&entry);
        }
        if let Some(node) = self.stack.last_mut() {
            node.messages.push(entry);
        }
    }

    pub fn trace<F>(&mut self, message: F)
    where
        F: FnOnce() -> String,
    {
        if self.is_enabled(LogLevel::Trace) {
            self.log(LogLevel::Trace, message());
        }
    }

    pub fn debug<F>(&mut self, message: F)
    where
        F: FnOnce() -> String,
    {
        if self.is_enabled(LogLevel::Debug) {
            self.log(LogLevel::Debug, message());
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Fail, message);
    }

    pub fn warnings(&self) -> &[LogMessage] {
        &self.warnings
    }

    pub fn results(&self) -> &[KeywordResult] {
        &self.results
    }

    pub fn take_results(&mut self) -> Vec<KeywordResult> {
        std::mem::take(&mut self.results)
    }
}

/// Opens a call-tree node on creation and closes it exactly once: through
/// `finish`, or with a failure when dropped unfinished. Only keyword and
/// fixture nodes count toward the call depth; loop nodes do not.
pub struct StatusReporter<'a> {
    ctx: &'a mut Context,
    pass_status: Status,
    counts_call: bool,
    finished: bool,
}

impl<'a> StatusReporter<'a> {
    pub fn start(ctx: &'a mut Context, node: KeywordResult) -> Self {
        let counts_call = !matches!(node.node_type, NodeType::ForLoop | NodeType::ForIteration);
        if counts_call {
            ctx.push_scope();
        }
        ctx.output_mut().start_keyword(node);
        Self {
            ctx,
            pass_status: Status::Pass,
            counts_call,
            finished: false,
        }
    }

    /// Library keywords skipped in dry run are reported as not run.
    pub fn report_pass_as(&mut self, status: Status) {
        self.pass_status = status;
    }

    pub fn finish(mut self, outcome: &Outcome) {
        let (status, message) = match outcome.status() {
            Status::Fail => (Status::Fail, outcome.message()),
            Status::Pass => (self.pass_status, String::new()),
            Status::NotRun => (Status::NotRun, String::new()),
        };
        self.end(status, message);
    }

    fn end(&mut self, status: Status, message: String) {
        if self.finished {
            return;
        }
        self.finished = true;
        let max_lines = self.ctx.settings().max_error_lines;
        let message = cut_long_message(&message, max_lines);
        self.ctx.output_mut().end_keyword(status, message);
        if self.counts_call {
            self.ctx.pop_scope();
        }
    }
}

impl Deref for StatusReporter<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &*self.ctx
    }
}

impl DerefMut for StatusReporter<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut *self.ctx
    }
}

impl Drop for StatusReporter<'_> {
    fn drop(&mut self) {
        self.end(Status::Fail, "Execution ended before the keyword finished.".to_string());
    }
}

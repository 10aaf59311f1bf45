use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DataError, KeywordError};

const CUT_MARKER: &str = "    [ Message content over the limit has been removed. ]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "NOT_RUN")]
    NotRun,
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotRun => "NOT_RUN",
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
        }
    }
}

/// Where a failure happened, which decides whether siblings still run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinueContext {
    pub in_teardown: bool,
    pub templated: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub message: String,
    pub continuable: bool,
    pub syntax: bool,
    pub timeout: bool,
    pub fatal: bool,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            continuable: false,
            syntax: false,
            timeout: false,
            fatal: false,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self {
            syntax: true,
            ..Self::new(message)
        }
    }

    pub fn continuable(message: impl Into<String>) -> Self {
        Self {
            continuable: true,
            ..Self::new(message)
        }
    }

    pub fn can_continue(&self, context: ContinueContext) -> bool {
        if context.dry_run {
            return true;
        }
        if self.syntax || self.timeout || self.fatal {
            return false;
        }
        if context.templated || context.in_teardown {
            return true;
        }
        self.continuable
    }
}

impl From<DataError> for Failure {
    fn from(err: DataError) -> Self {
        Failure {
            syntax: err.is_syntax(),
            ..Failure::new(err.message())
        }
    }
}

impl From<&KeywordError> for Failure {
    fn from(err: &KeywordError) -> Self {
        Failure {
            message: err.message.clone(),
            continuable: err.continuable,
            syntax: false,
            timeout: err.timeout,
            fatal: err.fatal,
        }
    }
}

/// Failures collected by a sequence or loop, in the order they happened.
/// `return_value` carries what a keyword returned before failing in a way
/// that still allows assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Failures {
    errors: Vec<Failure>,
    pub return_value: Value,
}

impl Failures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(failure: Failure) -> Self {
        Self {
            errors: vec![failure],
            return_value: Value::Null,
        }
    }

    pub fn push(&mut self, failure: Failure) {
        self.errors.push(failure);
    }

    pub fn extend(&mut self, other: Failures) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[Failure] {
        &self.errors
    }

    pub fn messages(&self) -> Vec<&str> {
        self.errors.iter().map(|err| err.message.as_str()).collect()
    }

    pub fn message(&self) -> String {
        match self.errors.as_slice() {
            [] => String::new(),
            [only] => only.message.clone(),
            many => {
                let numbered: Vec<String> = many
                    .iter()
                    .enumerate()
                    .map(|(index, err)| format!("{}) {}", index + 1, err.message))
                    .collect();
                format!("Several failures occurred:\n\n{}", numbered.join("\n\n"))
            }
        }
    }

    pub fn can_continue(&self, context: ContinueContext) -> bool {
        if context.dry_run {
            return true;
        }
        if self
            .errors
            .iter()
            .any(|err| err.syntax || err.timeout || err.fatal)
        {
            return false;
        }
        if context.templated || context.in_teardown {
            return true;
        }
        !self.errors.is_empty() && self.errors.iter().all(|err| err.continuable)
    }

    pub fn is_syntax(&self) -> bool {
        self.errors.iter().any(|err| err.syntax)
    }

    pub fn is_timeout(&self) -> bool {
        self.errors.iter().any(|err| err.timeout)
    }

    /// Marks every collected failure as stopping execution.
    pub fn stop_on_failure(mut self) -> Self {
        for err in &mut self.errors {
            err.continuable = false;
        }
        self
    }

    fn prepend(&mut self, earlier: &Failures) {
        if earlier.is_empty() {
            return;
        }
        let mut merged = earlier.errors.clone();
        merged.append(&mut self.errors);
        self.errors = merged;
    }
}

impl From<Failure> for Failures {
    fn from(failure: Failure) -> Self {
        Failures::single(failure)
    }
}

/// Result of running any node.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed(Value),
    Failed(Failures),
    Continue(Failures),
    Break(Failures),
    Pass { message: String, earlier: Failures },
}

impl Outcome {
    pub fn passed() -> Self {
        Outcome::Passed(Value::Null)
    }

    pub fn failed(failure: Failure) -> Self {
        Outcome::Failed(Failures::single(failure))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            Outcome::Continue(_) | Outcome::Break(_) | Outcome::Pass { .. }
        )
    }

    pub fn earlier_failures(&self) -> Option<&Failures> {
        match self {
            Outcome::Continue(earlier) | Outcome::Break(earlier) => Some(earlier),
            Outcome::Pass { earlier, .. } => Some(earlier),
            _ => None,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Outcome::Passed(_) => Status::Pass,
            Outcome::Failed(_) => Status::Fail,
            Outcome::Continue(earlier) | Outcome::Break(earlier) | Outcome::Pass { earlier, .. } => {
                if earlier.is_empty() {
                    Status::Pass
                } else {
                    Status::Fail
                }
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            Outcome::Passed(_) => String::new(),
            Outcome::Failed(failures) => failures.message(),
            Outcome::Continue(earlier) | Outcome::Break(earlier) => earlier.message(),
            Outcome::Pass { message, earlier } => {
                if earlier.is_empty() {
                    message.clone()
                } else {
                    earlier.message()
                }
            }
        }
    }

    /// Turns loop signals that escaped every loop into failures.
    pub fn outside_loop(self) -> Self {
        let (mut earlier, message) = match self {
            Outcome::Continue(earlier) => {
                (earlier, "'Continue For Loop' can only be used inside a loop.")
            }
            Outcome::Break(earlier) => (earlier, "'Exit For Loop' can only be used inside a loop."),
            other => return other,
        };
        earlier.push(Failure::new(message));
        Outcome::Failed(earlier)
    }

    /// Attaches failures that happened before a signal was raised. They are
    /// placed before any failures the signal already carries.
    pub fn with_earlier_failures(mut self, failures: &Failures) -> Self {
        match &mut self {
            Outcome::Continue(earlier) | Outcome::Break(earlier) => earlier.prepend(failures),
            Outcome::Pass { earlier, .. } => earlier.prepend(failures),
            _ => {}
        }
        self
    }
}

pub fn cut_long_message(message: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = message.lines().collect();
    if max_lines == 0 || lines.len() <= max_lines {
        return message.to_string();
    }
    let head = max_lines / 2;
    let tail = max_lines - head;
    let mut kept: Vec<&str> = lines[..head].to_vec();
    kept.push(CUT_MARKER);
    kept.extend_from_slice(&lines[lines.len() - tail..]);
    kept.join("\n")
}

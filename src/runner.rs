use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fixture::Fixture;
use crate::for_loop::ForLoop;
use crate::keyword::Keyword;
use crate::outcome::{Failures, Outcome, Status};
use crate::registry::Context;
use crate::result::{KeywordResult, NodeType};
use crate::steps::{Keywords, Step};

/// A test: optional setup, a body of steps and optional teardown. With a
/// template every body row is a set of arguments for the template keyword.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<Fixture>,
    #[serde(default)]
    pub body: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown: Option<Fixture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub status: Status,
    pub message: String,
    pub keywords: Vec<KeywordResult>,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl TestCase {
    pub fn new(name: impl Into<String>, body: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            body,
            ..Self::default()
        }
    }

    pub fn with_setup(mut self, setup: Fixture) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn with_teardown(mut self, teardown: Fixture) -> Self {
        self.teardown = Some(teardown);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn is_templated(&self) -> bool {
        self.template.is_some()
    }

    /// Runs the test in its own variable scope. Top-level result nodes
    /// produced by the test are moved into the returned result.
    pub fn run(&self, ctx: &mut Context) -> TestResult {
        let first_result = ctx.output().results().len();
        ctx.info(format!("Running test '{}'.", self.name));
        let status = ctx.with_variable_scope(|ctx| self.run_phases(ctx));
        let (status, message) = status.finish();
        ctx.debug(|| format!("Test '{}' ended with status {}.", self.name, status.as_str()));
        TestResult {
            name: self.name.clone(),
            status,
            message,
            keywords: ctx.output_mut().drain_results(first_result),
        }
    }

    fn run_phases(&self, ctx: &mut Context) -> TestStatus {
        let mut status = TestStatus::default();
        if let Some(setup) = &self.setup {
            status.setup = setup.run_collecting(ctx, NodeType::Setup);
        }
        if status.setup.is_none() {
            status.body = Some(self.run_body(ctx));
        }
        if let Some(teardown) = &self.teardown {
            status.teardown = teardown.run_collecting(ctx, NodeType::Teardown);
        }
        status
    }

    fn run_body(&self, ctx: &mut Context) -> Outcome {
        let outcome = match &self.template {
            Some(template) => {
                let body = apply_template(template, &self.body);
                ctx.with_templated(true, |ctx| Keywords::new(&body).run(ctx))
            }
            None => Keywords::new(&self.body).run(ctx),
        };
        outcome.outside_loop()
    }
}

/// Rows become calls of the template with the row's name as first argument.
fn apply_template(template: &str, steps: &[Step]) -> Vec<Step> {
    steps
        .iter()
        .map(|step| match step {
            Step::Keyword(row) => {
                let args = std::iter::once(row.name.clone()).chain(row.args.iter().cloned());
                Step::Keyword(Keyword::new(template).with_args(args))
            }
            Step::For(for_loop) => Step::For(ForLoop {
                body: apply_template(template, &for_loop.body),
                ..for_loop.clone()
            }),
        })
        .collect()
}

#[derive(Default)]
struct TestStatus {
    setup: Option<Failures>,
    body: Option<Outcome>,
    teardown: Option<Failures>,
}

impl TestStatus {
    fn finish(self) -> (Status, String) {
        let (mut status, mut message) = match (&self.setup, &self.body) {
            (Some(setup), _) => (Status::Fail, format!("Setup failed:\n{}", setup.message())),
            (None, Some(Outcome::Pass { message, earlier })) if earlier.is_empty() => {
                (Status::Pass, message.clone())
            }
            (None, Some(outcome)) => (outcome.status(), outcome.message()),
            (None, None) => (Status::Pass, String::new()),
        };
        if let Some(teardown) = &self.teardown {
            message = if status == Status::Fail {
                format!("{message}\n\nAlso teardown failed:\n{}", teardown.message())
            } else {
                format!("Teardown failed:\n{}", teardown.message())
            };
            status = Status::Fail;
        }
        (status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Failure;

    #[test]
    fn setup_failure_is_reported_with_prefix() {
        let status = TestStatus {
            setup: Some(Failures::single(Failure::new("boom"))),
            ..TestStatus::default()
        };
        assert_eq!(status.finish(), (Status::Fail, "Setup failed:\nboom".to_string()));
    }

    #[test]
    fn teardown_failure_is_appended() {
        let status = TestStatus {
            body: Some(Outcome::failed(Failure::new("body"))),
            teardown: Some(Failures::single(Failure::new("td"))),
            ..TestStatus::default()
        };
        assert_eq!(
            status.finish(),
            (Status::Fail, "body\n\nAlso teardown failed:\ntd".to_string())
        );

        let status = TestStatus {
            body: Some(Outcome::passed()),
            teardown: Some(Failures::single(Failure::new("td"))),
            ..TestStatus::default()
        };
        assert_eq!(status.finish(), (Status::Fail, "Teardown failed:\ntd".to_string()));
    }

    #[test]
    fn pass_execution_message_is_kept() {
        let status = TestStatus {
            body: Some(Outcome::Pass {
                message: "done early".to_string(),
                earlier: Failures::new(),
            }),
            ..TestStatus::default()
        };
        assert_eq!(status.finish(), (Status::Pass, "done early".to_string()));
    }

    #[test]
    fn template_rows_become_template_calls() {
        let rows = vec![Step::from(Keyword::new("1").with_args(["2"]))];
        let applied = apply_template("Should Be Sum", &rows);
        assert_eq!(
            applied,
            vec![Step::from(Keyword::new("Should Be Sum").with_args(["1", "2"]))]
        );
    }
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assign::VariableAssignment;
use crate::errors::{DataError, ExecutionSignal, KeywordError};
use crate::handlers::{Func, Handler, HandlerKind};
use crate::outcome::{ContinueContext, Failure, Failures, Outcome, Status};
use crate::output::StatusReporter;
use crate::registry::Context;
use crate::result::{KeywordResult, NodeType};
use crate::variables::value_to_string;

const EMPTY_FAILURE: &str = "Keyword failed without a message.";

/// A single keyword call: name, unresolved argument tokens and the
/// variables its return value is assigned to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub assign: Vec<String>,
}

impl Keyword {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            assign: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_assign<I, S>(mut self, assign: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assign = assign.into_iter().map(Into::into).collect();
        self
    }

    pub fn run(&self, ctx: &mut Context) -> Outcome {
        self.run_as(ctx, NodeType::Keyword)
    }

    pub(crate) fn run_as(&self, ctx: &mut Context, node_type: NodeType) -> Outcome {
        let handler = ctx.handler(&self.name);
        let name = match &handler {
            Ok(handler) => handler.longname(),
            Err(_) => self.name.clone(),
        };
        let node = KeywordResult::new(name, node_type)
            .with_args(&self.args)
            .with_assign(&self.assign);
        let skipped = ctx.dry_run()
            && matches!(&handler, Ok(handler) if !handler.is_user_keyword());
        let mut reporter = StatusReporter::start(ctx, node);
        if skipped {
            reporter.report_pass_as(Status::NotRun);
        }
        let outcome = self.execute(&mut reporter, handler);
        reporter.finish(&outcome);
        outcome
    }

    fn execute(&self, ctx: &mut Context, handler: Result<Arc<Handler>, DataError>) -> Outcome {
        if ctx.call_depth_exceeded() {
            return data_failure(
                ctx,
                DataError::new("Maximum limit of started keywords exceeded."),
            );
        }
        let assignment = match VariableAssignment::new(&self.assign) {
            Ok(assignment) => assignment,
            Err(err) => return data_failure(ctx, err),
        };
        let handler = match handler {
            Ok(handler) => handler,
            Err(err) => return data_failure(ctx, err),
        };
        let outcome = match handler.kind() {
            HandlerKind::User(keyword) => keyword.run(ctx, &self.args),
            HandlerKind::Invalid(err) => data_failure(ctx, err.clone()),
            HandlerKind::Library { func, .. }
            | HandlerKind::Dynamic { func, .. }
            | HandlerKind::Signatured { func, .. }
            | HandlerKind::RunKeyword { func, .. } => self.invoke(ctx, &handler, func.clone()),
        };
        if ctx.dry_run() {
            return outcome;
        }
        assign_result(ctx, &assignment, outcome)
    }

    fn invoke(&self, ctx: &mut Context, handler: &Handler, func: Arc<dyn Func>) -> Outcome {
        let binder = match handler.binder() {
            Ok(binder) => binder,
            Err(err) => return data_failure(ctx, err),
        };
        if ctx.dry_run() {
            return match binder.check_for_dry_run(&self.args) {
                Ok(()) => Outcome::passed(),
                Err(err) => data_failure(ctx, err),
            };
        }
        let call = match binder.bind(&self.args, ctx.variables()) {
            Ok(call) => call,
            Err(err) => return data_failure(ctx, err),
        };
        let mut used: Vec<Value> = call.positional.clone();
        used.extend(
            call.named
                .iter()
                .map(|(name, value)| Value::String(format!("{name}={}", value_to_string(value)))),
        );
        ctx.trace(|| {
            let rendered: Vec<String> = used.iter().map(value_to_string).collect();
            format!("Arguments: [ {} ]", rendered.join(" | "))
        });
        ctx.output_mut().set_resolved_args(used);
        match func.call(ctx, call) {
            Ok(value) => {
                ctx.trace(|| format!("Return: {}", value_to_string(&value)));
                Outcome::Passed(value)
            }
            Err(err) => classify_error(ctx, err),
        }
    }
}

/// Failing assignment overrides the call's own outcome. Values are assigned
/// after a failure only when that failure lets execution continue.
fn assign_result(ctx: &mut Context, assignment: &VariableAssignment, outcome: Outcome) -> Outcome {
    if assignment.is_empty() {
        return outcome;
    }
    let teardown = ContinueContext {
        in_teardown: ctx.in_teardown(),
        ..ContinueContext::default()
    };
    let value = match &outcome {
        Outcome::Passed(value) => value.clone(),
        Outcome::Failed(failures) if failures.can_continue(teardown) => {
            failures.return_value.clone()
        }
        _ => return outcome,
    };
    match assignment.assign(ctx, value) {
        Ok(()) => outcome,
        Err(err) => {
            ctx.fail(err.message());
            Outcome::failed(Failure::syntax(err.message()))
        }
    }
}

pub(crate) fn data_failure(ctx: &mut Context, err: DataError) -> Outcome {
    ctx.fail(err.message());
    Outcome::failed(Failure::from(err))
}

/// Maps an error raised by a keyword implementation to an outcome.
pub fn classify_error(ctx: &mut Context, err: anyhow::Error) -> Outcome {
    if let Some(signal) = err.downcast_ref::<ExecutionSignal>() {
        return match signal {
            ExecutionSignal::ContinueLoop => Outcome::Continue(Failures::new()),
            ExecutionSignal::ExitLoop => Outcome::Break(Failures::new()),
            ExecutionSignal::PassExecution(message) => Outcome::Pass {
                message: message.clone(),
                earlier: Failures::new(),
            },
        };
    }
    let mut failure = if let Some(keyword_error) = err.downcast_ref::<KeywordError>() {
        if keyword_error.timeout {
            ctx.set_timeout_occurred(true);
        }
        Failure::from(keyword_error)
    } else if let Some(data_error) = err.downcast_ref::<DataError>() {
        Failure::from(data_error.clone())
    } else {
        Failure::new(err.to_string())
    };
    if failure.message.trim().is_empty() {
        failure.message = EMPTY_FAILURE.to_string();
    }
    ctx.fail(failure.message.clone());
    ctx.debug(|| format!("{err:?}"));
    Outcome::failed(failure)
}

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::arguments::ArgumentSpec;
use crate::errors::{DataError, ExecutionSignal, KeywordError};
use crate::handlers::CallArgs;
use crate::outcome::Outcome;
use crate::output::LogLevel;
use crate::registry::{Context, Registry};
use crate::variables::value_to_string;

const LIBRARY: &str = "BuiltIn";

pub fn register_builtin(registry: &Registry) {
    registry.register_in_library(LIBRARY, "No Operation", ArgumentSpec::default(), no_operation);
    registry.register_in_library(LIBRARY, "Log", spec(&["message", "level"], &["INFO"]), log);
    registry.register_in_library(LIBRARY, "Fail", spec(&["msg"], &["AssertionError"]), fail);
    registry.register_in_library(
        LIBRARY,
        "Set Variable",
        ArgumentSpec::default().with_varargs("values"),
        set_variable,
    );
    registry.register_in_library(
        LIBRARY,
        "Should Be Equal",
        spec(&["first", "second", "msg"], &[""]),
        should_be_equal,
    );
    registry.register_in_library(LIBRARY, "Continue For Loop", ArgumentSpec::default(), continue_for_loop);
    registry.register_in_library(LIBRARY, "Exit For Loop", ArgumentSpec::default(), exit_for_loop);
    registry.register_in_library(LIBRARY, "Pass Execution", spec(&["message"], &[]), pass_execution);
    registry.register_run_keyword(
        LIBRARY,
        "Run Keyword And Continue On Failure",
        1,
        ArgumentSpec::positional(["name"]).with_varargs("args"),
        run_keyword_and_continue_on_failure,
    );
}

fn spec(names: &[&str], defaults: &[&str]) -> ArgumentSpec {
    let defaults = defaults.iter().map(|value| Value::String(value.to_string())).collect();
    ArgumentSpec::positional(names.iter().copied())
        .with_defaults(defaults)
        .unwrap_or_default()
}

/// Positional value at `index`, the named value `name`, or `default`.
fn text_arg(args: &CallArgs, index: usize, name: &str, default: &str) -> String {
    args.text(index)
        .or_else(|| args.named.get(name).map(value_to_string))
        .unwrap_or_else(|| default.to_string())
}

fn no_operation(_ctx: &mut Context, _args: CallArgs) -> Result<Value> {
    Ok(Value::Null)
}

fn log(ctx: &mut Context, args: CallArgs) -> Result<Value> {
    let message = text_arg(&args, 0, "message", "");
    let level: LogLevel = text_arg(&args, 1, "level", "INFO")
        .parse()
        .map_err(|err: anyhow::Error| DataError::new(err.to_string()))?;
    ctx.output_mut().log(level, message);
    Ok(Value::Null)
}

fn fail(_ctx: &mut Context, args: CallArgs) -> Result<Value> {
    Err(KeywordError::new(text_arg(&args, 0, "msg", "AssertionError")).into())
}

/// One value is returned as is, several as a list.
fn set_variable(_ctx: &mut Context, mut args: CallArgs) -> Result<Value> {
    match args.positional.len() {
        0 => Ok(Value::String(String::new())),
        1 => Ok(args.positional.remove(0)),
        _ => Ok(Value::Array(args.positional)),
    }
}

/// Values are compared as text, so `${1}` equals `1`.
fn should_be_equal(_ctx: &mut Context, args: CallArgs) -> Result<Value> {
    let first = text_arg(&args, 0, "first", "None");
    let second = text_arg(&args, 1, "second", "None");
    if first == second {
        return Ok(Value::Null);
    }
    let custom = text_arg(&args, 2, "msg", "");
    let message = if custom.is_empty() {
        format!("{first} != {second}")
    } else {
        custom
    };
    Err(KeywordError::new(message).into())
}

fn continue_for_loop(ctx: &mut Context, _args: CallArgs) -> Result<Value> {
    ctx.info("Continuing for loop from the next iteration.");
    Err(ExecutionSignal::ContinueLoop.into())
}

fn exit_for_loop(ctx: &mut Context, _args: CallArgs) -> Result<Value> {
    ctx.info("Exiting for loop altogether.");
    Err(ExecutionSignal::ExitLoop.into())
}

fn pass_execution(ctx: &mut Context, args: CallArgs) -> Result<Value> {
    let message = text_arg(&args, 0, "message", "");
    let message = message.trim();
    if message.is_empty() {
        return Err(anyhow!("Message cannot be empty."));
    }
    ctx.info(format!("Execution passed with message:\n{message}"));
    Err(ExecutionSignal::PassExecution(message.to_string()).into())
}

/// Failures of the called keyword let the caller continue. Syntax errors
/// and timeouts keep stopping execution. Arguments after the name arrive
/// unresolved and are resolved by the called keyword.
fn run_keyword_and_continue_on_failure(ctx: &mut Context, args: CallArgs) -> Result<Value> {
    let mut values = args.positional.iter().map(value_to_string);
    let name = values.next().unwrap_or_default();
    let rest: Vec<String> = values.collect();
    match ctx.run_keyword(&name, rest) {
        Outcome::Passed(value) => Ok(value),
        Outcome::Failed(failures) => {
            let message = failures.message();
            if failures.is_syntax() {
                Err(DataError::syntax(message).into())
            } else if failures.is_timeout() {
                Err(KeywordError::timeout(message).into())
            } else {
                Err(KeywordError::continuable(message).into())
            }
        }
        Outcome::Continue(_) => Err(ExecutionSignal::ContinueLoop.into()),
        Outcome::Break(_) => Err(ExecutionSignal::ExitLoop.into()),
        Outcome::Pass { message, .. } => Err(ExecutionSignal::PassExecution(message).into()),
    }
}

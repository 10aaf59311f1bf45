use serde_json::Value;

use crate::arguments::{ArgumentResolver, ArgumentSpec, NameCoercion};
use crate::errors::DataError;
use crate::fixture::Fixture;
use crate::handlers::{ArgumentBinder, UserKeywordBinder};
use crate::keyword::data_failure;
use crate::outcome::{Failure, Failures, Outcome};
use crate::output::LogLevel;
use crate::registry::Context;
use crate::result::NodeType;
use crate::steps::{Keywords, Step};
use crate::variables::{is_list_var, value_to_string, Replacer};

/// A keyword defined in test data: argument tokens, a body of steps,
/// optional return values and an optional teardown.
#[derive(Debug, Clone)]
pub struct UserKeyword {
    pub name: String,
    spec: ArgumentSpec,
    pub body: Vec<Step>,
    pub returns: Vec<String>,
    pub teardown: Option<Fixture>,
    pub doc: String,
}

impl UserKeyword {
    pub fn new(name: impl Into<String>, args: &[String], body: Vec<Step>) -> Result<Self, DataError> {
        Ok(Self {
            name: name.into(),
            spec: ArgumentSpec::from_user_keyword(args)?,
            body,
            returns: Vec::new(),
            teardown: None,
            doc: String::new(),
        })
    }

    pub fn with_return<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returns = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_teardown(mut self, teardown: Fixture) -> Self {
        self.teardown = Some(teardown);
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn spec(&self) -> &ArgumentSpec {
        &self.spec
    }

    /// Binds `args` in the caller's scope, then runs the body in a new local
    /// scope.
    pub(crate) fn run(&self, ctx: &mut Context, args: &[String]) -> Outcome {
        let binder = UserKeywordBinder::new(&self.name, &self.spec);
        let values = if ctx.dry_run() {
            binder
                .check_for_dry_run(args)
                .and_then(|()| self.dry_run_values(args))
        } else {
            binder.bind(args, ctx.variables()).map(|call| call.positional)
        };
        let values = match values {
            Ok(values) => values,
            Err(err) => return data_failure(ctx, err),
        };
        ctx.output_mut().set_resolved_args(values.clone());
        ctx.with_variable_scope(|ctx| {
            if let Err(err) = self.set_arguments(ctx, values) {
                return data_failure(ctx, err);
            }
            self.execute(ctx)
        })
    }

    /// Without variables the given tokens are used as is and missing values
    /// fall back to raw defaults, or to the parameter's own name.
    fn dry_run_values(&self, args: &[String]) -> Result<Vec<Value>, DataError> {
        let raw = ArgumentResolver::new(&self.spec, NameCoercion::ScalarVariable).resolve(args)?;
        let mut positional = raw.positional.into_iter();
        let mut values = Vec::with_capacity(self.spec.names().len());
        for name in self.spec.names() {
            let value = positional
                .next()
                .or_else(|| {
                    raw.named
                        .iter()
                        .find(|(named, _)| named == name)
                        .map(|(_, value)| value.clone())
                })
                .map(Value::String)
                .or_else(|| self.spec.default_for(name).cloned())
                .unwrap_or_else(|| Value::String(name.clone()));
            values.push(value);
        }
        values.extend(positional.map(Value::String));
        Ok(values)
    }

    fn set_arguments(&self, ctx: &mut Context, mut values: Vec<Value>) -> Result<(), DataError> {
        let fixed = self.spec.names().len().min(values.len());
        let rest = values.split_off(fixed);
        for (name, value) in self.spec.names().iter().zip(values) {
            ctx.set_variable(name, value)?;
        }
        if let Some(varargs) = self.spec.varargs() {
            ctx.set_variable(varargs, Value::Array(rest))?;
        }
        if ctx.output().is_enabled(LogLevel::Trace) {
            let pairs = argument_pairs(ctx.variables(), &self.spec);
            ctx.trace(|| format!("Arguments: [ {} ]", pairs.join(" | ")));
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut Context) -> Outcome {
        if self.body.is_empty() && self.returns.is_empty() {
            return data_failure(ctx, DataError::syntax("User keyword contains no keywords."));
        }
        let (error, signal) = match Keywords::new(&self.body).run(ctx) {
            Outcome::Passed(_) => (None, None),
            Outcome::Failed(failures) => (Some(failures), None),
            Outcome::Pass { earlier, .. } if !earlier.is_empty() => {
                (Some(earlier.stop_on_failure()), None)
            }
            signal => (None, Some(signal)),
        };
        let teardown = self
            .teardown
            .as_ref()
            .and_then(|teardown| teardown.run_collecting(ctx, NodeType::Teardown));
        let error = compose_teardown_failure(error, teardown);

        if let Some(mut failures) = error {
            if !failures.can_continue(ctx.continue_context()) {
                return Outcome::Failed(failures);
            }
            match self.return_value(ctx) {
                Ok(value) => failures.return_value = value,
                Err(err) => failures.push(Failure::from(err)),
            }
            return Outcome::Failed(failures);
        }
        if let Some(signal) = signal {
            return signal;
        }
        match self.return_value(ctx) {
            Ok(value) => Outcome::Passed(value),
            Err(err) => data_failure(ctx, err),
        }
    }

    /// One value unless several are returned or a list variable is used.
    fn return_value(&self, ctx: &Context) -> Result<Value, DataError> {
        if self.returns.is_empty() || ctx.dry_run() {
            return Ok(Value::Null);
        }
        let contains_list = self.returns.iter().any(|item| is_list_var(item));
        let mut values = ctx.variables().replace_list(&self.returns).map_err(|err| {
            DataError::new(format!(
                "Replacing variables from keyword return value failed: {}",
                err.message()
            ))
        })?;
        if values.len() != 1 || contains_list {
            return Ok(Value::Array(values));
        }
        Ok(values.pop().unwrap_or(Value::Null))
    }
}

fn argument_pairs(variables: &dyn Replacer, spec: &ArgumentSpec) -> Vec<String> {
    spec.names()
        .iter()
        .map(String::as_str)
        .chain(spec.varargs())
        .map(|name| {
            let value = variables
                .replace_scalar(name)
                .map(|value| value_to_string(&value))
                .unwrap_or_default();
            format!("{name}={value}")
        })
        .collect()
}

/// Combines a body failure with a keyword teardown failure.
fn compose_teardown_failure(body: Option<Failures>, teardown: Option<Failures>) -> Option<Failures> {
    let teardown = match teardown {
        Some(teardown) => teardown,
        None => return body,
    };
    let (message, mut flags) = match &body {
        Some(body) => (
            format!(
                "{}\n\nAlso keyword teardown failed:\n{}",
                body.message(),
                teardown.message()
            ),
            body.errors().to_vec(),
        ),
        None => (
            format!("Keyword teardown failed:\n{}", teardown.message()),
            Vec::new(),
        ),
    };
    flags.extend(teardown.errors().iter().cloned());
    let mut composed = Failure::new(message);
    composed.continuable = flags.iter().all(|err| err.continuable);
    composed.syntax = flags.iter().any(|err| err.syntax);
    composed.timeout = flags.iter().any(|err| err.timeout);
    composed.fatal = flags.iter().any(|err| err.fatal);
    Some(Failures::single(composed))
}

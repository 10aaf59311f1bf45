use serde::{Deserialize, Serialize};

use crate::errors::DataError;
use crate::keyword::Keyword;
use crate::outcome::{Failure, Failures, Outcome};
use crate::registry::Context;
use crate::result::NodeType;
use crate::variables::Replacer;

/// Receives the failures of a setup or teardown instead of letting them
/// propagate.
pub trait FailureListener {
    fn notify(&mut self, failures: Failures);
}

impl FailureListener for Option<Failures> {
    fn notify(&mut self, failures: Failures) {
        match self {
            Some(existing) => existing.extend(failures),
            None => *self = Some(failures),
        }
    }
}

/// A setup or teardown call. Its name may itself contain variables, which
/// are resolved only when the fixture runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Fixture {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `NONE` (any case) or an empty name means there is nothing to run.
    pub fn bind(&self, variables: &dyn Replacer) -> Result<Option<Keyword>, DataError> {
        let name = variables.replace_string(&self.name)?;
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NONE") {
            return Ok(None);
        }
        Ok(Some(Keyword::new(trimmed).with_args(self.args.clone())))
    }

    pub fn run(&self, ctx: &mut Context, node_type: NodeType, listener: &mut dyn FailureListener) {
        let keyword = match self.bind(ctx.variables()) {
            Ok(Some(keyword)) => keyword,
            Ok(None) => return,
            Err(_) if ctx.dry_run() => return,
            Err(err) => {
                ctx.fail(err.message());
                listener.notify(Failures::single(Failure::syntax(err.message())));
                return;
            }
        };
        let outcome = if node_type == NodeType::Teardown {
            ctx.in_teardown_scope(|ctx| keyword.run_as(ctx, node_type))
        } else {
            keyword.run_as(ctx, node_type)
        };
        match outcome.outside_loop() {
            Outcome::Failed(failures) => listener.notify(failures),
            Outcome::Pass { earlier, .. } if !earlier.is_empty() => listener.notify(earlier),
            _ => {}
        }
    }

    /// Runs the fixture and returns what it failed with, if anything.
    pub fn run_collecting(&self, ctx: &mut Context, node_type: NodeType) -> Option<Failures> {
        let mut failures: Option<Failures> = None;
        self.run(ctx, node_type, &mut failures);
        failures
    }
}

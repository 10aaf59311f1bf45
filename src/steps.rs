use serde::{Deserialize, Serialize};

use crate::for_loop::ForLoop;
use crate::keyword::Keyword;
use crate::outcome::{Failures, Outcome};
use crate::registry::Context;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    For(ForLoop),
    Keyword(Keyword),
}

impl Step {
    pub fn run(&self, ctx: &mut Context) -> Outcome {
        match self {
            Step::For(for_loop) => for_loop.run(ctx),
            Step::Keyword(keyword) => keyword.run(ctx),
        }
    }
}

impl From<Keyword> for Step {
    fn from(keyword: Keyword) -> Self {
        Step::Keyword(keyword)
    }
}

impl From<ForLoop> for Step {
    fn from(for_loop: ForLoop) -> Self {
        Step::For(for_loop)
    }
}

/// An ordered sequence of steps.
pub struct Keywords<'a> {
    steps: &'a [Step],
}

impl<'a> Keywords<'a> {
    pub fn new(steps: &'a [Step]) -> Self {
        Self { steps }
    }

    /// Runs steps in order. Failures that may continue are collected and
    /// the rest of the sequence still runs; the first one that may not stops
    /// it. Signals return at once, carrying the failures collected so far.
    pub fn run(&self, ctx: &mut Context) -> Outcome {
        let mut errors = Failures::new();
        for step in self.steps {
            match step.run(ctx) {
                Outcome::Passed(_) => {}
                Outcome::Failed(failures) => {
                    let can_continue = failures.can_continue(ctx.continue_context());
                    errors.extend(failures);
                    if !can_continue {
                        break;
                    }
                }
                signal => return signal.with_earlier_failures(&errors),
            }
        }
        if errors.is_empty() {
            Outcome::passed()
        } else {
            Outcome::Failed(errors)
        }
    }
}

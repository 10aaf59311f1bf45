use serde_json::Value;

use crate::errors::DataError;
use crate::variables::is_list_var;

#[derive(Debug, Clone, PartialEq)]
pub struct ArgLimitChecker {
    minargs: usize,
    maxargs: Option<usize>,
    name: String,
    kind: &'static str,
}

impl ArgLimitChecker {
    pub fn new(minargs: usize, maxargs: Option<usize>, name: impl Into<String>) -> Self {
        Self {
            minargs,
            maxargs,
            name: name.into(),
            kind: "Keyword",
        }
    }

    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn minargs(&self) -> usize {
        self.minargs
    }

    pub fn maxargs(&self) -> Option<usize> {
        self.maxargs
    }

    pub fn check(&self, count: usize) -> Result<(), DataError> {
        let within_max = self.maxargs.map_or(true, |max| count <= max);
        if self.minargs <= count && within_max {
            Ok(())
        } else {
            Err(self.invalid_count(count))
        }
    }

    /// Dry-run variant working on unresolved tokens. `@{list}` markers may
    /// expand to anything, so when they are present and the other tokens do
    /// not already exceed the maximum, the minimum is used as the count.
    pub fn check_for_dry_run(&self, args: &[String]) -> Result<(), DataError> {
        let markers = args.iter().filter(|arg| is_list_var(arg)).count();
        let scalars = args.len() - markers;
        let exceeds_max = self.maxargs.map_or(false, |max| scalars > max);
        let count = if markers > 0 && !exceeds_max {
            self.minargs
        } else {
            args.len()
        };
        self.check(count)
    }

    /// Fails if a materialized slot was never filled. Reports the count the
    /// caller originally gave.
    pub fn check_missing(
        &self,
        slots: &[Option<Value>],
        given_count: usize,
    ) -> Result<(), DataError> {
        if slots.iter().any(Option::is_none) {
            return Err(self.invalid_count(given_count));
        }
        Ok(())
    }

    fn invalid_count(&self, count: usize) -> DataError {
        let plural = if self.minargs == 1 { "" } else { "s" };
        let expected = match self.maxargs {
            Some(max) if max == self.minargs => format!("{} argument{plural}", self.minargs),
            Some(max) => format!("{} to {} arguments", self.minargs, max),
            None => format!("at least {} argument{plural}", self.minargs),
        };
        DataError::new(format!(
            "{} '{}' expected {}, got {}.",
            self.kind, self.name, expected, count
        ))
    }
}

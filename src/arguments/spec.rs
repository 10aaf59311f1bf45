use serde_json::Value;

use crate::arguments::limits::ArgLimitChecker;
use crate::errors::DataError;
use crate::variables::{is_list_var, is_scalar_var};

/// Accepted shape of a callable: ordered parameter names, defaults for a
/// trailing run of them, and an optional varargs name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentSpec {
    names: Vec<String>,
    defaults: Vec<Value>,
    varargs: Option<String>,
}

impl ArgumentSpec {
    /// `defaults` apply to the last `defaults.len()` names.
    pub fn new(
        names: Vec<String>,
        defaults: Vec<Value>,
        varargs: Option<String>,
    ) -> Result<Self, DataError> {
        if defaults.len() > names.len() {
            return Err(DataError::syntax(format!(
                "Got {} default values for {} arguments.",
                defaults.len(),
                names.len()
            )));
        }
        for (index, name) in names.iter().enumerate() {
            if names[..index].contains(name) {
                return Err(DataError::syntax(format!(
                    "Argument '{name}' defined multiple times."
                )));
            }
        }
        Ok(Self {
            names,
            defaults,
            varargs,
        })
    }

    pub fn positional<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            defaults: Vec::new(),
            varargs: None,
        }
    }

    pub fn with_defaults(mut self, defaults: Vec<Value>) -> Result<Self, DataError> {
        self.defaults = defaults;
        Self::new(self.names, self.defaults, self.varargs)
    }

    pub fn with_varargs(mut self, name: impl Into<String>) -> Self {
        self.varargs = Some(name.into());
        self
    }

    /// Accepts any number of positional arguments.
    pub fn any() -> Self {
        Self {
            names: Vec::new(),
            defaults: Vec::new(),
            varargs: Some("<unknown>".to_string()),
        }
    }

    /// Parses a dynamic library specification like `["a", "b=1", "*rest"]`.
    /// A missing specification accepts anything.
    pub fn from_dynamic(spec: Option<&[String]>) -> Result<Self, DataError> {
        let Some(tokens) = spec else {
            return Ok(Self::any());
        };
        let mut names = Vec::new();
        let mut defaults = Vec::new();
        let mut varargs: Option<String> = None;
        for token in tokens {
            if varargs.is_some() {
                return Err(DataError::syntax(
                    "Invalid argument specification: only last argument can be varargs.",
                ));
            }
            if let Some(rest) = token.strip_prefix('*') {
                varargs = Some(rest.to_string());
                continue;
            }
            if let Some((name, default)) = token.split_once('=') {
                names.push(name.to_string());
                defaults.push(Value::String(default.to_string()));
                continue;
            }
            if !defaults.is_empty() {
                return Err(DataError::syntax(
                    "Invalid argument specification: non-default argument after default arguments.",
                ));
            }
            names.push(token.clone());
        }
        Self::new(names, defaults, varargs)
    }

    /// Parses user keyword arguments like `${a}`, `${b}=default`, `@{rest}`.
    /// Names keep their `${}` decoration; defaults stay unresolved text.
    pub fn from_user_keyword(tokens: &[String]) -> Result<Self, DataError> {
        let mut names = Vec::new();
        let mut defaults = Vec::new();
        let mut varargs: Option<String> = None;
        for token in tokens {
            if varargs.is_some() {
                return Err(DataError::syntax("Only last argument can be a list."));
            }
            if is_list_var(token) {
                varargs = Some(token.clone());
                continue;
            }
            let (name, default) = match token.split_once("}=") {
                Some((head, default)) => (format!("{head}}}"), Some(default)),
                None => (token.clone(), None),
            };
            if !is_scalar_var(&name) {
                return Err(DataError::syntax(format!("Invalid argument '{token}'.")));
            }
            match default {
                Some(value) => defaults.push(Value::String(value.to_string())),
                None if !defaults.is_empty() => {
                    return Err(DataError::syntax(
                        "Non default argument after default arguments.",
                    ))
                }
                None => {}
            }
            names.push(name);
        }
        Self::new(names, defaults, varargs)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn defaults(&self) -> &[Value] {
        &self.defaults
    }

    pub fn varargs(&self) -> Option<&str> {
        self.varargs.as_deref()
    }

    pub fn minargs(&self) -> usize {
        self.names.len() - self.defaults.len()
    }

    /// `None` means unbounded.
    pub fn maxargs(&self) -> Option<usize> {
        if self.varargs.is_some() {
            None
        } else {
            Some(self.names.len())
        }
    }

    pub fn optional_count(&self) -> usize {
        self.defaults.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }

    pub fn default_for(&self, name: &str) -> Option<&Value> {
        let index = self.index_of(name)?;
        let first_default = self.minargs();
        if index < first_default {
            return None;
        }
        self.defaults.get(index - first_default)
    }

    pub fn limit_checker(&self, keyword: &str) -> ArgLimitChecker {
        ArgLimitChecker::new(self.minargs(), self.maxargs(), keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn limits_follow_defaults_and_varargs() {
        let spec = ArgumentSpec::positional(["a", "b"])
            .with_defaults(vec![json!("default")])
            .unwrap();
        assert_eq!(spec.minargs(), 1);
        assert_eq!(spec.maxargs(), Some(2));
        assert_eq!(spec.default_for("b"), Some(&json!("default")));
        assert_eq!(spec.default_for("a"), None);
        assert_eq!(spec.with_varargs("rest").maxargs(), None);
    }

    #[test]
    fn dynamic_spec_parsing() {
        let spec = ArgumentSpec::from_dynamic(Some(&tokens(&["a", "b=1", "*rest"]))).unwrap();
        assert_eq!(spec.names(), ["a", "b"]);
        assert_eq!(spec.defaults(), [json!("1")]);
        assert_eq!(spec.varargs(), Some("rest"));

        let any = ArgumentSpec::from_dynamic(None).unwrap();
        assert_eq!(any.minargs(), 0);
        assert_eq!(any.maxargs(), None);

        assert!(ArgumentSpec::from_dynamic(Some(&tokens(&["a=1", "b"]))).is_err());
        assert!(ArgumentSpec::from_dynamic(Some(&tokens(&["*a", "b"]))).is_err());
    }

    #[test]
    fn user_keyword_spec_parsing() {
        let spec =
            ArgumentSpec::from_user_keyword(&tokens(&["${a}", "${b}=x=y", "@{rest}"])).unwrap();
        assert_eq!(spec.names(), ["${a}", "${b}"]);
        assert_eq!(spec.defaults(), [json!("x=y")]);
        assert_eq!(spec.varargs(), Some("@{rest}"));

        let err = ArgumentSpec::from_user_keyword(&tokens(&["${a}=1", "${b}"])).unwrap_err();
        assert_eq!(err.message(), "Non default argument after default arguments.");
        let err = ArgumentSpec::from_user_keyword(&tokens(&["@{a}", "${b}"])).unwrap_err();
        assert_eq!(err.message(), "Only last argument can be a list.");
        let err = ArgumentSpec::from_user_keyword(&tokens(&["a"])).unwrap_err();
        assert_eq!(err.message(), "Invalid argument 'a'.");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        assert!(ArgumentSpec::new(tokens(&["a", "a"]), vec![], None).is_err());
    }
}

use serde_json::Value;

use crate::errors::DataError;
use crate::registry::Context;
use crate::variables::{format_assign_message, is_list_var, is_scalar_var};

/// Validated assignment targets of a keyword call, e.g. `${a}  @{rest}=`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableAssignment {
    scalars: Vec<String>,
    list: Option<String>,
}

impl VariableAssignment {
    pub fn new(assign: &[String]) -> Result<Self, DataError> {
        let mut parsed = Self::default();
        let mut mark_used = false;
        for target in assign {
            if mark_used {
                return Err(DataError::syntax(
                    "Assign mark '=' can be used only with the last variable.",
                ));
            }
            if parsed.list.is_some() {
                return Err(DataError::syntax(
                    "Only the last variable to assign can be a list variable.",
                ));
            }
            let name = match target.strip_suffix('=') {
                Some(stripped) => {
                    mark_used = true;
                    stripped.trim_end()
                }
                None => target.as_str(),
            };
            if is_scalar_var(name) {
                parsed.scalars.push(name.to_string());
            } else if is_list_var(name) {
                parsed.list = Some(name.to_string());
            } else {
                return Err(DataError::syntax(format!("Invalid variable to assign: {name}")));
            }
        }
        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.list.is_none()
    }

    pub fn targets(&self) -> Vec<String> {
        self.scalars.iter().chain(self.list.iter()).cloned().collect()
    }

    /// Stores `value` in the current variable scope and logs each
    /// assignment.
    pub fn assign(&self, ctx: &mut Context, value: Value) -> Result<(), DataError> {
        let max_length = ctx.settings().max_assign_length;
        for (name, value) in self.resolve(value)? {
            let message = format_assign_message(&name, &value, max_length);
            ctx.variables_mut().set(&name, value)?;
            ctx.info(message);
        }
        Ok(())
    }

    /// Pairs each target with the part of `value` it receives.
    pub fn resolve(&self, value: Value) -> Result<Vec<(String, Value)>, DataError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if value.is_null() {
            let mut pairs: Vec<(String, Value)> = self
                .scalars
                .iter()
                .map(|name| (name.clone(), Value::Null))
                .collect();
            if let Some(list) = &self.list {
                pairs.push((list.clone(), Value::Array(Vec::new())));
            }
            return Ok(pairs);
        }
        match &self.list {
            None => self.scalars_only(value),
            Some(list) => {
                let items = list_like(value)?;
                self.scalars_and_list(list, items)
            }
        }
    }

    fn scalars_only(&self, value: Value) -> Result<Vec<(String, Value)>, DataError> {
        let needed = self.scalars.len();
        if needed == 1 {
            return Ok(vec![(self.scalars[0].clone(), value)]);
        }
        let mut items = list_like(value)?;
        if items.len() < needed {
            return Err(need_more_values(items.len()));
        }
        let surplus = items.split_off(needed - 1);
        let mut pairs: Vec<(String, Value)> =
            self.scalars.iter().cloned().zip(items).collect();
        let last = if surplus.len() == 1 {
            surplus.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(surplus)
        };
        pairs.push((self.scalars[needed - 1].clone(), last));
        Ok(pairs)
    }

    fn scalars_and_list(
        &self,
        list: &str,
        mut items: Vec<Value>,
    ) -> Result<Vec<(String, Value)>, DataError> {
        let needed = self.scalars.len();
        if items.len() < needed {
            return Err(need_more_values(items.len()));
        }
        let rest = items.split_off(needed);
        let mut pairs: Vec<(String, Value)> =
            self.scalars.iter().cloned().zip(items).collect();
        pairs.push((list.to_string(), Value::Array(rest)));
        Ok(pairs)
    }
}

fn list_like(value: Value) -> Result<Vec<Value>, DataError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(DataError::new(format!(
            "Cannot assign return values: Expected list-like value, got {} instead.",
            type_name(&other)
        ))),
    }
}

fn need_more_values(got: usize) -> DataError {
    DataError::new(format!(
        "Cannot assign return values: Need more values than {got}."
    ))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dictionary",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn targets(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn assignment(items: &[&str]) -> VariableAssignment {
        VariableAssignment::new(&targets(items)).unwrap()
    }

    #[test]
    fn validation_errors_are_syntax_errors() {
        let err = VariableAssignment::new(&targets(&["${a}=", "${b}"])).unwrap_err();
        assert_eq!(err.message(), "Assign mark '=' can be used only with the last variable.");
        assert!(err.is_syntax());
        let err = VariableAssignment::new(&targets(&["@{a}", "${b}"])).unwrap_err();
        assert_eq!(err.message(), "Only the last variable to assign can be a list variable.");
        let err = VariableAssignment::new(&targets(&["foo"])).unwrap_err();
        assert_eq!(err.message(), "Invalid variable to assign: foo");
    }

    #[test]
    fn assign_mark_is_stripped() {
        assert_eq!(assignment(&["${a} ="]).targets(), ["${a}"]);
    }

    #[test]
    fn single_scalar_takes_whole_value() {
        let pairs = assignment(&["${a}"]).resolve(json!([1, 2])).unwrap();
        assert_eq!(pairs, vec![("${a}".to_string(), json!([1, 2]))]);
    }

    #[test]
    fn surplus_values_go_to_last_scalar() {
        let pairs = assignment(&["${a}", "${b}"]).resolve(json!([1, 2, 3])).unwrap();
        assert_eq!(
            pairs,
            vec![("${a}".to_string(), json!(1)), ("${b}".to_string(), json!([2, 3]))]
        );
        let pairs = assignment(&["${a}", "${b}"]).resolve(json!([1, 2])).unwrap();
        assert_eq!(pairs[1], ("${b}".to_string(), json!(2)));
    }

    #[test]
    fn list_target_takes_the_rest() {
        let pairs = assignment(&["${a}", "@{rest}"]).resolve(json!([1, 2, 3])).unwrap();
        assert_eq!(pairs[1], ("@{rest}".to_string(), json!([2, 3])));
    }

    #[test]
    fn null_assigns_none_and_empty_list() {
        let pairs = assignment(&["${a}", "@{rest}"]).resolve(Value::Null).unwrap();
        assert_eq!(
            pairs,
            vec![("${a}".to_string(), Value::Null), ("@{rest}".to_string(), json!([]))]
        );
    }

    #[test]
    fn value_errors() {
        let err = assignment(&["${a}", "${b}", "${c}"])
            .resolve(json!([1]))
            .unwrap_err();
        assert_eq!(err.message(), "Cannot assign return values: Need more values than 1.");
        let err = assignment(&["@{a}"]).resolve(json!("text")).unwrap_err();
        assert_eq!(
            err.message(),
            "Cannot assign return values: Expected list-like value, got string instead."
        );
    }
}

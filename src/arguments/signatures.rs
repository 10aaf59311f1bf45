use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::arguments::limits::ArgLimitChecker;
use crate::errors::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
}

impl ParamType {
    fn coercion_name(&self) -> Option<&'static str> {
        match self {
            ParamType::Integer => Some("integer"),
            ParamType::Float => Some("floating point number"),
            ParamType::Boolean => Some("boolean"),
            ParamType::String | ParamType::Array => None,
        }
    }

    fn coerce(&self, position: usize, text: &str) -> Result<Value, DataError> {
        let coerced = match self {
            ParamType::Integer => text.trim().parse::<i64>().ok().map(Number::from).map(Value::Number),
            ParamType::Float => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            ParamType::Boolean => match text.to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ParamType::String | ParamType::Array => Some(Value::String(text.to_string())),
        };
        coerced.ok_or_else(|| {
            DataError::new(format!(
                "Argument at position {position} cannot be coerced to {}.",
                self.coercion_name().unwrap_or("string")
            ))
        })
    }
}

/// Overloaded typed signatures of an externally described keyword.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signatures {
    signatures: Vec<Vec<ParamType>>,
}

impl Signatures {
    pub fn new(signatures: Vec<Vec<ParamType>>) -> Self {
        Self { signatures }
    }

    pub fn single(params: Vec<ParamType>) -> Self {
        Self::new(vec![params])
    }

    /// A lone signature ending with an array takes varargs; several
    /// signatures span the shortest to the longest parameter list.
    pub fn limits(&self) -> (usize, Option<usize>) {
        match self.signatures.as_slice() {
            [] => (0, Some(0)),
            [only] if only.last() == Some(&ParamType::Array) => (only.len() - 1, None),
            [only] => (only.len(), Some(only.len())),
            many => {
                let min = many.iter().map(Vec::len).min().unwrap_or(0);
                let max = many.iter().map(Vec::len).max().unwrap_or(0);
                (min, Some(max))
            }
        }
    }

    pub fn limit_checker(&self, keyword: &str) -> ArgLimitChecker {
        let (min, max) = self.limits();
        ArgLimitChecker::new(min, max, keyword)
    }

    fn varargs_index(&self) -> Option<usize> {
        match self.limits() {
            (min, None) => Some(min),
            _ => None,
        }
    }

    /// Packs values from the varargs position into one list unless the
    /// caller already passed exactly one list there.
    pub fn pack_varargs(&self, mut args: Vec<Value>) -> Vec<Value> {
        let Some(index) = self.varargs_index() else {
            return args;
        };
        let passing_list = args.len() == index + 1 && args.last().map_or(false, Value::is_array);
        if passing_list {
            return args;
        }
        let rest = if args.len() > index {
            args.split_off(index)
        } else {
            Vec::new()
        };
        args.push(Value::Array(rest));
        args
    }

    /// Converts string arguments to the primitive type declared at their
    /// position. Positions where signatures disagree are left untouched.
    pub fn coerce(&self, args: Vec<Value>) -> Result<Vec<Value>, DataError> {
        args.into_iter()
            .enumerate()
            .map(|(index, arg)| match (&arg, self.agreed_type(index)) {
                (Value::String(text), Some(param)) if param.coercion_name().is_some() => {
                    param.coerce(index + 1, text)
                }
                _ => Ok(arg),
            })
            .collect()
    }

    fn agreed_type(&self, index: usize) -> Option<ParamType> {
        let mut types = self.signatures.iter().filter_map(|sig| sig.get(index));
        let first = *types.next()?;
        types.all(|other| *other == first).then_some(first)
    }
}

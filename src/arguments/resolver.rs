use serde_json::{Map, Value};

use crate::arguments::spec::ArgumentSpec;
use crate::errors::DataError;
use crate::variables::{value_to_string, Replacer};

/// How a `name` in `name=value` is turned into a parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameCoercion {
    /// Library keywords use the name as written.
    Raw,
    /// User keyword parameters are stored as `${name}`.
    ScalarVariable,
}

impl NameCoercion {
    pub fn coerce(&self, name: &str) -> String {
        match self {
            NameCoercion::Raw => name.to_string(),
            NameCoercion::ScalarVariable => format!("${{{name}}}"),
        }
    }
}

/// Call-site tokens split into positional and named parts, still unresolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCall {
    pub positional: Vec<String>,
    pub named: Vec<(String, String)>,
}

impl RawCall {
    pub fn count(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn resolve(self, replacer: &dyn Replacer) -> Result<ResolvedCall, DataError> {
        let positional = replacer.replace_list(&self.positional)?;
        let mut named = Map::new();
        for (name, value) in self.named {
            named.insert(name, replacer.replace_scalar(&value)?);
        }
        Ok(ResolvedCall { positional, named })
    }

    /// Keeps tokens as text; used when variables are not available.
    pub fn unresolved(self) -> ResolvedCall {
        ResolvedCall {
            positional: self.positional.into_iter().map(Value::String).collect(),
            named: self
                .named
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedCall {
    pub positional: Vec<Value>,
    pub named: Map<String, Value>,
}

impl ResolvedCall {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: Map::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Positional value at `index` rendered as text.
    pub fn text(&self, index: usize) -> Option<String> {
        self.positional.get(index).map(value_to_string)
    }
}

pub struct ArgumentResolver<'a> {
    spec: &'a ArgumentSpec,
    coercion: NameCoercion,
}

impl<'a> ArgumentResolver<'a> {
    pub fn new(spec: &'a ArgumentSpec, coercion: NameCoercion) -> Self {
        Self { spec, coercion }
    }

    /// Only the tail after the mandatory arguments may hold named values. It
    /// is scanned right to left and scanning stops at the first token that is
    /// not `known_name=value`.
    pub fn resolve(&self, values: &[String]) -> Result<RawCall, DataError> {
        let mandatory = self.spec.minargs().min(values.len());
        let (head, tail) = values.split_at(mandatory);
        let slots = self.spec.names().len() - self.spec.minargs();
        let mut named: Vec<(String, String)> = Vec::new();
        let mut trailing = Vec::new();
        let mut named_allowed = true;
        for arg in tail.iter().rev() {
            if named_allowed && named.len() < slots {
                if let Some((name, value)) = self.split_named(arg) {
                    if named.iter().any(|(existing, _)| *existing == name) {
                        return Err(DataError::new(format!(
                            "Keyword argument '{}' repeated.",
                            self.display_name(&name)
                        )));
                    }
                    named.push((name, value));
                    continue;
                }
            }
            named_allowed = false;
            trailing.push(self.parse_positional(arg));
        }
        trailing.reverse();
        let mut positional = head.to_vec();
        positional.extend(trailing);
        named.reverse();
        Ok(RawCall { positional, named })
    }

    fn split_named(&self, arg: &str) -> Option<(String, String)> {
        let (name, value) = arg.split_once('=')?;
        if name.ends_with('\\') {
            return None;
        }
        let coerced = self.coercion.coerce(name);
        if self.spec.index_of(&coerced).is_some() {
            Some((coerced, value.to_string()))
        } else {
            None
        }
    }

    /// `name\=value` escapes named syntax for known names.
    fn parse_positional(&self, arg: &str) -> String {
        if let Some((name, _)) = arg.split_once("\\=") {
            if self.spec.index_of(&self.coercion.coerce(name)).is_some() {
                return arg.replacen("\\=", "=", 1);
            }
        }
        arg.to_string()
    }

    fn display_name(&self, coerced: &str) -> String {
        match self.coercion {
            NameCoercion::Raw => coerced.to_string(),
            NameCoercion::ScalarVariable => coerced[2..coerced.len() - 1].to_string(),
        }
    }
}

use serde_json::{Map, Number, Value};

use crate::errors::DataError;

/// Narrow interface the execution core uses for `${var}` substitution.
pub trait Replacer {
    /// Replaces variables in every item; a whole-item `@{list}` expands in place.
    fn replace_list(&self, items: &[String]) -> Result<Vec<Value>, DataError>;
    /// Replaces a single item. A whole-item `${var}` keeps the variable's value type.
    fn replace_scalar(&self, item: &str) -> Result<Value, DataError>;
    /// Replaces variables inside text, always producing text.
    fn replace_string(&self, text: &str) -> Result<String, DataError>;
}

pub fn is_scalar_var(item: &str) -> bool {
    is_var_with_prefix(item, '$')
}

pub fn is_list_var(item: &str) -> bool {
    is_var_with_prefix(item, '@')
}

pub fn is_var(item: &str) -> bool {
    is_scalar_var(item) || is_list_var(item)
}

fn is_var_with_prefix(item: &str, prefix: char) -> bool {
    let mut chars = item.chars();
    if chars.next() != Some(prefix) || chars.next() != Some('{') {
        return false;
    }
    match find_variable(item) {
        Some(found) => found.start == 0 && found.end == item.len(),
        None => false,
    }
}

/// Variable names ignore case, spaces and underscores.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn base_name(var: &str) -> &str {
    &var[2..var.len() - 1]
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(num) => num.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

pub fn format_assign_message(name: &str, value: &Value, max_length: usize) -> String {
    let formatted = match value {
        Value::Array(items) if is_list_var(name) => {
            let parts: Vec<String> = items.iter().map(value_to_string).collect();
            format!("[ {} ]", parts.join(" | "))
        }
        other => value_to_string(other),
    };
    format!("{name} = {}", cut_long_assign(&formatted, max_length))
}

fn cut_long_assign(text: &str, max_length: usize) -> String {
    if max_length == 0 || text.chars().count() <= max_length {
        return text.to_string();
    }
    let head: String = text.chars().take(max_length).collect();
    format!("{head}...")
}

struct FoundVariable {
    start: usize,
    end: usize,
    identifier: char,
}

/// Locates the first unescaped `${...}` or `@{...}` in `text`, honouring
/// nested braces such as `${outer_${inner}}`.
fn find_variable(text: &str) -> Option<FoundVariable> {
    let bytes = text.as_bytes();
    let mut index = 0;
    while index + 1 < bytes.len() {
        let byte = bytes[index];
        if byte == b'\\' {
            index += 2;
            continue;
        }
        if (byte == b'$' || byte == b'@') && bytes[index + 1] == b'{' {
            let mut depth = 0usize;
            let mut cursor = index + 1;
            while cursor < bytes.len() {
                match bytes[cursor] {
                    b'\\' => cursor += 1,
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(FoundVariable {
                                start: index,
                                end: cursor + 1,
                                identifier: byte as char,
                            });
                        }
                    }
                    _ => {}
                }
                cursor += 1;
            }
            return None;
        }
        index += 1;
    }
    None
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn builtin_value(name: &str) -> Option<Value> {
    match normalize_name(name).as_str() {
        "empty" => return Some(Value::String(String::new())),
        "space" => return Some(Value::String(" ".to_string())),
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "none" => return Some(Value::Null),
        _ => {}
    }
    let trimmed = name.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Value::Number(Number::from(int)));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Scope stack holding variable values. The bottom scope is global and stays
/// visible from every local scope; local scopes do not see each other.
#[derive(Debug, Clone)]
pub struct Variables {
    scopes: Vec<Map<String, Value>>,
}

impl Default for Variables {
    fn default() -> Self {
        Self::new()
    }
}

impl Variables {
    pub fn new() -> Self {
        Self {
            scopes: vec![Map::new()],
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn start_local_scope(&mut self) {
        self.scopes.push(Map::new());
    }

    pub fn end_local_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Sets `${name}` or `@{name}` in the innermost scope.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), DataError> {
        let key = Self::storage_key(name, &value)?;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(key, value);
        }
        Ok(())
    }

    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), DataError> {
        let key = Self::storage_key(name, &value)?;
        self.scopes[0].insert(key, value);
        Ok(())
    }

    fn storage_key(name: &str, value: &Value) -> Result<String, DataError> {
        if is_list_var(name) {
            if !value.is_array() {
                return Err(DataError::new(format!(
                    "Value of variable '{name}' is not list or list-like."
                )));
            }
        } else if !is_scalar_var(name) {
            return Err(DataError::new(format!("Invalid variable name '{name}'.")));
        }
        Ok(normalize_name(base_name(name)))
    }

    pub fn get(&self, name: &str) -> Result<Value, DataError> {
        if !is_var(name) {
            return Err(DataError::new(format!("Invalid variable name '{name}'.")));
        }
        let inner = self.replace_string(base_name(name))?;
        let decorated = format!("{}{{{}}}", &name[..1], inner);
        let value = self
            .lookup(&inner)
            .ok_or_else(|| DataError::new(format!("Variable '{decorated}' not found.")))?;
        if is_list_var(name) && !value.is_array() {
            return Err(DataError::new(format!(
                "Value of variable '{decorated}' is not list or list-like."
            )));
        }
        Ok(value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    fn lookup(&self, inner: &str) -> Option<Value> {
        let key = normalize_name(inner);
        if let Some(value) = self.scopes.last().and_then(|scope| scope.get(&key)) {
            return Some(value.clone());
        }
        if let Some(value) = self.scopes.first().and_then(|scope| scope.get(&key)) {
            return Some(value.clone());
        }
        builtin_value(inner)
    }
}

impl Replacer for Variables {
    fn replace_list(&self, items: &[String]) -> Result<Vec<Value>, DataError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if is_list_var(item) {
                if let Value::Array(values) = self.get(item)? {
                    out.extend(values);
                }
            } else {
                out.push(self.replace_scalar(item)?);
            }
        }
        Ok(out)
    }

    fn replace_scalar(&self, item: &str) -> Result<Value, DataError> {
        if is_var(item) {
            return self.get(item);
        }
        self.replace_string(item).map(Value::String)
    }

    fn replace_string(&self, text: &str) -> Result<String, DataError> {
        let mut out = String::new();
        let mut rest = text;
        while let Some(found) = find_variable(rest) {
            out.push_str(&unescape(&rest[..found.start]));
            let var = &rest[found.start..found.end];
            let value = self.get(var)?;
            if found.identifier == '@' {
                if let Value::Array(items) = &value {
                    let parts: Vec<String> = items.iter().map(value_to_string).collect();
                    out.push_str(&format!("[{}]", parts.join(", ")));
                }
            } else {
                out.push_str(&value_to_string(&value));
            }
            rest = &rest[found.end..];
        }
        out.push_str(&unescape(rest));
        Ok(out)
    }
}

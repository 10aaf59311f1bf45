use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::arith;
use crate::errors::DataError;
use crate::keyword::data_failure;
use crate::outcome::{Failures, Outcome};
use crate::output::StatusReporter;
use crate::registry::Context;
use crate::result::{KeywordResult, NodeType};
use crate::steps::{Keywords, Step};
use crate::variables::{is_scalar_var, value_to_string, Replacer};

const MAX_RANGE_DIGITS: u32 = 10;

type Rounds = Box<dyn Iterator<Item = Vec<Value>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForFlavor {
    #[default]
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "IN RANGE")]
    InRange,
    #[serde(rename = "IN ENUMERATE")]
    InEnumerate,
    #[serde(rename = "IN ZIP")]
    InZip,
}

impl ForFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForFlavor::In => "IN",
            ForFlavor::InRange => "IN RANGE",
            ForFlavor::InEnumerate => "IN ENUMERATE",
            ForFlavor::InZip => "IN ZIP",
        }
    }
}

/// `FOR ${i} IN RANGE 3` and friends. Values are resolved when the loop
/// starts; loop variables are set in the enclosing scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForLoop {
    #[serde(rename = "for")]
    pub vars: Vec<String>,
    #[serde(default)]
    pub flavor: ForFlavor,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub body: Vec<Step>,
}

impl ForLoop {
    pub fn new<I, S>(vars: I, flavor: ForFlavor) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(Into::into).collect(),
            flavor,
            values: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_body(mut self, body: Vec<Step>) -> Self {
        self.body = body;
        self
    }

    /// `${i} IN RANGE [ 1 | 4 ]`
    pub fn display_name(&self) -> String {
        format!(
            "{} {} [ {} ]",
            self.vars.join(" | "),
            self.flavor.as_str(),
            self.values.join(" | ")
        )
    }

    pub fn run(&self, ctx: &mut Context) -> Outcome {
        let node = KeywordResult::new(self.display_name(), NodeType::ForLoop);
        let mut reporter = StatusReporter::start(ctx, node);
        let outcome = match self.validate() {
            Ok(()) => self.run_loop(&mut reporter),
            Err(err) => data_failure(&mut reporter, err),
        };
        reporter.finish(&outcome);
        outcome
    }

    fn validate(&self) -> Result<(), DataError> {
        if self.vars.is_empty() {
            return Err(DataError::syntax("FOR loop has no loop variables."));
        }
        if let Some(invalid) = self.vars.iter().find(|var| !is_scalar_var(var)) {
            return Err(DataError::syntax(format!(
                "Invalid FOR loop variable '{invalid}'."
            )));
        }
        if self.values.is_empty() {
            return Err(DataError::syntax("FOR loop has no loop values."));
        }
        if self.body.is_empty() {
            return Err(DataError::syntax("FOR loop contains no keywords."));
        }
        Ok(())
    }

    fn run_loop(&self, ctx: &mut Context) -> Outcome {
        let rounds: Rounds = if ctx.dry_run() {
            let names = self.vars.iter().cloned().map(Value::String).collect();
            Box::new(std::iter::once(names))
        } else {
            match self.rounds(ctx) {
                Ok(rounds) => rounds,
                Err(err) => return data_failure(ctx, err),
            }
        };
        let mut errors = Failures::new();
        for values in rounds {
            match self.run_round(ctx, values) {
                Outcome::Passed(_) => {}
                Outcome::Continue(earlier) => errors.extend(earlier),
                Outcome::Break(earlier) => {
                    errors.extend(earlier);
                    break;
                }
                pass @ Outcome::Pass { .. } => return pass.with_earlier_failures(&errors),
                Outcome::Failed(failures) => {
                    let can_continue = failures.can_continue(ctx.continue_context());
                    errors.extend(failures);
                    if !can_continue {
                        break;
                    }
                }
            }
        }
        if errors.is_empty() {
            Outcome::passed()
        } else {
            Outcome::Failed(errors)
        }
    }

    fn run_round(&self, ctx: &mut Context, values: Vec<Value>) -> Outcome {
        let assigned = self.map_variables(values);
        let name = assigned
            .iter()
            .map(|(var, value)| format!("{var} = {}", value_to_string(value)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut reporter = StatusReporter::start(ctx, KeywordResult::new(name, NodeType::ForIteration));
        for (var, value) in assigned {
            if let Err(err) = reporter.set_variable(&var, value) {
                let outcome = data_failure(&mut reporter, err);
                reporter.finish(&outcome);
                return outcome;
            }
        }
        let outcome = Keywords::new(&self.body).run(&mut reporter);
        reporter.finish(&outcome);
        outcome
    }

    /// A single variable receives the whole group as a list.
    fn map_variables(&self, values: Vec<Value>) -> Vec<(String, Value)> {
        if self.vars.len() == 1 && values.len() != 1 {
            return vec![(self.vars[0].clone(), Value::Array(values))];
        }
        self.vars.iter().cloned().zip(values).collect()
    }

    fn rounds(&self, ctx: &Context) -> Result<Rounds, DataError> {
        let per_round = self.vars.len();
        let rounds = match self.flavor {
            ForFlavor::In => {
                let values = ctx.variables().replace_list(&self.values)?;
                chunk(values, per_round)?
            }
            ForFlavor::InRange => {
                let values = ctx.variables().replace_list(&self.values)?;
                return chunk_range(range_values(&values)?, per_round);
            }
            ForFlavor::InEnumerate => self.enumerate_rounds(ctx)?,
            ForFlavor::InZip => {
                let values = ctx.variables().replace_list(&self.values)?;
                zip_rounds(values, per_round)?
            }
        };
        Ok(Box::new(rounds.into_iter()))
    }

    fn enumerate_rounds(&self, ctx: &Context) -> Result<Vec<Vec<Value>>, DataError> {
        let (start, items) = match self.values.split_last() {
            Some((last, rest)) if last.starts_with("start=") => {
                if rest.is_empty() {
                    return Err(DataError::syntax("FOR loop has no loop values."));
                }
                let start = ctx.variables().replace_string(&last["start=".len()..])?;
                let start = start.trim().parse::<i64>().map_err(|_| {
                    DataError::new(format!("Invalid FOR IN ENUMERATE start value '{start}'."))
                })?;
                (start, rest)
            }
            _ => (0, self.values.as_slice()),
        };
        let values = ctx.variables().replace_list(items)?;
        let per_round = self.vars.len().saturating_sub(1).max(1);
        if values.len() % per_round != 0 {
            return Err(DataError::new(format!(
                "Number of FOR IN ENUMERATE loop values should be multiple of its variables \
                 (excluding the index). Got {per_round} variables but {} value{}.",
                values.len(),
                plural(values.len())
            )));
        }
        Ok(values
            .chunks(per_round)
            .zip(start..)
            .map(|(group, index)| {
                let mut round = vec![Value::Number(Number::from(index))];
                round.extend_from_slice(group);
                round
            })
            .collect())
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn wrong_value_count(variables: usize, values: usize) -> DataError {
    DataError::new(format!(
        "Number of FOR loop values should be multiple of its variables. \
         Got {variables} variables but {values} value{}.",
        plural(values)
    ))
}

fn chunk(values: Vec<Value>, per_round: usize) -> Result<Vec<Vec<Value>>, DataError> {
    if values.len() % per_round != 0 {
        return Err(wrong_value_count(per_round, values.len()));
    }
    Ok(values.chunks(per_round).map(<[Value]>::to_vec).collect())
}

/// Range rounds are produced on demand; only the value count is checked
/// up front.
fn chunk_range(range: RangeValues, per_round: usize) -> Result<Rounds, DataError> {
    let count = range.remaining();
    if count % per_round as i128 != 0 {
        return Err(DataError::new(format!(
            "Number of FOR loop values should be multiple of its variables. \
             Got {per_round} variables but {count} value{}.",
            if count == 1 { "" } else { "s" }
        )));
    }
    let mut range = range;
    Ok(Box::new(std::iter::from_fn(move || {
        let group: Vec<Value> = range.by_ref().take(per_round).collect();
        (!group.is_empty()).then_some(group)
    })))
}

fn zip_rounds(values: Vec<Value>, per_round: usize) -> Result<Vec<Vec<Value>>, DataError> {
    let mut lists = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Array(items) => lists.push(items),
            other => {
                return Err(DataError::new(format!(
                    "FOR IN ZIP items must all be list-like, got {} '{}'.",
                    type_name(&other),
                    value_to_string(&other)
                )))
            }
        }
    }
    if per_round != 1 && lists.len() != per_round {
        return Err(wrong_value_count(per_round, lists.len()));
    }
    let shortest = lists.iter().map(Vec::len).min().unwrap_or(0);
    Ok((0..shortest)
        .map(|index| lists.iter().map(|list| list[index].clone()).collect())
        .collect())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "boolean",
        Value::Number(num) if num.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dictionary",
    }
}

fn range_values(values: &[Value]) -> Result<RangeValues, DataError> {
    if !(1..=3).contains(&values.len()) {
        return Err(DataError::new(format!(
            "FOR IN RANGE expected 1-3 values, got {}.",
            values.len()
        )));
    }
    let numbers = values
        .iter()
        .map(to_number)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| DataError::new(format!("Converting FOR IN RANGE values failed: {err}.")))?;
    let (start, stop, step) = match numbers.as_slice() {
        [stop] => (Number::from(0), stop.clone(), Number::from(1)),
        [start, stop] => (start.clone(), stop.clone(), Number::from(1)),
        [start, stop, step, ..] => (start.clone(), stop.clone(), step.clone()),
        [] => (Number::from(0), Number::from(0), Number::from(1)),
    };
    RangeValues::new(&start, &stop, &step)
}

fn to_number(value: &Value) -> Result<Number, String> {
    match value {
        Value::Number(num) => Ok(num.clone()),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(int) = text.parse::<i64>() {
                return Ok(Number::from(int));
            }
            if let Some(float) = text.parse::<f64>().ok().and_then(Number::from_f64) {
                return Ok(float);
            }
            match arith::evaluate(text)? {
                Value::Number(num) => Ok(num),
                other => Err(format!("Expected number, got {}", type_name(&other))),
            }
        }
        other => Err(format!("Expected number, got {}", type_name(other))),
    }
}

#[derive(Debug, Clone, Copy)]
enum RangeKind {
    Integer { start: i128, step: i128 },
    /// Bounds scaled by `factor` so short decimals stay exact.
    Scaled { start: i128, step: i128, factor: f64 },
    Float { start: f64, step: f64 },
}

/// Lazily produced `IN RANGE` values. Integer bounds give integers; any
/// float bound gives floats.
#[derive(Debug, Clone)]
struct RangeValues {
    kind: RangeKind,
    index: i128,
    count: i128,
}

impl RangeValues {
    fn new(start: &Number, stop: &Number, step: &Number) -> Result<Self, DataError> {
        let bounds = [start, stop, step];
        let (kind, count) = if bounds.iter().all(|num| !num.is_f64()) {
            let [start, stop, step] = bounds.map(as_i128);
            (RangeKind::Integer { start, step }, int_count(start, stop, step))
        } else {
            match scale(&bounds) {
                Some(([start, stop, step], factor)) => {
                    (RangeKind::Scaled { start, step, factor }, int_count(start, stop, step))
                }
                None => {
                    let [start, stop, step] = bounds.map(|num| num.as_f64().unwrap_or(0.0));
                    let count = ((stop - start) / step).ceil();
                    let count = if count.is_finite() && count > 0.0 { count as i128 } else { 0 };
                    (RangeKind::Float { start, step }, count)
                }
            }
        };
        let zero_step = match kind {
            RangeKind::Integer { step, .. } | RangeKind::Scaled { step, .. } => step == 0,
            RangeKind::Float { step, .. } => step == 0.0,
        };
        if zero_step {
            return Err(DataError::new(
                "Converting FOR IN RANGE values failed: step cannot be zero.",
            ));
        }
        Ok(Self { kind, index: 0, count })
    }

    fn remaining(&self) -> i128 {
        self.count - self.index
    }
}

impl Iterator for RangeValues {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.index >= self.count {
            return None;
        }
        let index = self.index;
        self.index += 1;
        let value = match self.kind {
            RangeKind::Integer { start, step } => {
                return Some(Value::from((start + index * step) as i64));
            }
            RangeKind::Scaled { start, step, factor } => (start + index * step) as f64 / factor,
            RangeKind::Float { start, step } => start + index as f64 * step,
        };
        Some(Number::from_f64(value).map_or(Value::Null, Value::Number))
    }
}

fn as_i128(num: &Number) -> i128 {
    num.as_i64()
        .map(i128::from)
        .or_else(|| num.as_u64().map(i128::from))
        .unwrap_or(0)
}

fn int_count(start: i128, stop: i128, step: i128) -> i128 {
    let span = stop - start;
    match step {
        step if step > 0 && span > 0 => (span + step - 1) / step,
        step if step < 0 && span < 0 => (span + step + 1) / step,
        _ => 0,
    }
}

/// Scales every bound to an integer by the largest number of decimals.
/// Bounds in exponent form or with too many decimals are left to float
/// arithmetic.
fn scale(bounds: &[&Number; 3]) -> Option<([i128; 3], f64)> {
    let mut digits = 0;
    for num in bounds {
        digits = digits.max(decimals(num)?);
    }
    let factor = 10f64.powi(digits as i32);
    let mut scaled = [0i128; 3];
    for (slot, num) in scaled.iter_mut().zip(bounds) {
        *slot = if num.is_f64() {
            let value = (num.as_f64()? * factor).round();
            if !value.is_finite() || value.abs() >= i64::MAX as f64 {
                return None;
            }
            value as i128
        } else {
            as_i128(num) * 10i128.pow(digits)
        };
    }
    Some((scaled, factor))
}

fn decimals(num: &Number) -> Option<u32> {
    if !num.is_f64() {
        return Some(0);
    }
    let text = num.to_string();
    if text.contains(['e', 'E']) {
        return None;
    }
    let places = text
        .split_once('.')
        .map(|(_, fraction)| fraction.trim_end_matches('0').len())
        .unwrap_or(0) as u32;
    (places <= MAX_RANGE_DIGITS).then_some(places)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<Value> {
        items.iter().map(|item| json!(item)).collect()
    }

    fn range(items: &[&str]) -> Vec<Value> {
        range_values(&strings(items)).unwrap().collect()
    }

    #[test]
    fn integer_ranges() {
        assert_eq!(range(&["3"]), vec![json!(0), json!(1), json!(2)]);
        assert_eq!(range(&["1", "4", "2"]), vec![json!(1), json!(3)]);
        assert_eq!(range(&["3", "0", "-1"]), vec![json!(3), json!(2), json!(1)]);
        assert_eq!(range(&["1+1", "2*2"]), vec![json!(2), json!(3)]);
        assert!(range(&["3", "1"]).is_empty());
    }

    #[test]
    fn float_ranges() {
        assert_eq!(
            range(&["0", "1", "0.25"]),
            vec![json!(0.0), json!(0.25), json!(0.5), json!(0.75)]
        );
        assert_eq!(range(&["0", "0.3", "0.1"]), vec![json!(0.0), json!(0.1), json!(0.2)]);
    }

    #[test]
    fn ranges_at_the_integer_limits() {
        assert_eq!(
            range(&["9223372036854775806", "9223372036854775807", "5"]),
            vec![json!(i64::MAX - 1)]
        );
        assert_eq!(
            range(&["-9223372036854775807", "-9223372036854775808", "-3"]),
            vec![json!(i64::MIN + 1)]
        );
        let full = range_values(&strings(&["-9223372036854775808", "9223372036854775807"])).unwrap();
        assert_eq!(full.remaining(), i128::from(u64::MAX));
        assert_eq!(full.take(2).collect::<Vec<_>>(), vec![json!(i64::MIN), json!(i64::MIN + 1)]);
        let err = range_values(&strings(&["(-9223372036854775807-1)/(-1)"])).unwrap_err();
        assert_eq!(err.message(), "Converting FOR IN RANGE values failed: integer overflow.");
    }

    #[test]
    fn tiny_steps_and_large_ranges_stay_lazy() {
        let tiny = range(&["0", "0.00000000002", "0.00000000001"]);
        assert_eq!(tiny, vec![json!(0.0), json!(0.00000000001)]);
        let huge = range_values(&[json!(1e15)]).unwrap();
        assert_eq!(huge.remaining(), 1_000_000_000_000_000);
        assert_eq!(huge.take(2).collect::<Vec<_>>(), vec![json!(0.0), json!(1.0)]);
        let rounds = chunk_range(range_values(&[json!(1e15)]).unwrap(), 2).unwrap();
        assert_eq!(rounds.take(1).collect::<Vec<_>>(), vec![vec![json!(0.0), json!(1.0)]]);
        assert!(chunk_range(range_values(&strings(&["3"])).unwrap(), 2).is_err());
    }

    #[test]
    fn invalid_ranges() {
        let err = range_values(&strings(&["1", "2", "3", "4"])).unwrap_err();
        assert_eq!(err.message(), "FOR IN RANGE expected 1-3 values, got 4.");
        let err = range_values(&strings(&["x"])).unwrap_err();
        assert!(err.message().starts_with("Converting FOR IN RANGE values failed: "));
        assert!(range_values(&strings(&["0", "5", "0"])).is_err());
    }

    #[test]
    fn values_are_chunked_per_variable() {
        let rounds = chunk(strings(&["a", "b", "c", "d"]), 2).unwrap();
        assert_eq!(rounds, vec![strings(&["a", "b"]), strings(&["c", "d"])]);
        let err = chunk(strings(&["a", "b", "c"]), 2).unwrap_err();
        assert_eq!(
            err.message(),
            "Number of FOR loop values should be multiple of its variables. Got 2 variables but 3 values."
        );
    }

    #[test]
    fn zip_stops_at_shortest_list() {
        let rounds = zip_rounds(vec![json!([1, 2, 3]), json!(["a", "b"])], 2).unwrap();
        assert_eq!(rounds, vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]]);
        let err = zip_rounds(vec![json!([1]), json!("x")], 2).unwrap_err();
        assert_eq!(err.message(), "FOR IN ZIP items must all be list-like, got string 'x'.");
    }

    #[test]
    fn loop_node_name() {
        let for_loop = ForLoop::new(["${i}"], ForFlavor::InRange).with_values(["1", "4"]);
        assert_eq!(for_loop.display_name(), "${i} IN RANGE [ 1 | 4 ]");
    }

    #[test]
    fn flavor_names_deserialize() {
        let for_loop: ForLoop = serde_json::from_value(json!({
            "for": ["${x}"],
            "flavor": "IN ENUMERATE",
            "values": ["a"],
            "body": [{"name": "Log", "args": ["${x}"]}]
        }))
        .unwrap();
        assert_eq!(for_loop.flavor, ForFlavor::InEnumerate);
        assert_eq!(for_loop.body.len(), 1);
    }
}

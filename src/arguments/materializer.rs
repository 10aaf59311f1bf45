use serde_json::Value;

use crate::arguments::limits::ArgLimitChecker;
use crate::arguments::resolver::ResolvedCall;
use crate::arguments::spec::ArgumentSpec;
use crate::errors::DataError;

/// Builds the final ordered argument list of a user keyword: fixed slots
/// first (defaults pre-filled), then any varargs values.
pub fn materialize(
    call: ResolvedCall,
    spec: &ArgumentSpec,
    defaults: Vec<Value>,
    checker: &ArgLimitChecker,
    given_count: usize,
) -> Result<Vec<Value>, DataError> {
    let fixed = spec.names().len();
    let mut positional = call.positional;
    let varargs = if spec.varargs().is_some() && positional.len() > fixed {
        positional.split_off(fixed)
    } else {
        Vec::new()
    };

    let mut slots: Vec<Option<Value>> = vec![None; spec.minargs()];
    slots.extend(defaults.into_iter().map(Some));
    slots.resize(fixed, None);
    let mut written = vec![false; fixed];

    for (name, value) in call.named {
        let index = spec.index_of(&name).ok_or_else(|| {
            DataError::new(format!("Keyword got an unexpected argument '{name}'."))
        })?;
        write_slot(&mut slots, &mut written, index, value, spec, checker)?;
    }
    for (index, value) in positional.into_iter().enumerate() {
        if index >= fixed {
            return Err(DataError::new(format!(
                "Keyword '{}' got too many positional arguments.",
                checker.name()
            )));
        }
        write_slot(&mut slots, &mut written, index, value, spec, checker)?;
    }

    checker.check_missing(&slots, given_count)?;
    let mut values: Vec<Value> = slots.into_iter().flatten().collect();
    values.extend(varargs);
    Ok(values)
}

fn write_slot(
    slots: &mut [Option<Value>],
    written: &mut [bool],
    index: usize,
    value: Value,
    spec: &ArgumentSpec,
    checker: &ArgLimitChecker,
) -> Result<(), DataError> {
    if written[index] {
        return Err(DataError::new(format!(
            "Keyword '{}' got multiple values for argument '{}'.",
            checker.name(),
            spec.names()[index]
        )));
    }
    written[index] = true;
    slots[index] = Some(value);
    Ok(())
}

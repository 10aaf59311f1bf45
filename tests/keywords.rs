use anyhow::Result;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use keyword_kernel_rs::{
    register_builtin, ArgumentSpec, CallArgs, Context, KeywordError, Keyword, Keywords, Outcome,
    Registry, Status, Step,
};

fn recording_registry() -> (Registry, Arc<Mutex<Vec<String>>>) {
    let registry = Registry::new();
    register_builtin(&registry);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let seen = calls.clone();
    registry.register(
        "Record",
        ArgumentSpec::positional(["name"]),
        move |_ctx: &mut Context, args: CallArgs| {
            seen.lock().unwrap().push(args.text(0).unwrap_or_default());
            Ok(Value::Null)
        },
    );

    let seen = calls.clone();
    registry.register(
        "Fail Softly",
        ArgumentSpec::positional(["name"]),
        move |_ctx: &mut Context, args: CallArgs| {
            let name = args.text(0).unwrap_or_default();
            seen.lock().unwrap().push(name.clone());
            Err(KeywordError::continuable(format!("{name} failed")).into())
        },
    );

    let seen = calls.clone();
    registry.register(
        "Fail Hard",
        ArgumentSpec::positional(["name"]),
        move |_ctx: &mut Context, args: CallArgs| {
            let name = args.text(0).unwrap_or_default();
            seen.lock().unwrap().push(name.clone());
            Err(KeywordError::new(format!("{name} failed")).into())
        },
    );

    (registry, calls)
}

fn step(name: &str, args: &[&str]) -> Step {
    Keyword::new(name).with_args(args.iter().copied()).into()
}

#[test]
fn templated_sequence_runs_every_step_and_aggregates_failures() -> Result<()> {
    let (registry, calls) = recording_registry();
    let mut ctx = registry.context();
    let steps = vec![
        step("Record", &["A"]),
        step("Fail Softly", &["B"]),
        step("Record", &["C"]),
    ];

    let outcome = ctx.with_templated(true, |ctx| Keywords::new(&steps).run(ctx));

    assert_eq!(*calls.lock().unwrap(), ["A", "B", "C"]);
    match outcome {
        Outcome::Failed(failures) => assert_eq!(failures.message(), "B failed"),
        other => panic!("expected failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn teardown_context_continues_after_ordinary_failure() -> Result<()> {
    let (registry, calls) = recording_registry();
    let steps = vec![
        step("Record", &["A"]),
        step("Fail Hard", &["B"]),
        step("Record", &["C"]),
    ];

    let mut ctx = registry.context();
    let outcome = ctx.in_teardown_scope(|ctx| Keywords::new(&steps).run(ctx));
    assert!(outcome.is_failed());
    assert_eq!(*calls.lock().unwrap(), ["A", "B", "C"]);

    calls.lock().unwrap().clear();
    let mut ctx = registry.context();
    let outcome = Keywords::new(&steps).run(&mut ctx);
    assert!(outcome.is_failed());
    assert_eq!(*calls.lock().unwrap(), ["A", "B"]);
    Ok(())
}

#[test]
fn continuable_failures_are_collected_in_order() -> Result<()> {
    let (registry, calls) = recording_registry();
    let mut ctx = registry.context();
    let steps = vec![
        step("Fail Softly", &["first"]),
        step("Fail Softly", &["second"]),
        step("Record", &["last"]),
    ];

    let outcome = Keywords::new(&steps).run(&mut ctx);

    assert_eq!(*calls.lock().unwrap(), ["first", "second", "last"]);
    assert_eq!(
        outcome.message(),
        "Several failures occurred:\n\n1) first failed\n\n2) second failed"
    );
    Ok(())
}

#[test]
fn return_value_is_assigned_to_variables() -> Result<()> {
    let (registry, _calls) = recording_registry();
    let mut ctx = registry.context();
    let steps = vec![
        Keyword::new("Set Variable")
            .with_args(["a", "b", "c"])
            .with_assign(["${first}", "@{rest}"])
            .into(),
        step("Record", &["${first}"]),
    ];

    let outcome = Keywords::new(&steps).run(&mut ctx);

    assert_eq!(outcome, Outcome::passed());
    assert_eq!(ctx.variables().get("${first}")?, json!("a"));
    assert_eq!(ctx.variables().get("@{rest}")?, json!(["b", "c"]));
    let node = &ctx.output().results()[0];
    assert!(node
        .messages
        .iter()
        .any(|message| message.message == "${first} = a"));
    Ok(())
}

#[test]
fn invalid_assignment_is_a_syntax_failure() -> Result<()> {
    let (registry, calls) = recording_registry();
    let mut ctx = registry.context();
    let keyword = Keyword::new("Record")
        .with_args(["x"])
        .with_assign(["@{list}", "${scalar}"]);

    let outcome = ctx.with_templated(true, |ctx| keyword.run(ctx));

    match outcome {
        Outcome::Failed(failures) => {
            assert!(failures.is_syntax());
            assert_eq!(
                failures.message(),
                "Only the last variable to assign can be a list variable."
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(calls.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn arity_errors_name_the_keyword() -> Result<()> {
    let (registry, _calls) = recording_registry();
    let mut ctx = registry.context();

    let outcome = ctx.run_keyword("Record", vec!["a".into(), "b".into()]);

    assert_eq!(
        outcome.message(),
        "Keyword 'Record' expected 1 argument, got 2."
    );
    let node = &ctx.output().results()[0];
    assert_eq!(node.status, Status::Fail);
    assert_eq!(node.name, "Record");
    Ok(())
}

#[test]
fn unknown_and_ambiguous_keywords_fail() -> Result<()> {
    let (registry, _calls) = recording_registry();
    registry.register_in_library(
        "Other",
        "Log",
        ArgumentSpec::any(),
        |_ctx: &mut Context, _args: CallArgs| Ok(Value::Null),
    );
    let mut ctx = registry.context();

    assert_eq!(
        ctx.run_keyword("Nope", Vec::new()).message(),
        "No keyword with name 'Nope' found."
    );
    assert_eq!(
        ctx.run_keyword("log", vec!["x".into()]).message(),
        "Multiple keywords with name 'log' found."
    );
    assert!(!ctx
        .run_keyword("BuiltIn.Log", vec!["x".into()])
        .is_failed());
    Ok(())
}

#[test]
fn empty_failure_message_gets_a_default() -> Result<()> {
    let registry = Registry::new();
    registry.register(
        "Silent",
        ArgumentSpec::default(),
        |_ctx: &mut Context, _args: CallArgs| Err(anyhow::anyhow!("")),
    );
    let mut ctx = registry.context();

    let outcome = ctx.run_keyword("Silent", Vec::new());

    assert_eq!(outcome.message(), "Keyword failed without a message.");
    Ok(())
}

#[test]
fn timeouts_set_the_context_flag_and_stop_everywhere() -> Result<()> {
    let registry = Registry::new();
    registry.register(
        "Slow",
        ArgumentSpec::default(),
        |_ctx: &mut Context, _args: CallArgs| {
            Err(KeywordError::timeout("Keyword timeout 1 second exceeded.").into())
        },
    );
    let mut ctx = registry.context();
    let steps = vec![step("Slow", &[]), step("Slow", &[])];

    let outcome = ctx.in_teardown_scope(|ctx| Keywords::new(&steps).run(ctx));

    assert!(ctx.timeout_occurred());
    match outcome {
        Outcome::Failed(failures) => {
            assert!(failures.is_timeout());
            assert_eq!(failures.len(), 1);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn recursion_is_limited() -> Result<()> {
    let registry = Registry::new();
    registry.register(
        "Recurse",
        ArgumentSpec::default(),
        |ctx: &mut Context, _args: CallArgs| match ctx.run_keyword("Recurse", Vec::new()) {
            Outcome::Failed(failures) => Err(KeywordError::new(failures.message()).into()),
            _ => Ok(Value::Null),
        },
    );
    let mut ctx = registry.context();

    let outcome = ctx.run_keyword("Recurse", Vec::new());

    assert_eq!(
        outcome.message(),
        "Maximum limit of started keywords exceeded."
    );
    assert_eq!(ctx.scope_depth(), 0);
    Ok(())
}

#[test]
fn run_keyword_and_continue_on_failure_lets_the_sequence_go_on() -> Result<()> {
    let (registry, calls) = recording_registry();
    let mut ctx = registry.context();
    let steps = vec![
        step("Run Keyword And Continue On Failure", &["Fail Hard", "A"]),
        step("Record", &["B"]),
    ];

    let outcome = Keywords::new(&steps).run(&mut ctx);

    assert_eq!(*calls.lock().unwrap(), ["A", "B"]);
    assert_eq!(outcome.message(), "A failed");
    Ok(())
}

#[test]
fn run_keyword_and_continue_on_failure_resolves_arguments_once() -> Result<()> {
    let (registry, _calls) = recording_registry();
    let mut ctx = registry.context();
    ctx.set_global_variable("${template}", json!("${undefined}"))?;
    ctx.set_global_variable("${number}", json!(5))?;

    assert_eq!(ctx.run_keyword("Log", vec!["${template}".into()]), Outcome::passed());
    assert_eq!(
        ctx.run_keyword(
            "Run Keyword And Continue On Failure",
            vec!["Log".into(), "${template}".into()]
        ),
        Outcome::passed()
    );
    assert_eq!(
        ctx.run_keyword(
            "Run Keyword And Continue On Failure",
            vec!["Set Variable".into(), "${number}".into()]
        ),
        Outcome::Passed(json!(5))
    );
    let outer = &ctx.output().results()[1];
    assert_eq!(outer.resolved_args, Some(vec![json!("Log"), json!("${template}")]));
    assert_eq!(outer.children[0].resolved_args, Some(vec![json!("${undefined}")]));
    Ok(())
}

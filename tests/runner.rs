use anyhow::Result;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use keyword_kernel_rs::{
    register_builtin, ArgumentSpec, CallArgs, Context, Fixture, ForFlavor, ForLoop, Keyword,
    NodeType, Registry, ResourceData, RunSettings, Status, Step, TestCase, UserKeyword,
};

fn call(name: &str, args: &[&str]) -> Step {
    Keyword::new(name).with_args(args.iter().copied()).into()
}

fn counting_registry() -> (Registry, Arc<Mutex<usize>>) {
    let registry = Registry::new();
    register_builtin(&registry);
    let count = Arc::new(Mutex::new(0));
    let counter = count.clone();
    registry.register(
        "Count",
        ArgumentSpec::positional(["a", "b"]),
        move |_ctx: &mut Context, _args: CallArgs| {
            *counter.lock().unwrap() += 1;
            Ok(Value::Null)
        },
    );
    (registry, count)
}

#[test]
fn passing_test_keeps_its_keyword_tree() -> Result<()> {
    let (registry, count) = counting_registry();
    let mut ctx = registry.context();
    let test = TestCase::new("Simple", vec![call("Count", &["1", "2"]), call("Log", &["hi"])])
        .with_setup(Fixture::new("Count", ["s", "s"]))
        .with_teardown(Fixture::new("Count", ["t", "t"]));

    let result = test.run(&mut ctx);

    assert!(result.passed());
    assert_eq!(*count.lock().unwrap(), 3);
    let types: Vec<NodeType> = result.keywords.iter().map(|kw| kw.node_type).collect();
    assert_eq!(
        types,
        [NodeType::Setup, NodeType::Keyword, NodeType::Keyword, NodeType::Teardown]
    );
    assert!(ctx.output().results().is_empty());
    assert_eq!(result.to_json()["status"], json!("PASS"));
    Ok(())
}

#[test]
fn failing_setup_skips_the_body_but_runs_teardown() -> Result<()> {
    let (registry, count) = counting_registry();
    let mut ctx = registry.context();
    let test = TestCase::new("Setup fails", vec![call("Count", &["1", "2"])])
        .with_setup(Fixture::new("Fail", ["no setup"]))
        .with_teardown(Fixture::new("Fail", ["no teardown"]));

    let result = test.run(&mut ctx);

    assert_eq!(result.status, Status::Fail);
    assert_eq!(
        result.message,
        "Setup failed:\nno setup\n\nAlso teardown failed:\nno teardown"
    );
    assert_eq!(*count.lock().unwrap(), 0);
    Ok(())
}

#[test]
fn teardown_only_failure_and_none_fixtures() -> Result<()> {
    let (registry, _count) = counting_registry();
    let mut ctx = registry.context();
    ctx.set_global_variable("${cleanup}", json!("None"))?;

    let result = TestCase::new("Teardown fails", vec![call("No Operation", &[])])
        .with_teardown(Fixture::new("Fail", ["cleanup broke"]))
        .run(&mut ctx);
    assert_eq!(result.message, "Teardown failed:\ncleanup broke");

    let result = TestCase::new("No teardown", vec![call("No Operation", &[])])
        .with_teardown(Fixture::new("${cleanup}", Vec::<String>::new()))
        .run(&mut ctx);
    assert!(result.passed());
    assert_eq!(result.keywords.len(), 1);
    Ok(())
}

#[test]
fn teardown_keeps_running_after_failures() -> Result<()> {
    let (registry, count) = counting_registry();
    registry.register_user_keyword(UserKeyword::new(
        "Cleanup",
        &[],
        vec![
            call("Fail", &["first"]),
            call("Count", &["1", "2"]),
            call("Fail", &["second"]),
        ],
    )?);
    let mut ctx = registry.context();

    let result = TestCase::new("Cleanup", vec![call("No Operation", &[])])
        .with_teardown(Fixture::new("Cleanup", Vec::<String>::new()))
        .run(&mut ctx);

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(
        result.message,
        "Teardown failed:\nSeveral failures occurred:\n\n1) first\n\n2) second"
    );
    Ok(())
}

#[test]
fn templated_test_runs_every_row() -> Result<()> {
    let (registry, _count) = counting_registry();
    let mut ctx = registry.context();
    let rows = vec![
        call("1", &["1"]),
        call("2", &["3"]),
        ForLoop::new(["${i}"], ForFlavor::InRange)
            .with_values(["2"])
            .with_body(vec![call("${i}", &["0"])])
            .into(),
    ];

    let result = TestCase::new("Equalities", rows)
        .with_template("Should Be Equal")
        .run(&mut ctx);

    assert_eq!(
        result.message,
        "Several failures occurred:\n\n1) 2 != 3\n\n2) 1 != 0"
    );
    assert_eq!(result.keywords.len(), 3);
    assert_eq!(result.keywords[0].name, "BuiltIn.Should Be Equal");
    Ok(())
}

#[test]
fn pass_execution_passes_the_test() -> Result<()> {
    let (registry, count) = counting_registry();
    let mut ctx = registry.context();

    let result = TestCase::new(
        "Passes early",
        vec![call("Pass Execution", &["Not ready yet"]), call("Count", &["1", "2"])],
    )
    .run(&mut ctx);
    assert!(result.passed());
    assert_eq!(result.message, "Not ready yet");
    assert_eq!(*count.lock().unwrap(), 0);

    let result = TestCase::new(
        "Passes after failure",
        vec![
            call("Run Keyword And Continue On Failure", &["Fail", "earlier"]),
            call("Pass Execution", &["Not ready yet"]),
        ],
    )
    .run(&mut ctx);
    assert_eq!(result.status, Status::Fail);
    assert_eq!(result.message, "earlier");
    Ok(())
}

#[test]
fn continue_outside_a_loop_fails_the_test() -> Result<()> {
    let (registry, _count) = counting_registry();
    let mut ctx = registry.context();

    let result = TestCase::new("Stray", vec![call("Continue For Loop", &[])]).run(&mut ctx);

    assert_eq!(
        result.message,
        "'Continue For Loop' can only be used inside a loop."
    );
    Ok(())
}

#[test]
fn dry_run_checks_arity_without_calling_libraries() -> Result<()> {
    let (registry, count) = counting_registry();
    registry.register_user_keyword(UserKeyword::new(
        "Wrapper",
        &["${x}".to_string(), "${y}=${x}".to_string()],
        vec![call("Count", &["${x}", "${y}"]), call("Count", &["too few"])],
    )?);
    let mut ctx = registry.context_with_settings(RunSettings::default().dry_run(true));

    let result = TestCase::new(
        "Dry",
        vec![
            call("Count", &["1", "2"]),
            call("Count", &["1", "2", "3"]),
            call("Count", &["@{anything}"]),
            call("Wrapper", &["1"]),
            ForLoop::new(["${i}"], ForFlavor::InRange)
                .with_values(["${undefined}"])
                .with_body(vec![call("Count", &["${i}", "${i}"])])
                .into(),
            call("Wrapper", &[]),
        ],
    )
    .run(&mut ctx);

    assert_eq!(*count.lock().unwrap(), 0);
    assert_eq!(result.status, Status::Fail);
    assert_eq!(
        result.message,
        "Several failures occurred:\n\n\
         1) Keyword 'Count' expected 2 arguments, got 3.\n\n\
         2) Keyword 'Count' expected 2 arguments, got 1.\n\n\
         3) Keyword 'Wrapper' expected 1 to 2 arguments, got 0."
    );
    assert_eq!(result.keywords[0].status, Status::NotRun);
    assert_eq!(result.keywords[2].status, Status::NotRun);
    let wrapper = &result.keywords[3];
    assert_eq!(wrapper.status, Status::Fail);
    assert_eq!(wrapper.children[0].status, Status::NotRun);
    assert_eq!(result.keywords[4].children.len(), 1);
    Ok(())
}

#[test]
fn resource_tests_run_in_order() -> Result<()> {
    let (registry, _count) = counting_registry();
    let resource = ResourceData::from_yaml_str(
        r#"
variables:
  expected: "3"
tests:
  - name: Sum
    body:
      - name: Set Variable
        args: ["3"]
        assign: ["${sum}"]
      - name: Should Be Equal
        args: ["${sum}", "${expected}"]
  - name: Broken
    body:
      - name: Should Be Equal
        args: ["${missing}", "x"]
"#,
    )?;
    let mut ctx = registry.context();
    resource.import(&mut ctx)?;

    let results = resource.run_tests(&mut ctx);

    assert!(results[0].passed());
    assert_eq!(results[1].message, "Variable '${missing}' not found.");
    assert!(!ctx.variables().contains("${sum}"));
    Ok(())
}

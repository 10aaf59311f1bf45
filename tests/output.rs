use anyhow::Result;
use serde_json::json;
use std::sync::{Arc, Mutex};

use keyword_kernel_rs::{
    register_builtin, KeywordResult, Listener, LogLevel, LogMessage, Registry, RunSettings, Status,
};

struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Listener for Recorder {
    fn start_keyword(&mut self, node: &KeywordResult) {
        self.events.lock().unwrap().push(format!("start {}", node.name));
    }

    fn end_keyword(&mut self, node: &KeywordResult) {
        self.events
            .lock()
            .unwrap()
            .push(format!("end {} {}", node.name, node.status.as_str()));
    }

    fn log_message(&mut self, message: &LogMessage) {
        self.events
            .lock()
            .unwrap()
            .push(format!("log {} {}", message.level, message.message));
    }
}

fn tokens(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[test]
fn listeners_see_start_log_and_end_in_order() -> Result<()> {
    let registry = Registry::new();
    register_builtin(&registry);
    let mut ctx = registry.context();
    let events = Arc::new(Mutex::new(Vec::new()));
    ctx.add_listener(Box::new(Recorder {
        events: events.clone(),
    }));

    ctx.run_keyword("Log", tokens(&["hello"]));
    ctx.run_keyword("Fail", tokens(&["nope"]));

    let events = events.lock().unwrap();
    assert_eq!(events[0], "start BuiltIn.Log");
    assert!(events.contains(&"log INFO hello".to_string()));
    assert!(events.contains(&"end BuiltIn.Log PASS".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("end BuiltIn.Fail FAIL"));
    Ok(())
}

#[test]
fn warnings_survive_a_strict_log_level() -> Result<()> {
    let registry = Registry::new();
    register_builtin(&registry);
    let mut ctx = registry.context_with_settings(RunSettings::default().log_level(LogLevel::Fail));

    ctx.run_keyword("Log", tokens(&["careful", "WARN"]));

    assert_eq!(ctx.output().warnings().len(), 1);
    assert_eq!(ctx.output().warnings()[0].message, "careful");
    assert!(ctx.output().results()[0].messages.is_empty());
    Ok(())
}

#[test]
fn long_failure_messages_are_cut_in_the_tree() -> Result<()> {
    let registry = Registry::new();
    register_builtin(&registry);
    let settings = RunSettings::from_toml_str("max_error_lines = 4\n")?;
    let mut ctx = registry.context_with_settings(settings);
    let message = (1..=10).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");

    let outcome = ctx.run_keyword("Fail", vec![message.clone()]);

    assert_eq!(outcome.message(), message);
    let node = &ctx.output().results()[0];
    assert_eq!(node.status, Status::Fail);
    let lines: Vec<&str> = node.message.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[..2], ["1", "2"]);
    assert_eq!(lines[3..], ["9", "10"]);
    Ok(())
}

#[test]
fn results_serialize_with_timestamps() -> Result<()> {
    let registry = Registry::new();
    register_builtin(&registry);
    let mut ctx = registry.context();

    ctx.run_keyword("Set Variable", tokens(&["x"]));

    let node = ctx.output().results()[0].to_json();
    assert_eq!(node["name"], json!("BuiltIn.Set Variable"));
    assert_eq!(node["node_type"], json!("keyword"));
    assert_eq!(node["status"], json!("PASS"));
    assert_eq!(node["resolved_args"], json!(["x"]));
    assert!(node["start_time"].as_str().is_some_and(|t| t.ends_with('Z')));
    assert!(node["end_time"].is_string());
    Ok(())
}

//! Agent control commands (status, start-task, stop-task, reload).

use anyhow::{Result, bail};
use colored::Colorize;
use serde_json::Value;

use suite_agent::{AgentError, ControlResponse};
use suite_cli::Session;
use suite_cli::theme::Theme;

use super::{OutputFormat, print_json};

/// Show agent status.
pub(crate) async fn agent_status(session: &Session, format: OutputFormat) -> Result<()> {
    let client = session.control_client();
    let response = match client.status().await {
        Ok(response) => response,
        Err(AgentError::Io { .. }) => {
            if format == OutputFormat::Json {
                return print_json(&serde_json::json!({ "running": false }));
            }
            println!("{}", Theme::warning("Agent is not running"));
            return Ok(());
        },
        Err(e) => return Err(e.into()),
    };
    let data = expect_ok(response)?;

    if format == OutputFormat::Json {
        return print_json(&data);
    }

    println!("\n{}", Theme::header("Agent Status"));
    println!("  Pid: {}", data["pid"].to_string().yellow());
    println!("  Uptime: {}", text(&data["uptime"]).yellow());
    println!("  Package root: {}", text(&data["package_root"]));
    println!("  Ticks: {}", data["ticks"]);

    let tasks = data["tasks"].as_array().cloned().unwrap_or_default();
    println!("\n{}", Theme::header("Tasks"));
    println!("{}", Theme::separator());
    if tasks.is_empty() {
        println!("  {}", Theme::dimmed("no tasks configured"));
    }
    for task in &tasks {
        println!(
            "  {} {} {}/{} ({})",
            text(&task["task_id"]).bold(),
            Theme::state(text(&task["state"])),
            text(&task["package_id"]),
            text(&task["feature_id"]),
            text(&task["mode"]),
        );
        println!(
            "    runs: {}  consecutive failures: {}",
            task["runs"], task["consecutive_failures"]
        );
        if let Some(last) = task["last_run"].as_object() {
            let outcome = if last.get("success").and_then(Value::as_bool) == Some(true) {
                "ok".green()
            } else {
                "failed".red()
            };
            let when = last.get("finished_at").map_or("", text);
            println!("    last run: {outcome} at {}", Theme::dimmed(when));
            if let Some(message) = last.get("message").and_then(Value::as_str) {
                println!("    {}", message.yellow());
            }
        }
    }
    println!();
    Ok(())
}

/// Start a task now.
pub(crate) async fn start_task(session: &Session, task_id: &str, format: OutputFormat) -> Result<()> {
    let data = expect_ok(session.control_client().start_task(task_id).await?)?;
    report(format, &data, &format!("Started task {task_id}"))
}

/// Stop a task.
pub(crate) async fn stop_task(session: &Session, task_id: &str, format: OutputFormat) -> Result<()> {
    let data = expect_ok(session.control_client().stop_task(task_id).await?)?;
    report(format, &data, &format!("Stopped task {task_id}"))
}

/// Ask the agent to reload its configuration.
pub(crate) async fn reload(session: &Session, format: OutputFormat) -> Result<()> {
    let data = expect_ok(session.control_client().reload().await?)?;
    if format == OutputFormat::Json {
        return print_json(&data);
    }
    println!("{}", Theme::success("Configuration reloaded"));
    for (label, key) in [("added", "added"), ("removed", "removed"), ("updated", "updated")] {
        let ids: Vec<&str> = data["tasks"][key]
            .as_array()
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !ids.is_empty() {
            println!("  {label}: {}", ids.join(", "));
        }
    }
    println!("  packages: {}", data["packages"]);
    Ok(())
}

fn expect_ok(response: ControlResponse) -> Result<Value> {
    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    bail!(
        "agent refused the request: {}",
        response.error.as_deref().unwrap_or("unknown error")
    )
}

fn report(format: OutputFormat, data: &Value, message: &str) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(data);
    }
    println!("{}", Theme::success(message));
    println!("  state: {}", Theme::state(text(&data["state"])));
    Ok(())
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or("-")
}

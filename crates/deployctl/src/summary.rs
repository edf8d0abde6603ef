//! Console output for finished pipelines.

use colored::Colorize;
use pipeline::{ExecutionStatus, PipelineExecution, StageExecution};

fn status_marker(status: ExecutionStatus) -> colored::ColoredString {
    match status {
        ExecutionStatus::Succeeded => "✓".green().bold(),
        ExecutionStatus::Skipped | ExecutionStatus::FailedContinue => "⚠".yellow().bold(),
        ExecutionStatus::NotStarted => "·".bright_black(),
        ExecutionStatus::Running => "▶".cyan(),
        _ => "✗".red().bold(),
    }
}

fn stage_line(stage: &StageExecution) -> String {
    let indent = if stage.parent_stage_id.is_some() { "    " } else { "  " };
    let mut line = format!(
        "{indent}{} {} {} {}",
        status_marker(stage.status),
        stage.name.bold(),
        format!("({})", stage.stage_type).bright_black(),
        stage.status.as_str()
    );
    if let Some(error) = stage
        .context
        .get("exception")
        .and_then(|exception| exception.pointer("/details/error"))
        .and_then(serde_json::Value::as_str)
    {
        line.push_str(&format!("\n{indent}    {}", error.red()));
    }
    line
}

/// One line per stage, after-stages indented under their parent.
pub fn render(execution: &PipelineExecution) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} {}",
        status_marker(execution.status),
        execution.application.cyan().bold(),
        execution.status.as_str()
    )];
    for stage in execution
        .stages
        .iter()
        .filter(|stage| stage.parent_stage_id.is_none())
    {
        lines.push(stage_line(stage));
        lines.extend(
            execution
                .stages
                .iter()
                .filter(|child| child.parent_stage_id.as_deref() == Some(stage.id.as_str()))
                .map(stage_line),
        );
    }
    lines
}

pub fn print(execution: &PipelineExecution) {
    println!();
    for line in render(execution) {
        println!("{line}");
    }
}

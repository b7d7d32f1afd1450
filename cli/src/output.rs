//! Terminal output helpers: listings, detail blocks, event narration.

use ensemble::{Event, EventType, SessionSummary, Task, TaskSession};

/// Compact human duration ("42s", "3m10s", "2h05m").
pub fn human_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{}s", seconds.max(0))
    } else if seconds < 3600 {
        format!("{}m{:02}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h{:02}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

pub fn print_list(rows: &[SessionSummary]) {
    if rows.is_empty() {
        println!("no task sessions found");
        return;
    }
    println!(
        "{:<10} {:<10} {:<10} {:<10} DESCRIPTION",
        "ID", "STATUS", "ROUNDS", "UPDATED"
    );
    for row in rows {
        let age = chrono::Utc::now()
            .signed_duration_since(row.updated_at)
            .num_seconds();
        println!(
            "{:<10} {:<10} {:<10} {:<10} {}",
            row.task_id,
            row.status,
            format!("{}/{}", row.round_count, row.max_rounds),
            human_duration(age),
            truncate(&row.description, 50),
        );
    }
}

pub fn print_details(session: &TaskSession) {
    let task = &session.task;
    println!("task:        {}", task.task_id);
    println!("description: {}", task.description);
    println!("status:      {}", task.status);
    println!("config:      {}", task.config_ref);
    println!("rounds:      {}/{}", task.round_count, task.max_rounds);
    println!("created:     {}", task.created_at.to_rfc3339());
    println!("updated:     {}", task.updated_at.to_rfc3339());
    let elapsed = task
        .updated_at
        .signed_duration_since(task.created_at)
        .num_seconds();
    println!("duration:    {}", human_duration(elapsed));
    if let Some(agent) = &task.current_agent {
        println!("last agent:  {}", agent);
    }
    if let Some(error) = &task.error {
        println!("error:       {}: {}", error.kind, error.message);
    }
    if !task.history.is_empty() {
        println!("transcript:");
        for (i, step) in task.history.iter().enumerate() {
            let text = step.text();
            println!("  {:>3}. [{}] {}", i + 1, step.agent_name, truncate(&text, 70));
            for invocation in &step.tool_invocations {
                let outcome = match &invocation.error {
                    None => "ok".to_string(),
                    Some(e) => format!("error: {}", e.kind),
                };
                println!(
                    "       tool {} ({}ms) {}",
                    invocation.tool_name, invocation.duration_ms, outcome
                );
            }
        }
    }
    if !task.status.is_terminal() {
        println!("\nresume with: ensemble resume {}", task.task_id);
    }
}

pub fn print_final(task: &Task) {
    println!(
        "task {} {} after {} round{}",
        task.task_id,
        task.status,
        task.round_count,
        if task.round_count == 1 { "" } else { "s" }
    );
}

/// One-line narration of an event (verbose mode).
pub fn print_event(event: &Event) {
    let line = match &event.event_type {
        EventType::HandoffRouted => format!(
            "handoff -> {}",
            event.payload["to"].as_str().unwrap_or("?")
        ),
        EventType::AgentTurnStarted => format!(
            "turn {} [{}]",
            event.payload["round"].as_u64().unwrap_or(0),
            event.payload["agent_name"].as_str().unwrap_or("?")
        ),
        EventType::ToolInvoked => format!(
            "  tool {} ...",
            event.payload["tool_name"].as_str().unwrap_or("?")
        ),
        EventType::ToolFailed => format!(
            "  tool {} failed ({})",
            event.payload["tool_name"].as_str().unwrap_or("?"),
            event.payload["kind"].as_str().unwrap_or("?")
        ),
        EventType::MemoryAdded => "  memory added".to_string(),
        EventType::TaskCompleted | EventType::TaskFailed | EventType::TaskStopped => {
            event.event_type.name()
        }
        EventType::Custom(name) => format!("event {}", name),
        _ => return,
    };
    eprintln!("{}", line);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: durations humanize across the unit boundaries.
    #[test]
    fn human_duration_boundaries() {
        assert_eq!(human_duration(0), "0s");
        assert_eq!(human_duration(59), "59s");
        assert_eq!(human_duration(60), "1m00s");
        assert_eq!(human_duration(190), "3m10s");
        assert_eq!(human_duration(7500), "2h05m");
    }

    /// **Scenario**: truncation respects char boundaries and adds ellipsis.
    #[test]
    fn truncate_respects_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly-te", 10), "exactly-te");
        assert_eq!(truncate("a longer description here", 10), "a longe...");
        assert_eq!(truncate("日本語のテキストです", 6), "日本語...");
    }
}

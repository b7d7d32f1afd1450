//! End-to-end: agents persisting facts through the memory tools, with
//! auto-emitted milestone events derived from tagged writes.


use std::sync::Arc;

use serde_json::json;
use ensemble::{
    bus_for_team, install_team_memory, team_from_yaml, EventType, ExecutorOptions,
    InMemorySessionStore, ListOptions, Memory, MockBrain, ScriptedTurn, SharedBrain, TaskControl,
    TaskExecutor, TaskStatus, ToolRegistry, TOOL_ADD_MEMORY,
};

/// **Scenario**: an agent stores a memory tagged `phase: plan`; the bus
/// emits `memory.added` and then the team's configured milestone event; the
/// memory is retrievable under the task's scope only.
#[tokio::test]
async fn memory_tool_write_emits_milestone() {
    let team = Arc::new(
        team_from_yaml(
            r#"
name: planner
agents:
  - name: planner
    prompt_template: "Task: {task}"
    tools: [add_memory, search_memory]
memory:
  backend: in_memory
events:
  auto_emit_patterns:
    - event_name: milestone.plan_ready
      metadata_filter:
        phase: plan
      exclusive: true
max_rounds: 2
"#,
        )
        .unwrap(),
    );
    let bus = bus_for_team(&team);
    let registry = Arc::new(ToolRegistry::new());
    let dir = tempfile::tempdir().unwrap();
    let memory = install_team_memory(&team, &registry, &bus, dir.path())
        .await
        .unwrap();

    let mut memory_events = bus.subscribe("memory.added");
    let mut milestones = bus.subscribe("milestone.*");

    let brain = MockBrain::new(vec![
        ScriptedTurn::tool_call(
            "c1",
            TOOL_ADD_MEMORY,
            json!({
                "content": "The plan: research, then draft, then review.",
                "importance": 0.9,
                "metadata": {"phase": "plan"},
            }),
        ),
        ScriptedTurn::text("Plan stored. TERMINATE"),
    ]);

    let executor = TaskExecutor::new(
        Arc::clone(&team),
        Arc::new(SharedBrain(Arc::new(brain))),
        registry,
        Arc::new(InMemorySessionStore::new()),
        bus,
        ExecutorOptions::default(),
    );
    let task = executor
        .start("plan the report", "inline", &TaskControl::new())
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    let added = memory_events.drain();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].task_id.as_deref(), Some(task.task_id.as_str()));
    assert_eq!(added[0].payload["metadata"]["phase"], "plan");

    let milestone = milestones.drain();
    assert_eq!(milestone.len(), 1);
    assert_eq!(
        milestone[0].event_type,
        EventType::Custom("milestone.plan_ready".into())
    );
    assert_eq!(milestone[0].payload["derived_from"], "memory.added");

    // Scoping: the write landed under this task only.
    let items = memory.list(&task.task_id, ListOptions::default()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].agent_name.as_deref(), Some("planner"));
    assert!(memory
        .list("other-task", ListOptions::default())
        .await
        .unwrap()
        .is_empty());
}

/// **Scenario**: a team without a memory section gets the no-op stub: tool
/// writes succeed, reads come back empty, and the task still completes.
#[tokio::test]
async fn omitted_memory_is_noop_stub() {
    let team = Arc::new(
        team_from_yaml(
            r#"
name: no-memory
agents:
  - name: a
    prompt_template: "p"
    tools: [add_memory, list_memories]
max_rounds: 2
"#,
        )
        .unwrap(),
    );
    let bus = bus_for_team(&team);
    let registry = Arc::new(ToolRegistry::new());
    let dir = tempfile::tempdir().unwrap();
    let memory = install_team_memory(&team, &registry, &bus, dir.path())
        .await
        .unwrap();

    let brain = MockBrain::new(vec![
        ScriptedTurn::tool_calls(vec![
            (
                "c1".into(),
                TOOL_ADD_MEMORY.into(),
                json!({"content": "will vanish"}),
            ),
            ("c2".into(), "list_memories".into(), json!({})),
        ]),
        ScriptedTurn::text("Done. TERMINATE"),
    ]);
    let executor = TaskExecutor::new(
        Arc::clone(&team),
        Arc::new(SharedBrain(Arc::new(brain))),
        registry,
        Arc::new(InMemorySessionStore::new()),
        bus,
        ExecutorOptions::default(),
    );
    let task = executor
        .start("ephemeral", "inline", &TaskControl::new())
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    let step = &task.history[0];
    assert!(step.tool_invocations.iter().all(|i| i.error.is_none()));
    assert!(memory
        .list(&task.task_id, ListOptions::default())
        .await
        .unwrap()
        .is_empty());
}

//! End-to-end: step-through pausing, explicit resume, and stop.


use std::sync::Arc;
use std::time::Duration;

use ensemble::{
    bus_for_team, team_from_yaml, EventType, ExecutorOptions, InMemorySessionStore, MockBrain,
    SessionStore, SharedBrain, Subscription, TaskControl, TaskExecutor, TaskStatus, ToolRegistry,
};

async fn wait_for(sub: &mut Subscription, wanted: EventType) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = sub.recv().await.expect("bus alive");
            if event.event_type == wanted {
                return;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", wanted.name()));
}

/// **Scenario**: spec end-to-end scenario 4. step_through pauses after each
/// step; resume advances one more step; stop from paused terminates. The
/// observed statuses run created → running → paused → running → stopped and
/// the transcript holds exactly 2 steps.
#[tokio::test]
async fn step_through_pause_resume_stop() {
    let team = Arc::new(
        team_from_yaml(
            r#"
name: stepper
agents:
  - name: a
    prompt_template: "p"
  - name: b
    prompt_template: "p"
handoffs:
  - from: a
    to: b
  - from: b
    to: a
execution_mode: step_through
max_rounds: 10
"#,
        )
        .unwrap(),
    );
    let bus = bus_for_team(&team);
    let mut events = bus.subscribe("task.*");
    let store = Arc::new(InMemorySessionStore::new());
    let brain = MockBrain::new(vec![]);

    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&team),
        Arc::new(SharedBrain(Arc::new(brain))),
        Arc::new(ToolRegistry::new()),
        Arc::clone(&store) as Arc<dyn SessionStore>,
        bus,
        ExecutorOptions::default(),
    ));
    let control = TaskControl::new();

    let driver = {
        let executor = Arc::clone(&executor);
        let control = control.clone();
        tokio::spawn(async move { executor.start("stepwise job", "inline", &control).await })
    };

    wait_for(&mut events, EventType::TaskPaused).await;
    let sessions = store.list(Default::default()).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, TaskStatus::Paused);
    assert_eq!(sessions[0].round_count, 1);
    let task_id = sessions[0].task_id.clone();

    control.resume();
    wait_for(&mut events, EventType::TaskResumed).await;
    wait_for(&mut events, EventType::TaskPaused).await;
    let after_second = store.get(&task_id).await.unwrap().unwrap();
    assert_eq!(after_second.task.round_count, 2);

    control.stop();
    let task = driver.await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Stopped);
    assert_eq!(task.history.len(), 2);

    let persisted = store.get(&task_id).await.unwrap().unwrap();
    assert_eq!(persisted.task.status, TaskStatus::Stopped);

    // The status trail, via events, in order.
    let mut trail = vec!["task.created".to_string()];
    trail.extend(events.drain().into_iter().map(|e| e.event_type.name()));
    let stopped_at = trail.iter().position(|t| t == "task.stopped");
    assert!(stopped_at.is_some(), "task.stopped observed: {:?}", trail);
}

/// **Scenario**: cancellation liveness: stop() during a paused wait
/// terminates without another step; stop() during a slow Brain turn
/// abandons the stream within one suspension point.
#[tokio::test]
async fn stop_is_observed_promptly() {
    // Stop while paused.
    let team = Arc::new(
        team_from_yaml(
            r#"
name: stepper
agents:
  - name: a
    prompt_template: "p"
execution_mode: step_through
max_rounds: 10
"#,
        )
        .unwrap(),
    );
    let bus = bus_for_team(&team);
    let mut events = bus.subscribe("task.*");
    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&team),
        Arc::new(SharedBrain(Arc::new(MockBrain::new(vec![
            // Keep the single agent from terminating naturally.
            ensemble::ScriptedTurn::text("working"),
            ensemble::ScriptedTurn::text("working"),
        ])))),
        Arc::new(ToolRegistry::new()),
        Arc::new(InMemorySessionStore::new()),
        bus,
        ExecutorOptions::default(),
    ));
    let control = TaskControl::new();
    let driver = {
        let executor = Arc::clone(&executor);
        let control = control.clone();
        tokio::spawn(async move { executor.start("job", "inline", &control).await })
    };
    wait_for(&mut events, EventType::TaskPaused).await;
    control.stop();
    let task = tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .expect("stopped promptly")
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Stopped);
    assert_eq!(task.history.len(), 1);

    // Stop mid-turn: a Brain that streams forever.
    struct StallingBrain;
    #[async_trait::async_trait]
    impl ensemble::Brain for StallingBrain {
        async fn stream(
            &self,
            _messages: &[ensemble::Message],
            _tools: &[serde_json::Value],
        ) -> Result<ensemble::ChunkStream, ensemble::BrainError> {
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            tokio::spawn(async move {
                loop {
                    if tx
                        .send(Ok(ensemble::BrainChunk::TextDelta {
                            text: "...".into(),
                        }))
                        .await
                        .is_err()
                    {
                        break; // consumer abandoned the stream
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            });
            Ok(rx)
        }
    }

    let team = Arc::new(
        team_from_yaml(
            "name: staller\nagents:\n  - name: a\n    prompt_template: p\n",
        )
        .unwrap(),
    );
    let bus = bus_for_team(&team);
    let mut events = bus.subscribe("agent.turn_started");
    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&team),
        Arc::new(SharedBrain(Arc::new(StallingBrain))),
        Arc::new(ToolRegistry::new()),
        Arc::new(InMemorySessionStore::new()),
        bus,
        ExecutorOptions::default(),
    ));
    let control = TaskControl::new();
    let driver = {
        let executor = Arc::clone(&executor);
        let control = control.clone();
        tokio::spawn(async move { executor.start("stall", "inline", &control).await })
    };
    wait_for(&mut events, EventType::AgentTurnStarted).await;
    control.stop();
    let task = tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .expect("stopped within one suspension point")
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Stopped);
    assert!(task.history.is_empty(), "partial turn state is discarded");
}

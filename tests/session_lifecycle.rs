mod common;

use agentdeck::OrchestratorError;
use agentdeck::domains::detection::SessionState;
use agentdeck::domains::sessions::{
    AutoApprovalUpdate, CreateSessionParams, NewSessionRecord, SessionEvent, SessionIntent,
};
use agentdeck::domains::agents::{AgentOptions, AgentType};
use common::{FakeSupervisor, eventually, orchestrator, wait_for};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn state_change(id: &str, expected: SessionState) -> impl FnMut(&SessionEvent) -> bool + '_ {
    move |event| {
        matches!(event, SessionEvent::StateChanged { id: event_id, state, .. }
            if event_id == id && *state == expected)
    }
}

#[tokio::test]
async fn session_runs_through_detection_to_destroy() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let orchestrator = orchestrator(supervisor.clone());
    let mut events = orchestrator.subscribe_events();

    let session = orchestrator
        .create_session(
            Some(Path::new("/repo")),
            CreateSessionParams::new("/repo/wt-a", "claude-code"),
        )
        .await
        .unwrap();
    assert_eq!(session.state, SessionState::Idle);
    assert_eq!(supervisor.spawn_count(), 1);
    {
        let processes = supervisor.processes.lock().unwrap();
        assert_eq!(processes[0].request.cwd, Path::new("/repo/wt-a"));
        assert!(processes[0].request.program.ends_with("claude"));
    }

    supervisor.feed(0, b"Continue? [y/n]\r\n> ").await;
    wait_for(&mut events, state_change(&session.id, SessionState::WaitingInput)).await;

    supervisor.feed(0, b"\x1b[2J\x1b[HEsc to interrupt").await;
    wait_for(&mut events, state_change(&session.id, SessionState::Busy)).await;
    assert_eq!(
        orchestrator.get_session(&session.id).unwrap().state,
        SessionState::Busy
    );

    assert!(orchestrator.destroy_session(&session.id).unwrap());
    assert!(supervisor.handle(0).killed.load(std::sync::atomic::Ordering::SeqCst));
    assert!(orchestrator.get_session(&session.id).is_none());
    assert!(matches!(
        orchestrator.rename_session(&session.id, "x"),
        Err(OrchestratorError::SessionNotFound { .. })
    ));

    let record = orchestrator.get_record(&session.id).unwrap().unwrap();
    assert!(record.ended_at.is_some());
    assert_eq!(record.project_path.as_deref(), Some("/repo"));

    wait_for(&mut events, |event| {
        matches!(event, SessionEvent::Destroyed { id } if id == &session.id)
    })
    .await;
    assert!(!orchestrator.destroy_session(&session.id).unwrap());
}

#[tokio::test]
async fn exited_process_keeps_session_listed() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let orchestrator = orchestrator(supervisor.clone());
    let mut events = orchestrator.subscribe_events();

    let session = orchestrator
        .create_session(None, CreateSessionParams::new("/repo/wt-a", "codex"))
        .await
        .unwrap();
    supervisor.exit(0, Some(1)).await;
    wait_for(&mut events, |event| matches!(event, SessionEvent::Exited { .. })).await;

    let summary = orchestrator.get_session(&session.id).unwrap();
    assert!(summary.exited);
    assert_eq!(summary.exit_code, Some(1));
    assert!(orchestrator.get_record(&session.id).unwrap().unwrap().ended_at.is_none());
}

#[tokio::test]
async fn override_id_resumes_existing_record() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let orchestrator = orchestrator(supervisor.clone());

    let original = orchestrator
        .store()
        .create_session_record(NewSessionRecord {
            id: "resume-me".to_string(),
            agent_profile_id: "claude-code".to_string(),
            agent_profile_name: "Claude Code".to_string(),
            agent_type: AgentType::ClaudeCode,
            agent_options: AgentOptions::new(),
            worktree_path: "/repo/wt-a".to_string(),
            branch_name: None,
            project_path: Some("/repo".to_string()),
            td_task_id: None,
            td_session_id: None,
            session_name: Some("Old name".to_string()),
            intent: SessionIntent::Work,
            created_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        })
        .unwrap();
    orchestrator.store().mark_session_ended("resume-me", None).unwrap();

    let mut params = CreateSessionParams::new("/repo/wt-a", "claude-code");
    params.session_id_override = Some("resume-me".to_string());
    let session = orchestrator
        .create_session(Some(Path::new("/repo")), params.clone())
        .await
        .unwrap();
    assert_eq!(session.id, "resume-me");

    let record = orchestrator.get_record("resume-me").unwrap().unwrap();
    assert!(record.ended_at.is_none());
    assert_eq!(record.created_at, original.created_at);

    let duplicate = orchestrator.create_session(None, params).await.unwrap_err();
    assert!(matches!(duplicate, OrchestratorError::SessionAlreadyExists { .. }));
}

#[tokio::test]
async fn sessions_are_listed_once_across_managers() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let orchestrator = orchestrator(supervisor);

    let a = orchestrator
        .create_session(None, CreateSessionParams::new("/tmp/wt-a", "claude-code"))
        .await
        .unwrap();
    let b = orchestrator
        .create_session(
            Some(Path::new("/repo/")),
            CreateSessionParams::new("/repo/wt-b", "gemini"),
        )
        .await
        .unwrap();
    // Same project spelled differently resolves to the same manager.
    let c = orchestrator
        .create_session(
            Some(Path::new("/repo/./")),
            CreateSessionParams::new("/repo/wt-c", "opencode"),
        )
        .await
        .unwrap();

    let ids: Vec<_> = orchestrator
        .all_active_sessions()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids.len(), 3);
    for id in [&a.id, &b.id, &c.id] {
        assert!(ids.contains(id));
    }
    assert_eq!(orchestrator.managers().len(), 2);
    assert_eq!(orchestrator.manager_for(Some(Path::new("/repo"))).len(), 2);

    assert_eq!(orchestrator.list_sessions(Some(Path::new("/repo"))).len(), 2);
    assert_eq!(orchestrator.list_sessions(None).len(), 1);
    assert!(orchestrator.list_sessions(Some(Path::new("/elsewhere"))).is_empty());

    let destroyed = orchestrator.destroy_project_sessions(Path::new("/repo"));
    assert_eq!(destroyed.len(), 2);
    assert_eq!(orchestrator.all_active_sessions().len(), 1);
    assert_eq!(orchestrator.managers().len(), 1);
}

#[tokio::test]
async fn auto_approval_overlay_round_trip() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let orchestrator = orchestrator(supervisor.clone());
    let mut events = orchestrator.subscribe_events();
    let session = orchestrator
        .create_session(None, CreateSessionParams::new("/repo/wt-a", "claude-code"))
        .await
        .unwrap();

    let pending = orchestrator
        .update_auto_approval(&session.id, AutoApprovalUpdate::Pending)
        .unwrap();
    assert_eq!(pending.state, SessionState::PendingAutoApproval);
    wait_for(&mut events, state_change(&session.id, SessionState::PendingAutoApproval)).await;

    let failed = orchestrator
        .update_auto_approval(
            &session.id,
            AutoApprovalUpdate::Failed {
                reason: "command not allowlisted".to_string(),
            },
        )
        .unwrap();
    assert_eq!(failed.state, SessionState::Idle);
    assert!(failed.auto_approval_failed);

    let event = wait_for(&mut events, state_change(&session.id, SessionState::Idle)).await;
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["autoApprovalFailed"], true);
    assert_eq!(json["reason"], "command not allowlisted");
}

#[tokio::test]
async fn attached_clients_get_snapshot_then_live_output() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let orchestrator = orchestrator(supervisor.clone());
    let session = orchestrator
        .create_session(None, CreateSessionParams::new("/repo/wt-a", "claude-code"))
        .await
        .unwrap();

    supervisor.feed(0, b"\x1b[2J\x1b[Hbefore-attach").await;
    eventually(|| {
        String::from_utf8_lossy(&orchestrator.snapshot(&session.id).unwrap()).contains("before-attach")
    })
    .await;

    let mut output = orchestrator.subscribe_output(&session.id).unwrap();
    orchestrator.set_session_active(&session.id, true).unwrap();
    supervisor.feed(0, b"after attach").await;
    let chunk = tokio::time::timeout(Duration::from_secs(5), output.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chunk, b"after attach".to_vec());

    orchestrator.write_input(&session.id, b"hello\r").unwrap();
    assert_eq!(
        supervisor.handle(0).written.lock().unwrap().as_slice(),
        b"hello\r"
    );
}

#[tokio::test]
async fn shutdown_destroys_everything_and_refuses_new_sessions() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let orchestrator = orchestrator(supervisor.clone());
    for worktree in ["/repo/wt-a", "/repo/wt-b"] {
        orchestrator
            .create_session(Some(Path::new("/repo")), CreateSessionParams::new(worktree, "claude-code"))
            .await
            .unwrap();
    }
    orchestrator
        .create_session(None, CreateSessionParams::new("/other/wt", "codex"))
        .await
        .unwrap();

    let report = orchestrator.shutdown(Duration::from_secs(5)).await;
    assert_eq!(report.destroyed.len(), 3);
    assert!(report.failed.is_empty());
    assert!(!report.timed_out);
    assert!(report.remaining.is_empty());
    assert!(orchestrator.all_active_sessions().is_empty());
    assert!(orchestrator.is_shutting_down());

    let err = orchestrator
        .create_session(None, CreateSessionParams::new("/repo/wt-c", "claude-code"))
        .await
        .unwrap_err();
    assert_eq!(err, OrchestratorError::ShuttingDown);

    for record in orchestrator
        .query_history(&Default::default())
        .unwrap()
    {
        assert!(record.ended_at.is_some(), "{} left open", record.id);
    }
}

#[tokio::test]
async fn startup_reconciles_and_optionally_resumes_orphans() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let first = orchestrator(supervisor.clone());
    let store = first.store().clone();
    store
        .create_session_record(NewSessionRecord {
            id: "orphan".to_string(),
            agent_profile_id: "codex".to_string(),
            agent_profile_name: "Codex".to_string(),
            agent_type: AgentType::Codex,
            agent_options: AgentOptions::new(),
            worktree_path: "/repo/wt-a".to_string(),
            branch_name: None,
            project_path: Some("/repo".to_string()),
            td_task_id: None,
            td_session_id: None,
            session_name: Some("Orphaned work".to_string()),
            intent: SessionIntent::Work,
            created_at: None,
        })
        .unwrap();

    let orchestrator = first.with_orphan_resume(true);
    let report = orchestrator.start().await.unwrap();
    assert_eq!(report.reconciled, vec!["orphan".to_string()]);
    assert_eq!(report.resumed, vec!["orphan".to_string()]);

    let live = orchestrator.get_session("orphan").unwrap();
    assert_eq!(live.name, "Orphaned work");
    assert_eq!(live.project_path.as_deref(), Some("/repo"));
    assert!(orchestrator.get_record("orphan").unwrap().unwrap().ended_at.is_none());
}

#[tokio::test]
async fn stale_registration_in_two_managers_is_listed_once_and_destroyed_everywhere() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let orchestrator = orchestrator(supervisor.clone());

    let mut params = CreateSessionParams::new("/repo/wt-a", "claude-code");
    params.session_id_override = Some("twice".to_string());
    // Managers are driven directly so the cross-manager check is bypassed.
    orchestrator.manager_for(None).create(params.clone()).await.unwrap();
    orchestrator
        .manager_for(Some(Path::new("/repo")))
        .create(params)
        .await
        .unwrap();
    assert_eq!(supervisor.spawn_count(), 2);

    let listed: Vec<_> = orchestrator
        .all_active_sessions()
        .into_iter()
        .filter(|s| s.id == "twice")
        .collect();
    assert_eq!(listed.len(), 1);

    assert!(orchestrator.destroy_session("twice").unwrap());
    assert!(!orchestrator.manager_for(None).contains("twice"));
    assert!(!orchestrator.manager_for(Some(Path::new("/repo"))).contains("twice"));
    for index in 0..2 {
        assert!(supervisor.handle(index).killed.load(std::sync::atomic::Ordering::SeqCst));
    }
    assert!(orchestrator.get_session("twice").is_none());
}

#[tokio::test]
async fn concurrent_creates_with_one_override_id_admit_one() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let orchestrator = orchestrator(supervisor.clone());

    let mut params = CreateSessionParams::new("/repo/wt-a", "claude-code");
    params.session_id_override = Some("contested".to_string());
    let (first, second) = tokio::join!(
        orchestrator.create_session(None, params.clone()),
        orchestrator.create_session(Some(Path::new("/repo")), params.clone()),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(OrchestratorError::SessionAlreadyExists { session_id }) if session_id == "contested"
    )));
    assert_eq!(supervisor.spawn_count(), 1);
    assert_eq!(orchestrator.all_active_sessions().len(), 1);

    // The reservation is released once the create settles.
    assert!(orchestrator.destroy_session("contested").unwrap());
    orchestrator.create_session(None, params).await.unwrap();
    assert!(orchestrator.get_session("contested").is_some());
}

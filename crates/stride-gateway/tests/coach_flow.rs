// coach_flow.rs - End-to-end flows through the gateway on a SQLite project.

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use stride_audit::{AuditAction, AuditLog};
use stride_gateway::{Gateway, StaticRoster, StrideConfig};
use stride_proposal::{BatchMode, BatchOutcome, BatchRequest, ProposalState, SkipReason};

fn project(root: &std::path::Path) -> Gateway {
    let path = StrideConfig::config_path(root);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        r#"
admins = ["ops"]

[roster]
coach-1 = ["athlete-1"]
coach-2 = ["athlete-2"]

[cost]
hourly_rate = 40.0
"#,
    )
    .unwrap();

    let config = StrideConfig::load_for_project(root).unwrap();
    let roster = StaticRoster::from_config(&config);
    Gateway::open(config, Arc::new(roster)).unwrap()
}

fn edit(session: &str, hours: f64) -> serde_json::Value {
    json!({"edits": [{"op": "upsert", "session": session, "value": {"hours": hours}}]})
}

#[test]
fn coach_plans_batches_and_undoes() {
    let dir = tempdir().unwrap();
    let gw = project(dir.path());
    let coach = gw.authenticate("coach-1").unwrap();

    let draft = gw
        .create_draft(
            &coach,
            "athlete-1",
            json!({"sessions": {"mon": {"hours": 1.0}}}),
            None,
        )
        .unwrap();
    assert_eq!(draft.policy_profile, "default");

    let small = gw.create_proposal(&coach, draft.draft_id, edit("tue", 2.0)).unwrap();
    let large = gw.create_proposal(&coach, draft.draft_id, edit("sat", 4.0)).unwrap();

    let preview = gw.preview_proposal(&coach, large.proposal_id).unwrap();
    assert_eq!(preview.impact.hours_delta, 4.0);
    assert!(preview.verdict.pass);

    let report = gw
        .batch_approve(
            &coach,
            &BatchRequest {
                draft_id: draft.draft_id,
                candidates: vec![small.proposal_id, large.proposal_id],
                max_hours: 3.0,
                mode: BatchMode::Approve,
            },
        )
        .unwrap();
    assert_eq!(report.outcome(small.proposal_id), Some(&BatchOutcome::Applied));
    assert_eq!(
        report.outcome(large.proposal_id),
        Some(&BatchOutcome::Skipped {
            reason: SkipReason::ExceedsCap
        })
    );

    let undo = gw.undo_proposal(&coach, small.proposal_id).unwrap();
    assert_eq!(
        gw.get_proposal(&coach, small.proposal_id).unwrap().state,
        ProposalState::UndoPending
    );
    gw.apply_proposal(&coach, undo.proposal_id).unwrap();
    assert_eq!(
        gw.get_proposal(&coach, small.proposal_id).unwrap().state,
        ProposalState::Undone
    );
    assert_eq!(
        gw.get_draft(&coach, draft.draft_id).unwrap().plan,
        json!({"sessions": {"mon": {"hours": 1.0}}})
    );

    let actions: Vec<AuditAction> = gw
        .draft_audit(&coach, draft.draft_id)
        .unwrap()
        .into_iter()
        .map(|r| r.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::DraftCreated,
            AuditAction::ProposalCreated,
            AuditAction::ProposalCreated,
            AuditAction::ProposalApplied,
            AuditAction::ProposalCreated,
            AuditAction::UndoRequested,
            AuditAction::ProposalApplied,
            AuditAction::UndoCompleted,
        ]
    );

    let applied = gw
        .draft_audit(&coach, draft.draft_id)
        .unwrap()
        .into_iter()
        .find(|r| r.action == AuditAction::ProposalApplied)
        .unwrap();
    assert_eq!(applied.metadata["cost_estimate"]["amount"], 80.0);
    assert_eq!(applied.metadata["cost_estimate"]["currency"], "USD");
}

#[test]
fn callers_outside_the_roster_are_turned_away() {
    let dir = tempdir().unwrap();
    let gw = project(dir.path());

    assert_eq!(gw.authenticate("stranger").unwrap_err().code(), "unauthorized");

    let coach_1 = gw.authenticate("coach-1").unwrap();
    let coach_2 = gw.authenticate("coach-2").unwrap();
    let draft = gw
        .create_draft(&coach_1, "athlete-1", json!({"sessions": {}}), None)
        .unwrap();
    let p = gw.create_proposal(&coach_1, draft.draft_id, edit("mon", 1.0)).unwrap();

    for err in [
        gw.apply_proposal(&coach_2, p.proposal_id).unwrap_err(),
        gw.reject_proposal(&coach_2, p.proposal_id).unwrap_err(),
        gw.create_proposal(&coach_2, draft.draft_id, edit("tue", 1.0))
            .unwrap_err(),
        gw.get_draft(&coach_2, draft.draft_id).unwrap_err(),
    ] {
        assert_eq!(err.code(), "forbidden");
    }

    // Nothing the second coach tried left a trace.
    assert_eq!(
        gw.get_proposal(&coach_1, p.proposal_id).unwrap().state,
        ProposalState::Pending
    );
    assert_eq!(gw.draft_audit(&coach_1, draft.draft_id).unwrap().len(), 2);
}

#[test]
fn policy_change_is_stale_until_refresh_and_audited() {
    let dir = tempdir().unwrap();
    let gw = project(dir.path());
    let ops = gw.authenticate("ops").unwrap();
    let coach = gw.authenticate("coach-1").unwrap();

    let draft = gw
        .create_draft(&coach, "athlete-1", json!({"sessions": {}}), None)
        .unwrap();
    let p = gw.create_proposal(&coach, draft.draft_id, edit("sun", 3.0)).unwrap();

    let bundle = serde_json::from_value(json!({"max_hours_delta": 2.0})).unwrap();
    gw.upsert_policy_profile(&ops, "default", bundle).unwrap();

    // Stale cache: the old 5h limit still applies.
    assert!(gw.preview_proposal(&coach, p.proposal_id).unwrap().verdict.pass);

    gw.refresh_policy_cache(&coach).unwrap();
    let err = gw.apply_proposal(&coach, p.proposal_id).unwrap_err();
    assert_eq!(err.code(), "safety-rejected");
    assert_eq!(
        gw.get_proposal(&coach, p.proposal_id).unwrap().state,
        ProposalState::Pending
    );

    let history = gw.policy_audit(&ops, "default").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, AuditAction::PolicyUpserted);
    assert_eq!(history[0].actor_id, "ops");
}

#[test]
fn export_and_verify_survive_reopen() {
    let dir = tempdir().unwrap();
    {
        let gw = project(dir.path());
        let coach = gw.authenticate("coach-1").unwrap();
        let draft = gw
            .create_draft(&coach, "athlete-1", json!({"sessions": {}}), None)
            .unwrap();
        let p = gw.create_proposal(&coach, draft.draft_id, edit("wed", 1.5)).unwrap();
        gw.reject_proposal(&coach, p.proposal_id).unwrap();
    }

    let gw = project(dir.path());
    let ops = gw.authenticate("ops").unwrap();
    assert_eq!(gw.verify_audit(&ops).unwrap(), 3);

    let (path, count) = gw.export_audit(&ops, None).unwrap();
    assert_eq!(path, dir.path().join(".stride/audit.jsonl"));
    assert_eq!(count, 3);
    assert_eq!(AuditLog::verify_file(&path).unwrap(), 3);
}

// tests/lifecycle.rs

//! Status transition and audited reset tests.

mod common;

use common::{init_repo, last_message, seed, with_status};
use litrev::lifecycle::{ChangeKind, StatusMachine};
use litrev::ops;
use litrev::record::{PRESCREEN_EXCLUSION_FIELD, RecordStatus, SCREENING_CRITERIA_FIELD};
use litrev::Error;

#[test]
fn test_backward_transition_is_rejected() {
    let mut machine = StatusMachine::new();
    let mut record = with_status("Smith2020", "crossref.bib", "10.1/a", "A study", RecordStatus::Processed);

    let result = machine.transition(&mut record, RecordStatus::Prepared);
    assert!(matches!(
        result,
        Err(Error::ProcessOrderViolation {
            from: RecordStatus::Processed,
            to: RecordStatus::Prepared,
            ..
        })
    ));
    assert_eq!(record.status, RecordStatus::Processed);
    assert!(machine.audit().is_empty());

    // Sibling states are not reachable either
    let mut excluded = with_status("Lee2019", "crossref.bib", "10.1/b", "B study", RecordStatus::Excluded);
    assert!(matches!(
        machine.transition(&mut excluded, RecordStatus::Included),
        Err(Error::ProcessOrderViolation { .. })
    ));
}

#[test]
fn test_forward_transition_checks_target_conditions() {
    let mut machine = StatusMachine::new();
    let mut record = with_status("Smith2020", "crossref.bib", "10.1/a", "A study", RecordStatus::Processed);

    assert!(matches!(
        machine.transition(&mut record, RecordStatus::PrescreenExcluded),
        Err(Error::RecordNotReady { .. })
    ));
    record.insert_field(PRESCREEN_EXCLUSION_FIELD, "out of scope");
    machine.transition(&mut record, RecordStatus::PrescreenExcluded).unwrap();

    let audit = machine.take_audit();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].kind, ChangeKind::Transition);
    assert_eq!(audit[0].from, RecordStatus::Processed);
    assert!(machine.audit().is_empty());
}

#[test]
fn test_reset_is_audited_in_change_log() {
    let (_dir, mut ctx) = init_repo();
    let mut included = with_status("Smith2020", "crossref.bib", "10.1/a", "A study", RecordStatus::Included);
    included.insert_field(SCREENING_CRITERIA_FIELD, "platform=in");
    seed(&mut ctx, vec![included]);

    ops::reset(
        &mut ctx,
        &["Smith2020".to_string()],
        RecordStatus::Processed,
        "screening redone with new criteria",
    )
    .unwrap();

    let records = ctx.load_records().unwrap();
    assert_eq!(records["Smith2020"].status, RecordStatus::Processed);
    assert_eq!(records["Smith2020"].get(SCREENING_CRITERIA_FIELD), None);

    let message = last_message(&ctx);
    assert!(message.starts_with("Reset 1 records to md_processed"));
    assert!(message.contains("screening redone with new criteria"));
}

#[test]
fn test_invalid_reset_leaves_batch_untouched() {
    let (dir, mut ctx) = init_repo();
    seed(
        &mut ctx,
        vec![
            with_status("Smith2020", "crossref.bib", "10.1/a", "A study", RecordStatus::PrescreenIncluded),
            with_status("Lee2019", "crossref.bib", "10.1/b", "B study", RecordStatus::Prepared),
        ],
    );
    let before = std::fs::read_to_string(dir.path().join("data/records.bib")).unwrap();

    // Lee2019 is not past md_processed
    let result = ops::reset(
        &mut ctx,
        &["Smith2020".to_string(), "Lee2019".to_string()],
        RecordStatus::Processed,
        "redo",
    );
    assert!(matches!(result, Err(Error::InvalidReset { .. })));

    let result = ops::reset(&mut ctx, &["Smith2020".to_string()], RecordStatus::Processed, "  ");
    assert!(matches!(result, Err(Error::InvalidReset { .. })));

    assert_eq!(
        std::fs::read_to_string(dir.path().join("data/records.bib")).unwrap(),
        before
    );
    assert!(ctx.machine.audit().is_empty());
}

#[test]
fn test_screening_respects_process_order() {
    let (_dir, mut ctx) = init_repo();
    seed(
        &mut ctx,
        vec![
            with_status("Smith2020", "crossref.bib", "10.1/a", "A study", RecordStatus::Prepared),
            with_status("Lee2019", "crossref.bib", "10.1/b", "B study", RecordStatus::Processed),
        ],
    );

    // Smith2020 was never deduplicated; the batch fails as a whole
    let decision = ops::ScreenDecision::Decide {
        include: vec!["Lee2019".to_string(), "Smith2020".to_string()],
        exclude: Vec::new(),
        reason: String::new(),
    };
    assert!(matches!(
        ops::prescreen(&mut ctx, &decision),
        Err(Error::RecordNotReady { ref id, .. }) if id == "Smith2020"
    ));

    let records = ctx.load_records().unwrap();
    assert_eq!(records["Lee2019"].status, RecordStatus::Processed);
    assert_eq!(records["Smith2020"].status, RecordStatus::Prepared);
    assert!(ctx.machine.audit().is_empty());

    // Decided records cannot be decided the other way
    let include = ops::ScreenDecision::Decide {
        include: vec!["Lee2019".to_string()],
        exclude: Vec::new(),
        reason: String::new(),
    };
    ops::prescreen(&mut ctx, &include).unwrap();
    let exclude = ops::ScreenDecision::Decide {
        include: Vec::new(),
        exclude: vec!["Lee2019".to_string()],
        reason: "out of scope".to_string(),
    };
    assert!(matches!(
        ops::prescreen(&mut ctx, &exclude),
        Err(Error::ProcessOrderViolation { .. })
    ));
}

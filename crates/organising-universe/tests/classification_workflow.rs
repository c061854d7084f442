use std::sync::Arc;

use organising_universe::config::ReconcileConfig;
use organising_universe::workflows::classification::{
    evaluate, import_seed, read_seed, ActorId, BatchStatus, Classification, ClassificationService,
    InMemoryProjectStore, InMemorySignals, ProjectId, RuleApplied, Tier,
};

type Service = ClassificationService<InMemoryProjectStore, InMemorySignals>;

fn seeded_service() -> (Service, Arc<InMemorySignals>) {
    let store = Arc::new(InMemoryProjectStore::new());
    let signals = Arc::new(InMemorySignals::new());
    let service = ClassificationService::new(
        store,
        signals.clone(),
        signals.clone(),
        ReconcileConfig::default(),
    );

    let data = include_bytes!("../sample_projects.csv");
    let rows = read_seed(&data[..]).expect("sample seed parses");
    let imported = import_seed(&service, &signals, &rows).expect("seed imports");
    assert_eq!(imported, 10);
    (service, signals)
}

fn classification_of(service: &Service, id: &str) -> Classification {
    service
        .get(&ProjectId::from(id))
        .expect("project exists")
        .classification
}

#[test]
fn rule_table_matches_documented_outcomes() {
    use Classification::*;

    assert_eq!(evaluate(Tier::Tier1, false, false), Active);
    assert_eq!(evaluate(Tier::Tier2, true, true), Active);
    assert_eq!(evaluate(Tier::Tier3, true, true), Active);
    assert_eq!(evaluate(Tier::Tier2, false, true), Potential);
    assert_eq!(evaluate(Tier::Tier3, false, true), Potential);
    assert_eq!(evaluate(Tier::Tier3, false, false), Excluded);
    assert_eq!(evaluate(Tier::Tier3, true, false), Potential);
    assert_eq!(evaluate(Tier::Tier2, false, false), Potential);
    assert_eq!(evaluate(Tier::Tier2, true, false), Potential);
}

#[test]
fn seed_import_classifies_rows_without_explicit_value() {
    let (service, _) = seeded_service();

    assert_eq!(
        classification_of(&service, "barangaroo-north"),
        Classification::Active
    );
    assert_eq!(
        classification_of(&service, "westmead-hospital"),
        Classification::Active
    );
    assert_eq!(
        classification_of(&service, "olympic-park-towers"),
        Classification::Potential
    );
    assert_eq!(
        classification_of(&service, "marrickville-library"),
        Classification::Excluded
    );
    assert_eq!(
        classification_of(&service, "redfern-fitout"),
        Classification::Potential
    );
    assert!(service.audit_feed().expect("feed").is_empty());
}

#[test]
fn retrospective_apply_converges_stale_rows() {
    let (service, _) = seeded_service();
    let actor = ActorId::from("data-steward");

    let preview = service
        .trigger_retrospective_apply(true, &actor)
        .expect("dry run");
    assert_eq!(preview.total_scanned, 10);
    assert_eq!(preview.total_eligible, 3);
    assert_eq!(preview.total_updated, 0);

    let applied = service
        .trigger_retrospective_apply(false, &actor)
        .expect("commit");
    assert_eq!(applied.total_updated, 3);
    assert_eq!(applied.status, BatchStatus::Completed);

    assert_eq!(
        classification_of(&service, "parramatta-light-rail"),
        Classification::Active
    );
    assert_eq!(
        classification_of(&service, "epping-apartments"),
        Classification::Potential
    );
    assert_eq!(
        classification_of(&service, "blacktown-warehouse"),
        Classification::Excluded
    );
    // No tier: the stale value stays.
    assert_eq!(
        classification_of(&service, "liverpool-depot"),
        Classification::Excluded
    );

    let again = service
        .trigger_retrospective_apply(false, &actor)
        .expect("second pass");
    assert_eq!(again.total_eligible, 0);
}

#[test]
fn snapshot_rollback_and_reset_lifecycle() {
    let (service, signals) = seeded_service();
    let actor = ActorId::from("admin");

    service.snapshot().expect("snapshot");
    service
        .trigger_retrospective_apply(false, &actor)
        .expect("apply");
    let redfern = ProjectId::from("redfern-fitout");
    signals.set_tier(&redfern, Some(Tier::Tier1));
    service.reconcile(&redfern, None).expect("reconcile");

    let rollback = service.rollback(true, &actor).expect("rollback");
    assert_eq!(rollback.restored, 4);
    assert_eq!(rollback.status, BatchStatus::Completed);
    assert_eq!(
        classification_of(&service, "epping-apartments"),
        Classification::Active
    );

    let rollback_records = service
        .audit_feed()
        .expect("feed")
        .into_iter()
        .filter(|record| record.rule_applied == RuleApplied::RollbackFunction)
        .count();
    assert_eq!(rollback_records, 4);

    let summary = service.clear_all_automation(true).expect("reset");
    assert_eq!(summary.projects_reset, 10);
    assert!(service.audit_feed().expect("feed").is_empty());
    let project = service
        .get(&ProjectId::from("epping-apartments"))
        .expect("project");
    assert!(!project.automation.is_manual);
    assert_eq!(project.classification, Classification::Active);
}

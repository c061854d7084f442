use crate::infra::{in_memory_service, load_seed, spawn_dispatcher, MemoryService};
use clap::Args;
use organising_universe::config::ReconcileConfig;
use organising_universe::error::AppError;
use organising_universe::workflows::classification::{
    ActorId, AssignmentChange, ContractorRole, DomainEvent, JobSiteId, PatchChange, ProjectId,
    RetrospectiveReport, RouteOutcome,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Actor recorded on manual and administrative changes
    #[arg(long, default_value = "demo-organiser")]
    pub(crate) actor: String,
    /// Stop before restoring the snapshot taken at the start of the demo
    #[arg(long)]
    pub(crate) skip_rollback: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RetrospectiveArgs {
    /// Project seed CSV (`project_id,tier,eba,patch,classification`). Rows with an explicit
    /// classification keep it at load time, so drift from the rules shows up in the report.
    #[arg(long)]
    pub(crate) seed_csv: PathBuf,
    /// Commit the changes instead of reporting a dry run
    #[arg(long)]
    pub(crate) commit: bool,
    /// Actor recorded on committed changes
    #[arg(long, default_value = "cli")]
    pub(crate) actor: String,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        actor,
        skip_rollback,
    } = args;
    let actor = ActorId(actor);
    let config = ReconcileConfig::default();

    println!("Organising universe demo");
    let (service, signals) = in_memory_service(config);
    let imported = load_seed(&service, &signals, None)?;
    println!("- Registered {imported} projects from the built-in portfolio");
    render_portfolio(&service)?;

    let snapshot = service.snapshot()?;
    println!(
        "\nSnapshot captured at {} ({} rows)",
        snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.rows
    );

    println!("\nPatch coverage closed on westgate-hospital (queued through the dispatcher)");
    let site = JobSiteId("westgate-hospital-site".to_string());
    signals.close_patch(&site);
    let dispatcher = spawn_dispatcher(&service, config.dispatch_workers);
    let queued = dispatcher
        .dispatch(DomainEvent::PatchAssignmentChanged {
            job_site_id: site,
            change: PatchChange::Closed,
        })
        .await;
    if let Err(err) = queued {
        println!("  Event not queued: {err}");
    }
    dispatcher.shutdown().await;
    let westgate = service.get(&ProjectId::from("westgate-hospital"))?;
    println!("  westgate-hospital is now {}", westgate.classification);

    let harbour = ProjectId::from("harbour-tower");
    println!("\nManual override on {harbour}");
    let pinned = service.set_manual(&harbour, "excluded", &actor, "board decision")?;
    println!("- Pinned {} -> {} by {}", pinned.old, pinned.new, actor);
    let routed = service.route_event(&DomainEvent::ContractorAssignmentChanged {
        project_id: harbour.clone(),
        role: ContractorRole::Builder,
        change: AssignmentChange::Updated,
    })?;
    println!("- Builder reassignment event: {}", describe_route(&routed));
    let cleared = service.clear_manual(&harbour, &actor, "board review complete")?;
    println!(
        "- Override cleared: {} -> {} ({} audit records)",
        cleared.previous,
        cleared.current,
        cleared.records.len()
    );

    println!("\nnorthside-school head contractor certifies an EBA");
    signals.set_certified_eba(&ProjectId::from("northside-school"), true);
    let preview = service.trigger_retrospective_apply(true, &actor)?;
    render_retrospective(&preview);
    let applied = service.trigger_retrospective_apply(false, &actor)?;
    render_retrospective(&applied);

    if !skip_rollback {
        let rollback = service.rollback(true, &actor)?;
        println!(
            "\nRollback: {} of {} projects restored and pinned ({} missing, status {:?})",
            rollback.restored, rollback.snapshot_total, rollback.missing, rollback.status
        );
    }

    render_portfolio(&service)?;
    render_audit(&service)?;
    Ok(())
}

pub(crate) fn run_retrospective(args: RetrospectiveArgs) -> Result<(), AppError> {
    let RetrospectiveArgs {
        seed_csv,
        commit,
        actor,
    } = args;

    let (service, signals) = in_memory_service(ReconcileConfig::default());
    let imported = load_seed(&service, &signals, Some(seed_csv.as_path()))?;
    println!("Loaded {imported} projects from {}", seed_csv.display());

    let report = service.trigger_retrospective_apply(!commit, &ActorId(actor))?;
    render_retrospective(&report);
    if commit {
        render_portfolio(&service)?;
    }
    Ok(())
}

fn describe_route(outcome: &RouteOutcome) -> String {
    match outcome {
        RouteOutcome::Ignored { reason } => format!("ignored ({reason:?})"),
        RouteOutcome::Reconciled { outcome } => outcome.summary(),
    }
}

fn render_portfolio(service: &MemoryService) -> Result<(), AppError> {
    println!("\nPortfolio");
    for project in service.projects()? {
        let ownership = if project.automation.is_manual {
            "manual"
        } else if project.automation.is_auto {
            "auto"
        } else {
            "unset"
        };
        println!(
            "  - {:<20} {:<10} [{}]",
            project.id.0,
            project.classification.label(),
            ownership
        );
    }
    Ok(())
}

fn render_retrospective(report: &RetrospectiveReport) {
    let mode = if report.dry_run { "dry run" } else { "commit" };
    println!(
        "\nRetrospective apply ({mode}): scanned {} | eligible {} | updated {} | status {:?}",
        report.total_scanned, report.total_eligible, report.total_updated, report.status
    );
    for change in &report.changes {
        println!(
            "  - {}: {} -> {} ({})",
            change.project_id, change.old, change.new, change.reason
        );
    }
    for failure in &report.failures {
        println!("  ! {}: {}", failure.project_id, failure.error);
    }
}

fn render_audit(service: &MemoryService) -> Result<(), AppError> {
    println!("\nAudit trail");
    for record in service.audit_feed()? {
        let actor = record
            .applied_by
            .as_ref()
            .map(|actor| actor.0.as_str())
            .unwrap_or("automation");
        println!(
            "  #{:<3} {:<20} {:<9} -> {:<9} [{}] by {}: {}",
            record.id.0,
            record.project_id.0,
            record.old_value.label(),
            record.new_value.label(),
            record.rule_applied.label(),
            actor,
            record.reason
        );
    }
    Ok(())
}

use metrics_exporter_prometheus::PrometheusHandle;
use organising_universe::config::ReconcileConfig;
use organising_universe::error::AppError;
use organising_universe::workflows::classification::{
    import_seed, read_seed_path, ClassificationService, EventDispatcher, InMemoryProjectStore,
    InMemorySignals, ProjectId, SeedRow, Tier,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type MemoryService = ClassificationService<InMemoryProjectStore, InMemorySignals>;

/// Queue depth per dispatch worker before `dispatch` starts applying backpressure.
const EVENTS_PER_WORKER: usize = 64;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) events: Arc<EventDispatcher>,
}

pub(crate) fn in_memory_service(
    config: ReconcileConfig,
) -> (Arc<MemoryService>, Arc<InMemorySignals>) {
    let store = Arc::new(InMemoryProjectStore::new());
    let signals = Arc::new(InMemorySignals::new());
    let service = Arc::new(ClassificationService::new(
        store,
        signals.clone(),
        signals.clone(),
        config,
    ));
    (service, signals)
}

pub(crate) fn spawn_dispatcher(service: &MemoryService, workers: usize) -> EventDispatcher {
    EventDispatcher::spawn(
        service.event_router(),
        workers,
        workers.saturating_mul(EVENTS_PER_WORKER),
    )
}

pub(crate) fn load_seed(
    service: &MemoryService,
    signals: &InMemorySignals,
    path: Option<&Path>,
) -> Result<usize, AppError> {
    let rows = match path {
        Some(path) => read_seed_path(path)?,
        None => demo_seed(),
    };
    let imported = import_seed(service, signals, &rows)?;
    info!(imported, source = ?path, "project seed loaded");
    Ok(imported)
}

/// Small portfolio covering every rule branch.
pub(crate) fn demo_seed() -> Vec<SeedRow> {
    let row = |id: &str, tier: Option<Tier>, certified_eba: bool, patch: bool| SeedRow {
        project_id: ProjectId::from(id),
        tier,
        certified_eba,
        patch,
        classification: None,
    };

    vec![
        row("harbour-tower", Some(Tier::Tier1), false, false),
        row("westgate-hospital", Some(Tier::Tier2), true, true),
        row("northside-school", Some(Tier::Tier2), false, true),
        row("riverbank-units", Some(Tier::Tier3), false, false),
        row("civic-library", Some(Tier::Tier3), true, false),
        row("depot-refit", None, false, false),
    ]
}

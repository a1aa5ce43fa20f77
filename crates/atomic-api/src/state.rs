//! Shared handler state.

use atomic_db::{Database, Stores};
use atomic_jobs::BackgroundJobAdapter;
use atomic_pipeline::PipelineOrchestrator;
use atomic_search::SemanticSearch;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    /// Shares its run registry with the job worker's orchestrator clones.
    pub orchestrator: PipelineOrchestrator,
    pub search: SemanticSearch,
    pub jobs: BackgroundJobAdapter,
    /// Present when backed by Postgres; `/health` pings it.
    pub db: Option<Database>,
}

impl AppState {
    pub fn new(stores: Stores, orchestrator: PipelineOrchestrator, search: SemanticSearch) -> Self {
        Self {
            jobs: BackgroundJobAdapter::new(stores.jobs.clone()),
            stores,
            orchestrator,
            search,
            db: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }
}

use std::sync::Arc;

use crate::middleware::PipelineConfig;
use crate::session::{MemorySessionStore, SessionStore};
use crate::stores::memory::{MemoryAuditSink, MemoryCache, MemoryStore};
use crate::stores::postgres::{PostgresAuditSink, PostgresStore};
use crate::stores::{
    AuditSink, CacheStore, PlatformAdmin, PrincipalStore, TenantDirectory, UsageCounter,
};

/// Everything the pipeline and handlers need, cloned into each middleware and
/// handler via axum state. All stores are trait objects so the same router
/// runs against Postgres in production and the in-memory stores in tests.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn TenantDirectory>,
    pub principals: Arc<dyn PrincipalStore>,
    pub usage: Arc<dyn UsageCounter>,
    pub audit: Arc<dyn AuditSink>,
    pub sessions: Arc<dyn SessionStore>,
    pub cache: Arc<dyn CacheStore>,
    pub admin: Arc<dyn PlatformAdmin>,
    pub pipeline: Arc<PipelineConfig>,
}

impl AppState {
    /// Production wiring: Postgres-backed stores, process-local sessions and
    /// rate-limit counters
    pub fn postgres(pipeline: PipelineConfig) -> Self {
        let store = Arc::new(PostgresStore::new());
        Self {
            directory: store.clone(),
            principals: store.clone(),
            usage: store.clone(),
            audit: Arc::new(PostgresAuditSink),
            sessions: Arc::new(MemorySessionStore::new()),
            cache: Arc::new(MemoryCache::new()),
            admin: store,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Test and STORAGE=memory wiring: one shared in-memory store behind
    /// every interface
    pub fn in_memory(pipeline: PipelineConfig) -> Self {
        Self::with_memory_store(Arc::new(MemoryStore::new()), pipeline)
    }

    /// Same as `in_memory` but over a caller-owned store, so tests can seed
    /// and inspect it
    pub fn with_memory_store(store: Arc<MemoryStore>, pipeline: PipelineConfig) -> Self {
        Self {
            directory: store.clone(),
            principals: store.clone(),
            usage: store.clone(),
            audit: Arc::new(MemoryAuditSink::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            cache: Arc::new(MemoryCache::new()),
            admin: store,
            pipeline: Arc::new(pipeline),
        }
    }
}

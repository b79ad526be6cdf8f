use salesdesk_core::{ComposerIdentity, ErpOrderService, LocalOrderStore, LookupGateway};
use salesdesk_order::{
    CommitOrchestrator, ComposeSession, SelectionResolver, WarehouseAssignmentOrchestrator,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub type SharedSession = Arc<Mutex<ComposeSession>>;

struct Entry {
    session: SharedSession,
    touched: Instant,
}

/// Open composition sessions, one per field-app screen. A session only lives
/// in memory; closing it, committing it or leaving it idle discards whatever
/// was staged.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self) -> (Uuid, SharedSession) {
        let session = ComposeSession::new();
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(
            id,
            Entry {
                session: shared.clone(),
                touched: Instant::now(),
            },
        );
        tracing::info!(session_id = %id, "Session opened");
        (id, shared)
    }

    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.touched = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn close(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Session closed");
        }
        removed
    }

    /// Drops sessions untouched for at least `max_idle`. Sessions that are
    /// locked or have a commit outstanding are left alone.
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            if entry.touched.elapsed() < max_idle {
                return true;
            }
            let busy = match entry.session.try_lock() {
                Ok(session) => session.is_commit_in_flight(),
                Err(_) => true,
            };
            if !busy {
                tracing::info!(session_id = %id, "Idle session expired");
            }
            busy
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub resolver: SelectionResolver,
    pub commits: Arc<CommitOrchestrator>,
    pub assignments: Arc<WarehouseAssignmentOrchestrator>,
}

impl AppState {
    pub fn new(
        lookup: Arc<dyn LookupGateway>,
        erp: Arc<dyn ErpOrderService>,
        store: Arc<dyn LocalOrderStore>,
        identity: ComposerIdentity,
        status_marker: &str,
    ) -> Self {
        let commits = CommitOrchestrator::new(erp.clone(), store.clone(), identity.clone())
            .with_status_marker(status_marker);
        Self {
            sessions: Arc::new(SessionRegistry::new()),
            resolver: SelectionResolver::new(lookup),
            commits: Arc::new(commits),
            assignments: Arc::new(WarehouseAssignmentOrchestrator::new(erp, store, identity)),
        }
    }

    pub fn lookup(&self) -> &Arc<dyn LookupGateway> {
        self.resolver.gateway()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let registry = SessionRegistry::new();
        let (kept, _) = registry.open().await;
        let (idle, _) = registry.open().await;
        assert_eq!(registry.len().await, 2);

        assert_eq!(registry.expire_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.expire_idle(Duration::ZERO).await, 2);
        assert_eq!(registry.len().await, 0);
        assert!(registry.get(kept).await.is_none());
        assert!(registry.get(idle).await.is_none());
    }

    #[tokio::test]
    async fn test_busy_session_survives_expiry() {
        let registry = SessionRegistry::new();
        let (id, session) = registry.open().await;

        let guard = session.lock().await;
        assert_eq!(registry.expire_idle(Duration::ZERO).await, 0);
        drop(guard);

        assert!(registry.get(id).await.is_some());
        assert_eq!(registry.expire_idle(Duration::ZERO).await, 1);
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::config::SESSION_TTL;
use crate::crypto::SecretBox;
use crate::db::DbPool;
use crate::services::random_session_id;

#[derive(Clone, Copy, Debug)]
pub struct Session {
    pub user_id: Uuid,
    pub created_at: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub cache: ResponseCache,
    pub secrets: SecretBox,
    /// Session id (cookie value) to the signed-in user.
    pub sessions: Arc<RwLock<HashMap<String, Session>>>,
    pub session_ttl: Duration,
    /// Serializes first-admin sign-ins within this process.
    pub bootstrap_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(db: DbPool, secrets: SecretBox, cache_ttl: Duration) -> Self {
        Self {
            db,
            cache: ResponseCache::new(cache_ttl),
            secrets,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: SESSION_TTL,
            bootstrap_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Opens a session for `user_id`, dropping any that have expired.
    pub async fn start_session(&self, user_id: Uuid) -> String {
        let sid = random_session_id();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.created_at) < self.session_ttl);
        if sessions.len() < before {
            tracing::debug!(pruned = before - sessions.len(), "Pruned expired sessions");
        }
        sessions.insert(sid.clone(), Session { user_id, created_at: now });
        sid
    }

    pub async fn session_user(&self, sid: &str) -> Option<Uuid> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(sid)?;
        (session.created_at.elapsed() < self.session_ttl).then_some(session.user_id)
    }

    pub async fn end_session(&self, sid: &str) {
        self.sessions.write().await.remove(sid);
    }
}

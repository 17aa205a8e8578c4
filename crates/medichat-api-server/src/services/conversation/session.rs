use super::types::ConversationState;
use dashmap::DashMap;
use std::sync::Arc;
use sysinfo::System;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Thread-safe in-memory session registry.
/// Maps opaque session ids to per-conversation state; one user's buffer is
/// never reachable from another session id.
#[derive(Clone)]
pub struct SessionCache {
    storage: Arc<DashMap<String, ConversationState>>,

    /// System info for RAM monitoring
    system: Arc<parking_lot::Mutex<System>>,
}

impl SessionCache {
    pub fn new() -> Self {
        info!("Initializing session cache");
        Self {
            storage: Arc::new(DashMap::new()),
            system: Arc::new(parking_lot::Mutex::new(System::new_all())),
        }
    }

    /// Issue a new session with a derived stable user identity.
    pub fn create(&self) -> ConversationState {
        let session_id = Uuid::new_v4().to_string();
        let user_id = format!("user_{}", &session_id[..8]);
        let state = ConversationState::new(session_id.clone(), user_id);

        self.storage.insert(session_id.clone(), state.clone());
        info!("Session {} created (user {})", session_id, state.user_id);
        state
    }

    /// Get session state by id. Returns None if unknown or expired.
    pub fn get(&self, session_id: &str) -> Option<ConversationState> {
        let entry = self.storage.get(session_id)?;
        let state = entry.value().clone();

        // Lazy expiration
        if state.is_expired() {
            drop(entry);
            self.remove(session_id);
            debug!("Session {} expired, removed from cache", session_id);
            return None;
        }

        debug!(
            "Retrieved session {} (age: {:?})",
            session_id,
            state.created_at.elapsed()
        );
        Some(state)
    }

    pub fn set(&self, session_id: String, state: ConversationState) {
        self.storage.insert(session_id, state);
    }

    pub fn remove(&self, session_id: &str) -> Option<ConversationState> {
        self.storage.remove(session_id).map(|(_, state)| state)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Refuse new sessions above 90% RAM to bound in-process growth.
    pub fn can_create_new_session(&self) -> bool {
        let mut sys = self.system.lock();
        sys.refresh_memory();

        let total_memory = sys.total_memory();
        let used_memory = sys.used_memory();
        let usage_percent = (used_memory as f64 / total_memory as f64) * 100.0;

        if usage_percent >= 90.0 {
            warn!(
                "Memory usage at {:.2}%, rejecting new session",
                usage_percent
            );
            return false;
        }

        true
    }

    /// Drop expired sessions. Returns number removed.
    pub fn cleanup_expired(&self) -> usize {
        let start_len = self.storage.len();
        self.storage
            .retain(|_, state: &mut ConversationState| !state.is_expired());
        let count = start_len.saturating_sub(self.storage.len());

        if count > 0 {
            info!("Cleaned up {} expired sessions", count);
        }

        count
    }

    pub fn stats(&self) -> SessionStats {
        let mut sys = self.system.lock();
        sys.refresh_memory();

        SessionStats {
            active_sessions: self.len(),
            memory_usage_mb: sys.used_memory() / 1024 / 1024,
            memory_total_mb: sys.total_memory() / 1024 / 1024,
        }
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub memory_usage_mb: u64,
    pub memory_total_mb: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::types::SESSION_TTL;
    use std::time::{Duration, Instant};

    fn back_dated() -> Instant {
        Instant::now()
            .checked_sub(SESSION_TTL + Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let cache = SessionCache::new();
        let state = cache.create();

        assert_eq!(cache.len(), 1);
        assert!(state.user_id.starts_with("user_"));
        assert_eq!(state.user_id.len(), "user_".len() + 8);

        let retrieved = cache.get(&state.session_id);
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().user_id, state.user_id);
    }

    #[test]
    fn test_unknown_session() {
        let cache = SessionCache::new();
        assert!(cache.get("no-such-session").is_none());
    }

    #[test]
    fn test_remove() {
        let cache = SessionCache::new();
        let state = cache.create();

        cache.remove(&state.session_id);
        assert!(cache.is_empty());
        assert!(cache.get(&state.session_id).is_none());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let cache = SessionCache::new();
        let a = cache.create();
        let b = cache.create();

        let mut state_a = cache.get(&a.session_id).unwrap();
        state_a
            .messages
            .push(crate::models::chat::ChatMessage::user("private"));
        cache.set(a.session_id.clone(), state_a);

        let state_b = cache.get(&b.session_id).unwrap();
        assert!(state_b.messages.is_empty());
    }

    #[test]
    fn test_expired_session_is_removed_on_get() {
        let cache = SessionCache::new();
        let created = cache.create();

        let mut state = cache.get(&created.session_id).unwrap();
        state.last_active = back_dated();
        cache.set(created.session_id.clone(), state);

        assert!(cache.get(&created.session_id).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_keeps_fresh_sessions() {
        let cache = SessionCache::new();
        cache.create();
        cache.create();

        assert_eq!(cache.cleanup_expired(), 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cleanup_removes_only_expired_sessions() {
        let cache = SessionCache::new();
        let fresh = cache.create();
        let stale = cache.create();

        let mut state = cache.get(&stale.session_id).unwrap();
        state.last_active = back_dated();
        cache.set(stale.session_id.clone(), state);

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&fresh.session_id).is_some());
        assert!(cache.get(&stale.session_id).is_none());
    }

    #[test]
    fn test_can_create_new_session() {
        let cache = SessionCache::new();
        // Should always be true in test environment
        assert!(cache.can_create_new_session());
    }

    #[test]
    fn test_stats() {
        let cache = SessionCache::new();
        cache.create();
        let stats = cache.stats();
        assert_eq!(stats.active_sessions, 1);
        assert!(stats.memory_total_mb > 0);
    }
}

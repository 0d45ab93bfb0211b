//! Process-wide call registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::session::CallSession;

/// Concurrent map from call identifier to live session.
///
/// A session is registered from creation until the cleanup routine removes
/// it; removal happens exactly once because cleanup is idempotent.
#[derive(Default)]
pub struct CallRegistry {
    calls: RwLock<HashMap<String, Arc<CallSession>>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<CallSession>) {
        let sid = session.call_sid.clone();
        self.calls.write().insert(sid.clone(), session);
        tracing::info!(call_sid = %sid, "Registered call");
    }

    pub fn get(&self, call_sid: &str) -> Option<Arc<CallSession>> {
        self.calls.read().get(call_sid).cloned()
    }

    pub fn remove(&self, call_sid: &str) -> Option<Arc<CallSession>> {
        let removed = self.calls.write().remove(call_sid);
        if removed.is_some() {
            tracing::info!(call_sid = %call_sid, "Removed call");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.calls.read().len()
    }

    pub fn call_sids(&self) -> Vec<String> {
        self.calls.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AssistantConfig;

    fn session(sid: &str) -> Arc<CallSession> {
        Arc::new(CallSession::new(sid, "+1", "a", "o", AssistantConfig::default()))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = CallRegistry::new();
        registry.insert(session("CA1"));
        assert_eq!(registry.count(), 1);
        assert!(registry.get("CA1").is_some());
        assert!(registry.remove("CA1").is_some());
        assert!(registry.get("CA1").is_none());
        // Second removal is a no-op.
        assert!(registry.remove("CA1").is_none());
    }

    #[test]
    fn test_concurrent_inserts() {
        let registry = Arc::new(CallRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.insert(session(&format!("CA{i}"))))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.count(), 8);
    }
}

//! Connection registry for session tracking.
//!
//! The relay has one broadcast domain: every connected session receives
//! every position update except its own. The registry therefore only tracks
//! which sessions exist and who they said they were at handshake time.

use std::collections::HashMap;

/// Information about a registered session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Client-supplied name from the Hello handshake.
    pub client_name: Option<String>,
    /// Whether the session has completed the Hello handshake.
    pub greeted: bool,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionInfo {
    /// Create a new session info before the handshake.
    pub fn new() -> Self {
        Self { client_name: None, greeted: false }
    }

    /// Create a session info for a completed handshake.
    pub fn greeted(client_name: impl Into<String>) -> Self {
        Self { client_name: Some(client_name.into()), greeted: true }
    }
}

/// Registry of connected sessions.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<u64, SessionInfo>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session.
    ///
    /// Returns `false` if the session already exists.
    pub fn register_session(&mut self, session_id: u64, info: SessionInfo) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }
        self.sessions.insert(session_id, info);
        true
    }

    /// Unregister a session.
    ///
    /// Returns the session info if it existed.
    pub fn unregister_session(&mut self, session_id: u64) -> Option<SessionInfo> {
        self.sessions.remove(&session_id)
    }

    /// Session metadata. `None` if session doesn't exist.
    pub fn session(&self, session_id: u64) -> Option<&SessionInfo> {
        self.sessions.get(&session_id)
    }

    /// Check if a session is registered.
    pub fn has_session(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Replace a session's info.
    ///
    /// Returns `false` if the session doesn't exist.
    pub fn update_session_info(&mut self, session_id: u64, info: SessionInfo) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(slot) => {
                *slot = info;
                true
            },
            None => false,
        }
    }

    /// All registered sessions except the given one.
    ///
    /// These are the broadcast targets when `exclude` publishes a position.
    pub fn sessions_except(&self, exclude: u64) -> impl Iterator<Item = u64> + '_ {
        self.sessions.keys().copied().filter(move |id| *id != exclude)
    }

    /// Total number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup_session() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register_session(1, SessionInfo::new()));
        assert!(registry.has_session(1));
        assert!(!registry.has_session(2));

        let info = registry.session(1).unwrap();
        assert!(!info.greeted);
        assert!(info.client_name.is_none());
    }

    #[test]
    fn register_duplicate_session_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register_session(1, SessionInfo::new()));
        assert!(!registry.register_session(1, SessionInfo::new()));
    }

    #[test]
    fn unregister_session_returns_info() {
        let mut registry = ConnectionRegistry::new();

        registry.register_session(1, SessionInfo::greeted("dispatch-board"));

        let info = registry.unregister_session(1).unwrap();
        assert!(info.greeted);
        assert_eq!(info.client_name.as_deref(), Some("dispatch-board"));

        assert!(!registry.has_session(1));
    }

    #[test]
    fn sessions_except_excludes_only_the_sender() {
        let mut registry = ConnectionRegistry::new();

        for id in [1, 2, 3] {
            registry.register_session(id, SessionInfo::new());
        }

        let mut targets: Vec<_> = registry.sessions_except(2).collect();
        targets.sort_unstable();
        assert_eq!(targets, vec![1, 3]);
    }

    #[test]
    fn sessions_except_with_unknown_sender_returns_all() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1, SessionInfo::new());

        let targets: Vec<_> = registry.sessions_except(999).collect();
        assert_eq!(targets, vec![1]);
    }

    #[test]
    fn update_session_info_after_handshake() {
        let mut registry = ConnectionRegistry::new();

        registry.register_session(1, SessionInfo::new());
        assert!(registry.update_session_info(1, SessionInfo::greeted("driver-app")));

        let info = registry.session(1).unwrap();
        assert!(info.greeted);
        assert_eq!(info.client_name.as_deref(), Some("driver-app"));

        assert!(!registry.update_session_info(999, SessionInfo::new()));
    }

    #[test]
    fn session_count() {
        let mut registry = ConnectionRegistry::new();

        assert_eq!(registry.session_count(), 0);

        registry.register_session(1, SessionInfo::new());
        registry.register_session(2, SessionInfo::new());
        assert_eq!(registry.session_count(), 2);

        registry.unregister_session(1);
        assert_eq!(registry.session_count(), 1);
    }
}

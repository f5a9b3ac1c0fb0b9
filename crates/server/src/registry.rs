//! Online registry: bearer token to live connection handle.
//!
//! The registry never owns a connection. Each entry holds a
//! [`ConnectionSender`], a cheap clone of the connection's outbound queue
//! handle; once the connection's pumps exit the channel closes and the entry
//! is pruned on the next lookup or enumeration.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::connection::ConnectionSender;

/// One authenticated connection as visible to its peers.
#[derive(Clone)]
pub struct OnlineEntry {
    pub sender: ConnectionSender,
    pub user_id: i64,
    pub username: String,
}

/// Process-wide map from bearer token to live connection, behind one mutex.
#[derive(Default)]
pub struct OnlineRegistry {
    inner: Mutex<HashMap<String, OnlineEntry>>,
}

impl OnlineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, OnlineEntry>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers an authenticated connection under its token.
    pub fn add(&self, token: impl Into<String>, entry: OnlineEntry) {
        self.lock().insert(token.into(), entry);
    }

    /// Removes the entry for `token`. Returns whether one existed.
    pub fn remove(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    /// Removes whatever entry belongs to this connection, pruning dead
    /// entries along the way. Returns whether a matching entry existed.
    pub fn remove_conn(&self, sender: &ConnectionSender) -> bool {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| e.sender.is_connected() && !e.sender.same_channel(sender));
        before != map.len()
    }

    /// Resolves a token to a live connection handle.
    ///
    /// A dead entry is pruned and reported as absent.
    pub fn get(&self, token: &str) -> Option<ConnectionSender> {
        let mut map = self.lock();
        match map.get(token) {
            Some(entry) if entry.sender.is_connected() => Some(entry.sender.clone()),
            Some(_) => {
                map.remove(token);
                None
            }
            None => None,
        }
    }

    /// Usernames of all currently live authenticated connections.
    pub fn online_usernames(&self) -> Vec<String> {
        let mut map = self.lock();
        map.retain(|_, e| e.sender.is_connected());
        map.values().map(|e| e.username.clone()).collect()
    }

    /// Number of live authenticated connections.
    pub fn count(&self) -> usize {
        let mut map = self.lock();
        map.retain(|_, e| e.sender.is_connected());
        map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn entry(username: &str) -> (OnlineEntry, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(8);
        let entry = OnlineEntry {
            sender: ConnectionSender::new(tx),
            user_id: 1,
            username: username.into(),
        };
        (entry, rx)
    }

    #[test]
    fn add_get_remove() {
        let registry = OnlineRegistry::new();
        let (alice, _rx) = entry("alice");
        registry.add("tok-a", alice);

        assert!(registry.get("tok-a").is_some());
        assert_eq!(registry.count(), 1);

        assert!(registry.remove("tok-a"));
        assert!(registry.get("tok-a").is_none());
        assert!(!registry.remove("tok-a"));
    }

    #[test]
    fn dead_entry_is_pruned_on_get() {
        let registry = OnlineRegistry::new();
        let (alice, rx) = entry("alice");
        registry.add("tok-a", alice);

        drop(rx);
        assert!(registry.get("tok-a").is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn online_usernames_prunes_dead() {
        let registry = OnlineRegistry::new();
        let (alice, _rx_a) = entry("alice");
        let (bob, rx_b) = entry("bob");
        registry.add("tok-a", alice);
        registry.add("tok-b", bob);

        drop(rx_b);
        let names = registry.online_usernames();
        assert_eq!(names, vec!["alice".to_string()]);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn remove_conn_matches_by_channel() {
        let registry = OnlineRegistry::new();
        let (alice, _rx_a) = entry("alice");
        let (bob, _rx_b) = entry("bob");
        let alice_sender = alice.sender.clone();

        registry.add("tok-a", alice);
        registry.add("tok-b", bob);

        assert!(registry.remove_conn(&alice_sender));
        assert!(registry.get("tok-a").is_none());
        assert!(registry.get("tok-b").is_some());
    }

    #[test]
    fn one_token_maps_to_one_connection() {
        let registry = OnlineRegistry::new();
        let (first, _rx1) = entry("alice");
        let (second, _rx2) = entry("alice");
        let second_sender = second.sender.clone();

        registry.add("tok", first);
        registry.add("tok", second);

        assert_eq!(registry.count(), 1);
        let resolved = registry.get("tok").unwrap();
        assert!(resolved.same_channel(&second_sender));
    }
}

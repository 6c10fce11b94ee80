//! In-memory user directory

use async_trait::async_trait;
use dashmap::DashMap;

use super::UserDirectory;

/// User directory held in memory, keyed by user id
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<i64, String>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a user's email address
    pub fn insert(&self, id: i64, email: impl Into<String>) {
        self.users.insert(id, email.into());
    }

    pub fn remove(&self, id: i64) {
        self.users.remove(&id);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Option<i64> {
        let email = email.trim().to_lowercase();
        let mut matches = self
            .users
            .iter()
            .filter(|entry| entry.value().to_lowercase() == email)
            .map(|entry| *entry.key());

        match (matches.next(), matches.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }

    fn directory_type(&self) -> &'static str {
        "memory"
    }
}

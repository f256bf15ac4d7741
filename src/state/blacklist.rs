use chrono::{DateTime, Utc};
use poise::serenity_prelude::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Users denied ticket creation, bot-wide
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blacklist {
    /// Schema version
    pub version: u32,

    /// Map of user ID (as string) to entry
    pub users: HashMap<String, BlacklistEntry>,
}

impl Default for Blacklist {
    fn default() -> Self {
        Self {
            version: 1,
            users: HashMap::new(),
        }
    }
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id.to_string())
    }

    /// Returns false if the user was already listed
    pub fn insert(&mut self, entry: BlacklistEntry) -> bool {
        let key = entry.user_id.to_string();
        if self.users.contains_key(&key) {
            return false;
        }
        self.users.insert(key, entry);
        true
    }

    /// Returns false if the user was not listed
    pub fn remove(&mut self, user_id: UserId) -> bool {
        self.users.remove(&user_id.to_string()).is_some()
    }

    /// Entries ordered by when they were added
    pub fn entries(&self) -> Vec<&BlacklistEntry> {
        let mut entries: Vec<&BlacklistEntry> = self.users.values().collect();
        entries.sort_by_key(|e| e.added_at);
        entries
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlacklistEntry {
    pub user_id: UserId,
    pub added_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<UserId>,
}

impl BlacklistEntry {
    pub fn new(user_id: UserId, added_by: Option<UserId>) -> Self {
        Self {
            user_id,
            added_at: Utc::now(),
            added_by,
        }
    }
}

//! User Store
//!
//! Narrow interface over per-user persistence: the credential pair and
//! remembered facts. Credential writes replace both fields in one step.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::credentials::CredentialPair;
use crate::error::Result;
use crate::model::UserFact;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_credentials(&self, user_id: &str) -> Result<Option<CredentialPair>>;

    /// Replace the stored pair atomically
    async fn save_credentials(&self, user_id: &str, pair: &CredentialPair) -> Result<()>;

    async fn has_credentials(&self, user_id: &str) -> Result<bool> {
        Ok(self.get_credentials(user_id).await?.is_some())
    }

    /// Append a fact attributed to `user_id`
    async fn append_fact(&self, user_id: &str, info_type: &str, content: &str) -> Result<UserFact>;

    async fn facts(&self, user_id: &str) -> Result<Vec<UserFact>>;
}

#[derive(Default)]
struct Records {
    credentials: HashMap<String, CredentialPair>,
    facts: Vec<UserFact>,
}

/// Process-local store
#[derive(Default)]
pub struct MemoryUserStore {
    records: RwLock<Records>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored pair, skipping validation
    pub async fn with_credentials(self, user_id: &str, pair: CredentialPair) -> Self {
        self.records
            .write()
            .await
            .credentials
            .insert(user_id.to_string(), pair);
        self
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_credentials(&self, user_id: &str) -> Result<Option<CredentialPair>> {
        Ok(self.records.read().await.credentials.get(user_id).cloned())
    }

    async fn save_credentials(&self, user_id: &str, pair: &CredentialPair) -> Result<()> {
        self.records
            .write()
            .await
            .credentials
            .insert(user_id.to_string(), pair.clone());
        tracing::info!(user_id, api_key = %pair.masked_key(), "Credentials saved");
        Ok(())
    }

    async fn append_fact(&self, user_id: &str, info_type: &str, content: &str) -> Result<UserFact> {
        let fact = UserFact {
            user_id: user_id.to_string(),
            info_type: info_type.to_string(),
            content: content.to_string(),
            recorded_at: Utc::now(),
        };
        self.records.write().await.facts.push(fact.clone());
        Ok(fact)
    }

    async fn facts(&self, user_id: &str) -> Result<Vec<UserFact>> {
        Ok(self
            .records
            .read()
            .await
            .facts
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_facts_are_per_user() {
        let store = MemoryUserStore::new();
        store.append_fact("alice", "goal", "retire at 55").await.unwrap();
        store.append_fact("bob", "risk", "low").await.unwrap();
        store.append_fact("alice", "note", "a:b:c").await.unwrap();

        let facts = store.facts("alice").await.unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[1].content, "a:b:c");
    }

    #[tokio::test]
    async fn test_credentials_replace_whole_pair() {
        let store = MemoryUserStore::new()
            .with_credentials("alice", CredentialPair::new("PKOLD", "old"))
            .await;
        assert!(store.has_credentials("alice").await.unwrap());
        assert!(!store.has_credentials("bob").await.unwrap());

        store
            .save_credentials("alice", &CredentialPair::new("PKNEW", "new"))
            .await
            .unwrap();
        let pair = store.get_credentials("alice").await.unwrap().unwrap();
        assert_eq!(pair, CredentialPair::new("PKNEW", "new"));
    }
}

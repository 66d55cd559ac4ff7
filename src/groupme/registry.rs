//! Bot Registry
//!
//! Remembers which bot posts into which group. Entries are only ever added
//! or replaced, never removed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Group id → bot id, shared between bot creation and posting
#[derive(Debug, Clone, Default)]
pub struct BotRegistry {
    bots: Arc<RwLock<HashMap<String, String>>>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the bot for a group, returning the bot it replaced
    pub async fn record(&self, group_id: &str, bot_id: &str) -> Option<String> {
        self.bots
            .write()
            .await
            .insert(group_id.to_string(), bot_id.to_string())
    }

    /// Bot registered for a group
    pub async fn get(&self, group_id: &str) -> Option<String> {
        self.bots.read().await.get(group_id).cloned()
    }

    /// Number of groups with a bot
    pub async fn len(&self) -> usize {
        self.bots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bots.read().await.is_empty()
    }

    /// `(group_id, bot_id)` pairs a post should go to
    ///
    /// With a group, that group's bot if it has one. Without, every group
    /// with a bot: `configured` groups first in their order, then the rest
    /// sorted by group id.
    pub async fn targets(
        &self,
        group_id: Option<&str>,
        configured: &[String],
    ) -> Vec<(String, String)> {
        let bots = self.bots.read().await;

        if let Some(group_id) = group_id {
            return bots
                .get(group_id)
                .map(|bot_id| vec![(group_id.to_string(), bot_id.clone())])
                .unwrap_or_default();
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(bots.len());
        for group in configured {
            if let Some(bot_id) = bots.get(group) {
                if seen.insert(group.as_str()) {
                    targets.push((group.clone(), bot_id.clone()));
                }
            }
        }

        let mut rest: Vec<_> = bots
            .iter()
            .filter(|(group, _)| !seen.contains(group.as_str()))
            .map(|(group, bot_id)| (group.clone(), bot_id.clone()))
            .collect();
        rest.sort();
        targets.extend(rest);

        targets
    }
}

use poise::serenity_prelude::{ChannelId, GuildId};
use serde::{Deserialize, Serialize};

use crate::config::PanelConfig;

/// Per-guild configuration record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuildConfig {
    pub guild_id: GuildId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel: Option<PanelConfig>,

    /// Last allocated ticket number; only ever increases
    #[serde(default)]
    pub ticket_counter: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_channel_id: Option<ChannelId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl GuildConfig {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            panel: None,
            ticket_counter: 0,
            logs_channel_id: None,
            prefix: None,
        }
    }

    /// Merge a partial update into this record
    pub fn merge(&mut self, update: GuildConfigUpdate) {
        if let Some(panel) = update.panel {
            self.panel = Some(panel);
        }
        if let Some(logs) = update.logs_channel_id {
            self.logs_channel_id = logs;
        }
        if let Some(prefix) = update.prefix {
            self.prefix = prefix;
        }
        if let Some(counter) = update.ticket_counter {
            self.ticket_counter = self.ticket_counter.max(counter);
        }
    }
}

/// Partial update for a guild configuration
///
/// `Some(None)` clears an optional field, `None` leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct GuildConfigUpdate {
    pub panel: Option<PanelConfig>,
    pub logs_channel_id: Option<Option<ChannelId>>,
    pub prefix: Option<Option<String>>,
    pub ticket_counter: Option<u64>,
}

impl GuildConfigUpdate {
    pub fn panel(panel: PanelConfig) -> Self {
        Self {
            panel: Some(panel),
            ..Default::default()
        }
    }

    pub fn logs_channel(channel_id: Option<ChannelId>) -> Self {
        Self {
            logs_channel_id: Some(channel_id),
            ..Default::default()
        }
    }

    pub fn prefix(prefix: Option<String>) -> Self {
        Self {
            prefix: Some(prefix),
            ..Default::default()
        }
    }
}

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TicketError};
use crate::state::Priority;

/// Bot-wide settings
/// Loaded from an optional settings.json, then overridden by environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BotSettings {
    /// Prefix for text commands when a guild has no override
    pub default_prefix: String,

    /// Send review requests to ticket creators after close
    pub review_enabled: bool,

    /// Whether new panels open tickets as threads by default
    pub thread_ticket_default: bool,

    /// Display labels for low, medium, high, extreme (in that order)
    pub priority_levels: [String; 4],

    /// Directory holding guild, ticket, archive and blacklist files
    pub data_path: String,

    /// Bot owner (owner-only commands)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<u64>,

    /// Webhook receiving guild join/leave reports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_webhook_url: Option<String>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            default_prefix: "&".to_string(),
            review_enabled: true,
            thread_ticket_default: true,
            priority_levels: [
                "Low".to_string(),
                "Medium".to_string(),
                "High".to_string(),
                "Extreme".to_string(),
            ],
            data_path: "data".to_string(),
            owner_id: None,
            owner_webhook_url: None,
        }
    }
}

impl BotSettings {
    /// Load from a JSON file, falling back to defaults when it does not exist
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings file at {}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(TicketError::InvalidSettings {
                    message: format!("cannot read '{}': {}", path, e),
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| TicketError::InvalidSettings {
            message: format!("cannot parse '{}': {}", path, e),
        })
    }

    /// Load settings.json (or `SETTINGS_PATH`) and apply environment overrides
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("SETTINGS_PATH").unwrap_or_else(|_| "settings.json".to_string());
        let mut settings = Self::load_from_file(&path)?;
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply overrides from a key lookup (environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup("TICKET_PREFIX") {
            self.default_prefix = prefix;
        }
        if let Some(value) = lookup("REVIEW_ENABLED") {
            self.review_enabled = parse_bool("REVIEW_ENABLED", &value)?;
        }
        if let Some(value) = lookup("THREAD_TICKETS") {
            self.thread_ticket_default = parse_bool("THREAD_TICKETS", &value)?;
        }
        if let Some(path) = lookup("DATA_PATH") {
            self.data_path = path;
        }
        if let Some(value) = lookup("OWNER_ID") {
            let id = value.trim().parse::<u64>().map_err(|_| TicketError::InvalidSettings {
                message: format!("OWNER_ID must be a numeric user id, got '{}'", value),
            })?;
            self.owner_id = Some(id);
        }
        if let Some(url) = lookup("OWNER_WEBHOOK_URL").filter(|u| !u.trim().is_empty()) {
            self.owner_webhook_url = Some(url);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_prefix.is_empty() || self.default_prefix.chars().count() > 5 {
            return Err(TicketError::InvalidSettings {
                message: "default_prefix must be 1 to 5 characters".to_string(),
            });
        }

        for (i, label) in self.priority_levels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(TicketError::InvalidSettings {
                    message: format!("priority label #{} is empty", i + 1),
                });
            }
            if self.priority_levels[..i]
                .iter()
                .any(|other| other.eq_ignore_ascii_case(label))
            {
                return Err(TicketError::InvalidSettings {
                    message: format!("priority label '{}' is used twice", label),
                });
            }
        }

        Ok(())
    }

    /// Display label for a priority
    pub fn priority_label(&self, priority: Priority) -> &str {
        &self.priority_levels[priority.rank()]
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TicketError::InvalidSettings {
            message: format!("{} must be a boolean, got '{}'", key, value),
        }),
    }
}

use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TicketError;

/// Ticket urgency, ordered from low to extreme
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Extreme,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Extreme,
    ];

    /// Position in `ALL`, also the index into configured priority labels
    pub fn rank(self) -> usize {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Extreme => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Extreme => "extreme",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Priority::Low => "🟢",
            Priority::Medium => "🟡",
            Priority::High => "🟠",
            Priority::Extreme => "🔴",
        }
    }

    pub fn color(self) -> u32 {
        match self {
            Priority::Low => 0x43B581,
            Priority::Medium => 0xFAA61A,
            Priority::High => 0xF26522,
            Priority::Extreme => 0xED4245,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "extreme" => Ok(Priority::Extreme),
            _ => Err(TicketError::InvalidPriority {
                value: s.to_string(),
            }),
        }
    }
}

/// An open support request, keyed by (guild, channel)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub ticket_number: u64,
    pub user_id: UserId,
    pub category: String,
    pub subject: String,
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<UserId>,

    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub closed: bool,

    /// Channel or thread backing the ticket
    pub channel_id: ChannelId,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Zero-padded display number, e.g. `0042`
    pub fn display_number(&self) -> String {
        format!("{:04}", self.ticket_number)
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }

    /// Apply a partial update; immutable content fields are not part of it
    ///
    /// A claim is only recorded on an unclaimed ticket.
    pub fn apply(&mut self, update: &TicketUpdate) {
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(locked) = update.locked {
            self.locked = locked;
        }
        if let (Some(claimed_by), None) = (update.claimed_by, self.claimed_by) {
            self.claimed_by = Some(claimed_by);
        }
    }
}

/// Mutable fields of a ticket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketUpdate {
    pub priority: Option<Priority>,
    pub locked: Option<bool>,
    pub claimed_by: Option<UserId>,
}

impl TicketUpdate {
    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn locked(locked: bool) -> Self {
        Self {
            locked: Some(locked),
            ..Default::default()
        }
    }

    pub fn claimed_by(user_id: UserId) -> Self {
        Self {
            claimed_by: Some(user_id),
            ..Default::default()
        }
    }
}

/// A closed ticket as stored in the guild's archive log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchivedTicket {
    pub ticket: Ticket,

    pub closed_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<UserId>,
}

impl ArchivedTicket {
    /// Seal a ticket; `closed_at` never precedes `created_at`
    pub fn seal(mut ticket: Ticket, closed_by: Option<UserId>, now: DateTime<Utc>) -> Self {
        let closed_at = now.max(ticket.created_at);
        ticket.closed = true;
        ticket.closed_at = Some(closed_at);
        Self {
            ticket,
            closed_at,
            closed_by,
        }
    }
}

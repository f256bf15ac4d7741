use poise::serenity_prelude::{ChannelId, UserId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TicketError {
    // Lifecycle errors
    #[error("Ticket panel is not configured for this guild")]
    PanelNotConfigured,

    #[error("Ticket category not found: {name}")]
    CategoryNotFound { name: String },

    #[error("User already has an open ticket")]
    DuplicateTicket {
        /// Channel of the existing ticket; `None` while that ticket is still being created
        channel_id: Option<ChannelId>,
    },

    #[error("Invalid priority '{value}' (expected low, medium, high or extreme)")]
    InvalidPriority { value: String },

    #[error("No ticket is bound to channel {channel_id}")]
    TicketNotFound { channel_id: ChannelId },

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Ticket already claimed by {claimed_by}")]
    AlreadyClaimed { claimed_by: UserId },

    #[error("User is blacklisted from creating tickets")]
    Blacklisted,

    // Panel configuration errors
    #[error("Category '{name}' already exists on this panel")]
    DuplicateCategory { name: String },

    #[error("Invalid category name: {message}")]
    InvalidCategoryName { message: String },

    #[error("Panel already has the maximum of {max} categories")]
    PanelFull { max: usize },

    #[error("Invalid prefix: {message}")]
    InvalidPrefix { message: String },

    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    // Persistence errors
    #[error("Failed to persist '{path}': {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Collaborator errors
    #[error("Failed to open ticket surface: {message}")]
    Surface { message: String },

    #[error("Discord API error: {message}")]
    Discord { message: String },
}

impl From<serenity::Error> for TicketError {
    fn from(err: serenity::Error) -> Self {
        TicketError::Discord {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TicketError>;

use poise::serenity_prelude as serenity;

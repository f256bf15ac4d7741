//! Collaborator interfaces of the ticket lifecycle.
//!
//! The lifecycle manager never talks to Discord directly: it asks a
//! [`TicketSurface`] for the channel backing a new ticket and hands closed
//! tickets to every registered [`CloseNotifier`].

use async_trait::async_trait;
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId, UserId};
use thiserror::Error;

use crate::config::Category;
use crate::state::{ArchivedTicket, Priority};

/// Everything needed to open the channel or thread for a new ticket
#[derive(Debug, Clone)]
pub struct SurfaceRequest {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub ticket_number: u64,
    pub category: Category,
    pub subject: String,
    pub description: String,
    pub priority: Priority,
    /// Open a private thread instead of a channel
    pub as_thread: bool,
    /// Channel the panel lives in (parent of thread tickets)
    pub panel_channel_id: Option<ChannelId>,
    pub panel_image: Option<String>,
}

#[derive(Error, Debug)]
#[error("{message}")]
pub struct SurfaceError {
    pub message: String,
}

impl SurfaceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serenity::Error> for SurfaceError {
    fn from(err: serenity::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Creates (and, on rollback, removes) the communication surface of a ticket
#[async_trait]
pub trait TicketSurface: Send + Sync {
    /// Open the channel or thread for a ticket and return its id
    async fn open(&self, request: &SurfaceRequest) -> Result<ChannelId, SurfaceError>;

    /// Remove a surface whose ticket could not be recorded
    async fn discard(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), SurfaceError>;
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Discord API error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("{0}")]
    Other(String),
}

/// Receives every successfully closed ticket
#[async_trait]
pub trait CloseNotifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn ticket_closed(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        archived: &ArchivedTicket,
    ) -> Result<(), NotifyError>;
}

/// A rendered transcript file
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub filename: String,
    pub body: String,
}

/// Renders the message history of a ticket's surface
#[async_trait]
pub trait TranscriptRenderer: Send + Sync {
    async fn render(&self, archived: &ArchivedTicket) -> Result<Transcript, NotifyError>;
}

//! What happens after a ticket is closed: transcripts, the logs channel and
//! review requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId, Http, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::notifier::{CloseNotifier, NotifyError, Transcript, TranscriptRenderer};
use super::panel_manager::SharedPanelManager;
use crate::components;
use crate::config::BotSettings;
use crate::messages;
use crate::state::ArchivedTicket;

/// Channel reviews are posted to
pub const REVIEW_CHANNEL_NAME: &str = "ticket-reviews";

/// Messages fetched per history request
const HISTORY_PAGE_SIZE: u8 = 100;

/// One message of a ticket's history
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptLine {
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub content: String,
}

pub fn transcript_filename(ticket_number: u64) -> String {
    format!("ticket-{:04}-transcript.txt", ticket_number)
}

/// Plain-text transcript, one `[timestamp] author: content` line per message
pub fn format_transcript(lines: &[TranscriptLine]) -> String {
    lines
        .iter()
        .map(|line| {
            let content = if line.content.trim().is_empty() {
                "[No content]"
            } else {
                line.content.as_str()
            };
            format!(
                "[{}] {}: {}",
                line.timestamp.format("%Y-%m-%d %H:%M:%S"),
                line.author,
                content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the ticket's channel history as a text file
pub struct TextTranscriptRenderer {
    http: Arc<Http>,
}

impl TextTranscriptRenderer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Whole channel history, oldest first
    async fn history(&self, channel_id: ChannelId) -> Result<Vec<TranscriptLine>, NotifyError> {
        let mut messages = Vec::new();
        let mut before = None;

        loop {
            let mut request = serenity::GetMessages::new().limit(HISTORY_PAGE_SIZE);
            if let Some(message_id) = before {
                request = request.before(message_id);
            }
            let page = channel_id.messages(self.http.as_ref(), request).await?;
            let Some(oldest) = page.last() else {
                break;
            };
            before = Some(oldest.id);
            let full_page = page.len() == HISTORY_PAGE_SIZE as usize;
            messages.extend(page);
            if !full_page {
                break;
            }
        }

        debug!("Fetched {} messages from {}", messages.len(), channel_id);
        Ok(messages
            .into_iter()
            .rev()
            .map(|message| TranscriptLine {
                timestamp: DateTime::<Utc>::from_timestamp(message.timestamp.unix_timestamp(), 0)
                    .unwrap_or_default(),
                author: message.author.name.clone(),
                content: message.content,
            })
            .collect())
    }
}

#[async_trait]
impl TranscriptRenderer for TextTranscriptRenderer {
    async fn render(&self, archived: &ArchivedTicket) -> Result<Transcript, NotifyError> {
        let lines = self.history(archived.ticket.channel_id).await?;
        Ok(Transcript {
            filename: transcript_filename(archived.ticket.ticket_number),
            body: format_transcript(&lines),
        })
    }
}

/// Embed posted to the logs channel for a closed ticket
pub fn closed_ticket_embed(archived: &ArchivedTicket) -> serenity::CreateEmbed {
    let ticket = &archived.ticket;
    let closed_by = archived
        .closed_by
        .map(|user| format!("<@{}>", user))
        .unwrap_or_else(|| "Unknown".to_string());
    let claimed_by = ticket
        .claimed_by
        .map(|user| format!("<@{}>", user))
        .unwrap_or_else(|| "Unclaimed".to_string());

    serenity::CreateEmbed::new()
        .title(format!("🔒 Ticket #{} Closed", ticket.display_number()))
        .field("Opened by", format!("<@{}>", ticket.user_id), true)
        .field("Closed by", closed_by, true)
        .field("Claimed by", claimed_by, true)
        .field("Category", &ticket.category, true)
        .field("Priority", format!("{} {}", ticket.priority.emoji(), ticket.priority), true)
        .field("Subject", &ticket.subject, false)
        .color(0xED4245)
        .timestamp(
            serenity::Timestamp::from_unix_timestamp(archived.closed_at.timestamp())
                .unwrap_or_else(|_| serenity::Timestamp::now()),
        )
}

/// Posts the closed-ticket embed and transcript to the guild's logs channel
pub struct LogChannelNotifier {
    http: Arc<Http>,
    panels: SharedPanelManager,
    renderer: Arc<dyn TranscriptRenderer>,
}

impl LogChannelNotifier {
    pub fn new(
        http: Arc<Http>,
        panels: SharedPanelManager,
        renderer: Arc<dyn TranscriptRenderer>,
    ) -> Self {
        Self {
            http,
            panels,
            renderer,
        }
    }
}

#[async_trait]
impl CloseNotifier for LogChannelNotifier {
    fn name(&self) -> &'static str {
        "logs channel"
    }

    async fn ticket_closed(
        &self,
        guild_id: GuildId,
        _user_id: UserId,
        archived: &ArchivedTicket,
    ) -> Result<(), NotifyError> {
        let Some(logs_channel) = self.panels.logs_channel(guild_id).await else {
            debug!("No logs channel configured for guild {}", guild_id);
            return Ok(());
        };

        let mut message = serenity::CreateMessage::new().embed(closed_ticket_embed(archived));
        match self.renderer.render(archived).await {
            Ok(transcript) => {
                message = message.add_file(serenity::CreateAttachment::bytes(
                    transcript.body.into_bytes(),
                    transcript.filename,
                ));
            }
            Err(e) => warn!(
                "Could not render transcript of ticket #{}: {}",
                archived.ticket.display_number(),
                e
            ),
        }

        logs_channel.send_message(self.http.as_ref(), message).await?;
        info!(
            "Logged closed ticket #{} to {}",
            archived.ticket.display_number(),
            logs_channel
        );
        Ok(())
    }
}

/// DMs the ticket creator a review request
pub struct ReviewNotifier {
    http: Arc<Http>,
    settings: Arc<BotSettings>,
}

impl ReviewNotifier {
    pub fn new(http: Arc<Http>, settings: Arc<BotSettings>) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl CloseNotifier for ReviewNotifier {
    fn name(&self) -> &'static str {
        "review request"
    }

    async fn ticket_closed(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        archived: &ArchivedTicket,
    ) -> Result<(), NotifyError> {
        if !self.settings.review_enabled {
            return Ok(());
        }

        let guild_name = guild_id
            .to_partial_guild(self.http.as_ref())
            .await
            .map(|guild| guild.name)
            .unwrap_or_else(|_| "the server".to_string());

        let embed = serenity::CreateEmbed::new()
            .description(messages::review_request_message(
                &guild_name,
                &archived.ticket.display_number(),
            ))
            .color(0xFEE75C);
        let message = serenity::CreateMessage::new()
            .embed(embed)
            .components(components::review_buttons(
                guild_id,
                archived.ticket.ticket_number,
            ));

        let dm = user_id.create_dm_channel(self.http.as_ref()).await?;
        dm.id.send_message(self.http.as_ref(), message).await?;
        debug!("Sent review request for ticket #{} to {}", archived.ticket.display_number(), user_id);
        Ok(())
    }
}

/// A submitted review
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub ticket_number: u64,
    pub category: Option<String>,
    pub staff_member: String,
    pub rating: u8,
    pub feedback: String,
    pub suggestions: Option<String>,
}

/// Parse a 1-5 star rating
pub fn parse_rating(input: &str) -> Option<u8> {
    match input.trim().parse::<u8>() {
        Ok(rating) if (1..=5).contains(&rating) => Some(rating),
        _ => None,
    }
}

pub fn review_embed(review: &Review, reviewer: &serenity::User) -> serenity::CreateEmbed {
    let stars = "⭐".repeat(review.rating as usize);
    let mut embed = serenity::CreateEmbed::new()
        .title(format!("📊 Review for Ticket #{:04}", review.ticket_number))
        .field("Rating", format!("{} ({}/5)", stars, review.rating), true)
        .field("Staff member", &review.staff_member, true)
        .field(
            "Category",
            review.category.as_deref().unwrap_or("N/A"),
            true,
        )
        .field("Feedback", &review.feedback, false)
        .author(serenity::CreateEmbedAuthor::new(&reviewer.name).icon_url(reviewer.face()))
        .color(0x5865F2)
        .timestamp(serenity::Timestamp::now());
    if let Some(suggestions) = &review.suggestions {
        embed = embed.field("Suggestions", suggestions, false);
    }
    embed
}

/// Post a review to the guild's review channel, creating the channel if needed
pub async fn post_review(
    http: &Http,
    guild_id: GuildId,
    review: &Review,
    reviewer: &serenity::User,
) -> Result<ChannelId, NotifyError> {
    let channels = guild_id.channels(http).await?;
    let existing = channels
        .values()
        .find(|channel| {
            channel.name == REVIEW_CHANNEL_NAME && channel.kind == serenity::ChannelType::Text
        })
        .map(|channel| channel.id);

    let channel_id = match existing {
        Some(id) => id,
        None => {
            let channel = guild_id
                .create_channel(
                    http,
                    serenity::CreateChannel::new(REVIEW_CHANNEL_NAME)
                        .kind(serenity::ChannelType::Text)
                        .topic("Customer feedback and support reviews"),
                )
                .await?;
            info!("Created review channel in guild {}", guild_id);
            channel.id
        }
    };

    channel_id
        .send_message(
            http,
            serenity::CreateMessage::new().embed(review_embed(review, reviewer)),
        )
        .await?;
    info!(
        "Posted {}-star review for ticket #{:04} in guild {}",
        review.rating, review.ticket_number, guild_id
    );
    Ok(channel_id)
}

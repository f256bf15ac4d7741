// src/messages.rs

use crate::error::TicketError;

/// User-facing text for a failed ticket operation
pub fn error_message(err: &TicketError) -> String {
    match err {
        TicketError::PanelNotConfigured => {
            "❌ **Tickets are not set up**\n\n\
            An administrator needs to configure the ticket panel first (`/panel setup`)."
                .to_string()
        }
        TicketError::CategoryNotFound { name } => format!(
            "❌ **Unknown category**\n\nThe category **{}** does not exist on this server's panel.",
            name
        ),
        TicketError::DuplicateTicket {
            channel_id: Some(channel_id),
        } => format!(
            "⚠️ **You already have an open ticket**\n\nPlease continue in <#{}>.",
            channel_id
        ),
        TicketError::DuplicateTicket { channel_id: None } => {
            "⚠️ **Your ticket is already being created**\n\nPlease wait a moment.".to_string()
        }
        TicketError::InvalidPriority { value } => format!(
            "❌ **Invalid priority** `{}`\n\nUse one of: low, medium, high, extreme.",
            value
        ),
        TicketError::TicketNotFound { .. } => {
            "❌ This channel is not an active ticket.".to_string()
        }
        TicketError::PermissionDenied => {
            "🔒 You don't have permission to manage this ticket.".to_string()
        }
        TicketError::AlreadyClaimed { claimed_by } => {
            format!("⚠️ This ticket has already been claimed by <@{}>.", claimed_by)
        }
        TicketError::Blacklisted => {
            "⛔ You are not allowed to create tickets.".to_string()
        }
        TicketError::DuplicateCategory { name } => {
            format!("⚠️ The category **{}** already exists on this panel.", name)
        }
        TicketError::InvalidCategoryName { message } => {
            format!("❌ Invalid category name: {}.", message)
        }
        TicketError::PanelFull { max } => {
            format!("⚠️ A panel can hold at most {} categories.", max)
        }
        TicketError::InvalidPrefix { message } => format!("❌ Invalid prefix: {}.", message),
        TicketError::InvalidSettings { .. }
        | TicketError::Persistence { .. }
        | TicketError::Surface { .. }
        | TicketError::Discord { .. } => {
            "❌ **Something went wrong**\n\n\
            The request could not be completed. Please try again later or contact an administrator."
                .to_string()
        }
    }
}

pub fn ticket_welcome_message(user_mention: &str, staff_mentions: &str) -> String {
    if staff_mentions.is_empty() {
        format!(
            "👋 Welcome {}!\n\nA staff member will be with you shortly.",
            user_mention
        )
    } else {
        format!(
            "👋 Welcome {}!\n\n{} will be with you shortly.",
            user_mention, staff_mentions
        )
    }
}

pub fn ticket_created_message(channel_id: u64, display_number: &str) -> String {
    format!(
        "✅ **Ticket #{} created**\n\nHead over to <#{}> to talk with our staff.",
        display_number, channel_id
    )
}

pub fn review_request_message(guild_name: &str, display_number: &str) -> String {
    format!(
        "⭐ **How did we do?**\n\n\
        Your ticket **#{}** in **{}** has been closed.\n\
        We'd appreciate a short review of the support you received.",
        display_number, guild_name
    )
}

pub fn help_message(prefix: &str) -> String {
    format!(
        "🎫 **Ticket commands**\n\
        `/close` `/claim` `/lock` `/unlock` `/priority` `/add` `/remove`\n\n\
        ⚙️ **Administration**\n\
        `/panel setup` `/panel category-add` `/panel category-remove` `/panel publish` `/panel logs`\n\
        `/history` `/setprefix`\n\n\
        ℹ️ **General**\n\
        `/ping` `/stats` `/help`\n\n\
        Text commands use the prefix `{}`.",
        prefix
    )
}

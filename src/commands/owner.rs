use poise::serenity_prelude as serenity;
use tracing::{info, Level};

use super::{reply_error, reply_success};
use crate::logging::format_for_discord;
use crate::{Context, Error};

/// Bar a user from opening tickets on every server; without a user, list the blacklist
#[poise::command(slash_command, prefix_command, owners_only)]
pub async fn blacklist(
    ctx: Context<'_>,
    #[description = "User to blacklist"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let Some(user) = user else {
        let entries = ctx.data().store.blacklisted_users().await;
        if entries.is_empty() {
            return reply_success(ctx, "The blacklist is empty.").await;
        }
        let lines = entries
            .iter()
            .map(|entry| format!("<@{}> since <t:{}:d>", entry.user_id, entry.added_at.timestamp()))
            .collect::<Vec<_>>()
            .join("\n");
        return reply_success(ctx, format!("⛔ **Blacklisted users**\n{}", lines)).await;
    };

    match ctx
        .data()
        .store
        .blacklist_user(user.id, Some(ctx.author().id))
        .await
    {
        Ok(true) => {
            info!("User {} blacklisted by {}", user.id, ctx.author().id);
            reply_success(ctx, format!("⛔ <@{}> can no longer open tickets.", user.id)).await
        }
        Ok(false) => reply_success(ctx, format!("<@{}> is already blacklisted.", user.id)).await,
        Err(e) => reply_error(ctx, &e).await,
    }
}

/// Allow a blacklisted user to open tickets again
#[poise::command(slash_command, prefix_command, owners_only)]
pub async fn unblacklist(
    ctx: Context<'_>,
    #[description = "User to remove from the blacklist"] user: serenity::User,
) -> Result<(), Error> {
    match ctx.data().store.unblacklist_user(user.id).await {
        Ok(true) => {
            info!("User {} removed from blacklist by {}", user.id, ctx.author().id);
            reply_success(ctx, format!("✅ <@{}> can open tickets again.", user.id)).await
        }
        Ok(false) => reply_success(ctx, format!("<@{}> is not blacklisted.", user.id)).await,
        Err(e) => reply_error(ctx, &e).await,
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum LogLevel {
    #[name = "error"]
    Error,
    #[name = "warn"]
    Warn,
    #[name = "info"]
    Info,
    #[name = "debug"]
    Debug,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
        }
    }
}

/// Show the most recent log lines
#[poise::command(slash_command, prefix_command, owners_only)]
pub async fn recentlogs(
    ctx: Context<'_>,
    #[description = "Number of lines (default 20)"] count: Option<usize>,
    #[description = "Minimum level (default info)"] level: Option<LogLevel>,
) -> Result<(), Error> {
    let count = count.unwrap_or(20).clamp(1, 100);
    let level = level.map(Level::from).unwrap_or(Level::INFO);

    let entries = ctx.data().log_buffer.get_recent(count, level);
    ctx.send(
        poise::CreateReply::default()
            .content(format_for_discord(&entries))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

use poise::serenity_prelude as serenity;
use tracing::info;

use super::{reply_error, reply_success};
use crate::messages;
use crate::{Context, Error};

/// Check if the bot is running
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    info!("Ping command called by {}", ctx.author().name);
    let latency = ctx.ping().await;
    ctx.send(
        poise::CreateReply::default()
            .content(format!("🏓 Pong! Gateway latency: {}ms", latency.as_millis()))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show help information
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let prefix = match ctx.guild_id() {
        Some(guild_id) => ctx.data().panels.prefix(guild_id).await,
        None => None,
    }
    .unwrap_or_else(|| ctx.data().settings.default_prefix.clone());

    let embed = serenity::CreateEmbed::new()
        .title("Ticket Bot")
        .description(messages::help_message(&prefix))
        .color(0x5865F2);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Ticket statistics for this server
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    let stats = ctx.data().store.guild_stats(guild_id).await;
    let uptime = ctx.data().started_at.elapsed();

    let embed = serenity::CreateEmbed::new()
        .title("📊 Ticket Statistics")
        .field("Active tickets", stats.active_tickets.to_string(), true)
        .field("Closed tickets", stats.closed_tickets.to_string(), true)
        .field("Total tickets", stats.total_tickets.to_string(), true)
        .field(
            "Uptime",
            format!(
                "{}h {}m",
                uptime.as_secs() / 3600,
                (uptime.as_secs() % 3600) / 60
            ),
            true,
        )
        .field("Servers", ctx.cache().guild_count().to_string(), true)
        .color(0x5865F2);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Change the text command prefix of this server
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn setprefix(
    ctx: Context<'_>,
    #[description = "New prefix (1-5 characters); leave empty to restore the default"]
    prefix: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;

    match ctx
        .data()
        .panels
        .set_prefix(guild_id, prefix.as_deref())
        .await
    {
        Ok(()) => {
            let shown = prefix.unwrap_or_else(|| ctx.data().settings.default_prefix.clone());
            info!("Prefix of guild {} set to '{}'", guild_id, shown);
            reply_success(ctx, format!("✅ Prefix set to `{}`", shown)).await
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

use crate::{Data, Error};

fn guild_report_embed(title: &str, name: &str, guild_id: serenity::GuildId, color: u32) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title)
        .field("Server", name, true)
        .field("ID", guild_id.to_string(), true)
        .color(color)
        .timestamp(serenity::Timestamp::now())
}

/// Post an embed to the owner webhook, if one is configured
async fn report_to_owner(ctx: &serenity::Context, data: &Data, embed: serenity::CreateEmbed) {
    let Some(url) = data.settings.owner_webhook_url.as_deref() else {
        return;
    };

    let webhook = match serenity::Webhook::from_url(&ctx.http, url).await {
        Ok(webhook) => webhook,
        Err(e) => {
            warn!("Owner webhook is not usable: {}", e);
            return;
        }
    };
    if let Err(e) = webhook
        .execute(&ctx.http, false, serenity::ExecuteWebhook::new().embed(embed))
        .await
    {
        warn!("Failed to report to owner webhook: {}", e);
    }
}

/// Handle when the bot joins a new guild or starts up
pub async fn handle_guild_create(
    ctx: &serenity::Context,
    guild: &serenity::Guild,
    is_new: Option<bool>,
    data: &Data,
) -> Result<(), Error> {
    // Startup replays every guild; only real joins are reported
    if is_new != Some(true) {
        debug!("Guild available: {} ({})", guild.name, guild.id);
        return Ok(());
    }

    info!("Joined guild: {} ({})", guild.name, guild.id);
    let embed = guild_report_embed("📥 Joined server", &guild.name, guild.id, 0x57F287)
        .field("Members", guild.member_count.to_string(), true);
    report_to_owner(ctx, data, embed).await;
    Ok(())
}

/// Handle when the bot is removed from a guild
///
/// Configuration and open tickets are dropped; the archive stays on disk.
pub async fn handle_guild_delete(
    ctx: &serenity::Context,
    incomplete: &serenity::UnavailableGuild,
    full: Option<&serenity::Guild>,
    data: &Data,
) -> Result<(), Error> {
    // An outage is not a removal
    if incomplete.unavailable {
        warn!("Guild {} became unavailable", incomplete.id);
        return Ok(());
    }

    let guild_id = incomplete.id;
    let name = full
        .map(|g| g.name.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    info!("Removed from guild: {} ({})", name, guild_id);

    if let Err(e) = data.store.delete_guild_config(guild_id).await {
        error!("Failed to delete config of guild {}: {}", guild_id, e);
    }
    if let Err(e) = data.store.delete_guild_tickets(guild_id).await {
        error!("Failed to delete tickets of guild {}: {}", guild_id, e);
    }

    let embed = guild_report_embed("📤 Left server", &name, guild_id, 0xED4245);
    report_to_owner(ctx, data, embed).await;
    Ok(())
}

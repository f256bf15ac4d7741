use poise::serenity_prelude::{self as serenity, ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{actor, reply_error, reply_success};
use crate::managers::{PriorityChange, SharedDiscordSurface};
use crate::state::{ArchivedTicket, Ticket};
use crate::{Context, Data, Error};

/// Delay between closing a ticket and deleting its channel
pub const CLOSE_DELETE_DELAY: Duration = Duration::from_secs(5);

/// Remove the surface of a closed ticket after a short delay
pub fn schedule_surface_deletion(surface: SharedDiscordSurface, channel_id: ChannelId) {
    tokio::spawn(async move {
        tokio::time::sleep(CLOSE_DELETE_DELAY).await;
        if let Err(e) = surface.delete(channel_id).await {
            warn!("Failed to delete closed ticket {}: {}", channel_id, e);
        }
    });
}

pub fn closing_embed(archived: &ArchivedTicket, closed_by: serenity::UserId) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(format!("🔒 Ticket #{} closed", archived.ticket.display_number()))
        .description(format!(
            "Closed by <@{}>. This channel will be deleted in {} seconds.",
            closed_by,
            CLOSE_DELETE_DELAY.as_secs()
        ))
        .color(0xED4245)
}

pub fn claimed_embed(ticket: &Ticket) -> serenity::CreateEmbed {
    let claimer = ticket
        .claimed_by
        .map(|user| format!("<@{}>", user))
        .unwrap_or_default();
    serenity::CreateEmbed::new()
        .description(format!("🙋 {} will handle this ticket.", claimer))
        .color(0x57F287)
}

/// Rename the surface and build the announcement of a priority change
pub async fn apply_priority_change(data: &Data, change: &PriorityChange) -> serenity::CreateEmbed {
    if let Err(e) = data.surface.rename(&change.ticket).await {
        warn!(
            "Failed to rename ticket #{}: {}",
            change.ticket.display_number(),
            e
        );
    }
    serenity::CreateEmbed::new()
        .description(format!(
            "⚡ Priority changed from {} **{}** to {} **{}**",
            change.old.emoji(),
            data.settings.priority_label(change.old),
            change.new.emoji(),
            data.settings.priority_label(change.new)
        ))
        .color(change.new.color())
}

fn ticket_location(ctx: Context<'_>) -> Result<(GuildId, ChannelId), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    Ok((guild_id, ctx.channel_id()))
}

/// Close the ticket of this channel
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn close(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, channel_id) = ticket_location(ctx)?;
    let actor = actor(ctx).await?;
    let data = ctx.data();

    ctx.defer().await?;
    match data.tickets.close_ticket(guild_id, channel_id, &actor).await {
        Ok(closed) => {
            ctx.send(poise::CreateReply::default().embed(closing_embed(&closed.archived, actor.user_id)))
                .await?;
            schedule_surface_deletion(Arc::clone(&data.surface), channel_id);
            Ok(())
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

/// Claim the ticket of this channel
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn claim(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, channel_id) = ticket_location(ctx)?;
    let actor = actor(ctx).await?;

    match ctx.data().tickets.claim_ticket(guild_id, channel_id, &actor).await {
        Ok(ticket) => {
            ctx.send(poise::CreateReply::default().embed(claimed_embed(&ticket)))
                .await?;
            Ok(())
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

async fn set_locked(ctx: Context<'_>, locked: bool) -> Result<(), Error> {
    let (guild_id, channel_id) = ticket_location(ctx)?;
    let actor = actor(ctx).await?;
    let data = ctx.data();

    let ticket = match data
        .tickets
        .set_locked(guild_id, channel_id, &actor, locked)
        .await
    {
        Ok(ticket) => ticket,
        Err(e) => return reply_error(ctx, &e).await,
    };
    if let Err(e) = data.surface.set_locked(&ticket, locked).await {
        return reply_error(ctx, &e).await;
    }

    let text = if locked {
        "🔒 Ticket locked. The creator can no longer send messages."
    } else {
        "🔓 Ticket unlocked."
    };
    ctx.send(poise::CreateReply::default().content(text)).await?;
    Ok(())
}

/// Stop the ticket creator from sending messages
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn lock(ctx: Context<'_>) -> Result<(), Error> {
    set_locked(ctx, true).await
}

/// Allow the ticket creator to send messages again
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn unlock(ctx: Context<'_>) -> Result<(), Error> {
    set_locked(ctx, false).await
}

/// Change the priority of this ticket
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn priority(
    ctx: Context<'_>,
    #[description = "low, medium, high or extreme"] level: String,
) -> Result<(), Error> {
    let (guild_id, channel_id) = ticket_location(ctx)?;
    let actor = actor(ctx).await?;
    let data = ctx.data();

    match data
        .tickets
        .set_priority(guild_id, channel_id, &actor, &level)
        .await
    {
        Ok(change) => {
            let embed = apply_priority_change(data, &change).await;
            ctx.send(poise::CreateReply::default().embed(embed)).await?;
            Ok(())
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

/// Add a member to this ticket
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Member to add"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, channel_id) = ticket_location(ctx)?;
    let actor = actor(ctx).await?;
    let data = ctx.data();

    if let Err(e) = data.tickets.authorize(guild_id, channel_id, &actor).await {
        return reply_error(ctx, &e).await;
    }
    if let Err(e) = data.surface.add_user(channel_id, user.id).await {
        return reply_error(ctx, &e).await;
    }

    ctx.send(poise::CreateReply::default().content(format!("➕ Added <@{}> to this ticket.", user.id)))
        .await?;
    Ok(())
}

/// Remove a member from this ticket
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Member to remove"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, channel_id) = ticket_location(ctx)?;
    let actor = actor(ctx).await?;
    let data = ctx.data();

    let ticket = match data.tickets.authorize(guild_id, channel_id, &actor).await {
        Ok(ticket) => ticket,
        Err(e) => return reply_error(ctx, &e).await,
    };
    if ticket.user_id == user.id {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ The ticket creator can't be removed. Close the ticket instead.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }
    if let Err(e) = data.surface.remove_user(channel_id, user.id).await {
        return reply_error(ctx, &e).await;
    }

    ctx.send(poise::CreateReply::default().content(format!("➖ Removed <@{}> from this ticket.", user.id)))
        .await?;
    Ok(())
}

/// Newest first, optionally only the tickets opened by `user`
fn select_history(
    archive: &[ArchivedTicket],
    user: Option<serenity::UserId>,
    limit: usize,
) -> Vec<&ArchivedTicket> {
    archive
        .iter()
        .rev()
        .filter(|a| user.map_or(true, |u| a.ticket.user_id == u))
        .take(limit)
        .collect()
}

/// Show recently closed tickets
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn history(
    ctx: Context<'_>,
    #[description = "Only tickets opened by this member"] user: Option<serenity::User>,
    #[description = "How many tickets to show (max 25)"] limit: Option<usize>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    let limit = limit.unwrap_or(10).clamp(1, 25);

    // A member's tickets may be older than the default window
    let window = user.as_ref().map(|_| usize::MAX);
    let archive = ctx.data().store.archived_tickets(guild_id, window).await;
    let matching = select_history(&archive, user.as_ref().map(|u| u.id), limit);

    if matching.is_empty() {
        return reply_success(ctx, "No closed tickets found.").await;
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("📁 Closed tickets")
        .color(0x5865F2);
    for archived in matching {
        let ticket = &archived.ticket;
        embed = embed.field(
            format!("#{} · {}", ticket.display_number(), ticket.category),
            format!(
                "{}\nOpened by <@{}> · closed <t:{}:R>",
                ticket.subject,
                ticket.user_id,
                archived.closed_at.timestamp()
            ),
            false,
        );
    }
    info!("History of guild {} requested by {}", guild_id, ctx.author().id);
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

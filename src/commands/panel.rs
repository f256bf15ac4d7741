use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use super::{reply_error, reply_success};
use crate::components;
use crate::config::{ButtonColor, Category, PanelConfig, PanelStyle, DEFAULT_PANEL_COLOR};
use crate::error::TicketError;
use crate::{Context, Error};

/// Parse a `#RRGGBB` or `RRGGBB` color
fn parse_color(input: &str) -> Option<u32> {
    let hex = input.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Configure the ticket panel of this server
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("setup", "category_add", "category_remove", "publish", "logs"),
    subcommand_required
)]
pub async fn panel(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create or update the panel; existing categories are kept
#[poise::command(slash_command, prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn setup(
    ctx: Context<'_>,
    #[description = "Panel title"] title: String,
    #[description = "Panel description"] description: String,
    #[description = "Dropdown menu or one button per category"] style: PanelStyle,
    #[description = "Open tickets as private threads instead of channels"] thread_tickets: Option<bool>,
    #[description = "Embed color, e.g. #5865F2"] color: Option<String>,
    #[description = "Image URL"] image: Option<String>,
    #[description = "Thumbnail URL"] thumbnail: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    let data = ctx.data();

    let color = match color.as_deref().map(parse_color) {
        Some(Some(color)) => color,
        Some(None) => {
            ctx.send(
                poise::CreateReply::default()
                    .content("❌ Invalid color, use a hex value like `#5865F2`.")
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
        None => DEFAULT_PANEL_COLOR,
    };

    let thread_tickets = thread_tickets.unwrap_or(data.settings.thread_ticket_default);
    let mut panel = PanelConfig::new(&title, &description, style, thread_tickets);
    panel.color = color;
    panel.image = image;
    panel.thumbnail = thumbnail;

    match data.panels.setup_panel(guild_id, panel).await {
        Ok(stored) => {
            reply_success(
                ctx,
                format!(
                    "✅ Panel saved with {} categories. Add categories with `/panel category-add`, then `/panel publish`.",
                    stored.categories.len()
                ),
            )
            .await
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

/// Add a ticket category
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "category-add"
)]
pub async fn category_add(
    ctx: Context<'_>,
    #[description = "Category name"] name: String,
    #[description = "Role that manages tickets of this category"] staff_role: serenity::Role,
    #[description = "Additional staff role"] extra_staff_role: Option<serenity::Role>,
    #[description = "Emoji shown on the panel"] emoji: Option<String>,
    #[description = "Button color (buttons panel)"] color: Option<ButtonColor>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;

    let name = name.trim().to_string();
    let mut category = Category::new(&name)
        .with_staff_roles(std::iter::once(staff_role.id).chain(extra_staff_role.map(|r| r.id)));
    category.emoji = emoji.filter(|e| !e.trim().is_empty());
    category.color = color.unwrap_or_default();

    match ctx.data().panels.add_category(guild_id, category).await {
        Ok(panel) => {
            reply_success(
                ctx,
                format!(
                    "✅ Added category **{}** ({} of {} slots used). Run `/panel publish` to update the panel.",
                    name,
                    panel.categories.len(),
                    crate::config::MAX_CATEGORIES
                ),
            )
            .await
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

/// Remove a ticket category
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    rename = "category-remove"
)]
pub async fn category_remove(
    ctx: Context<'_>,
    #[description = "Category name"] name: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;

    match ctx.data().panels.remove_category(guild_id, name.trim()).await {
        Ok(removed) => {
            reply_success(
                ctx,
                format!(
                    "✅ Removed category **{}**. Open tickets of this category can now only be managed by administrators.",
                    removed.name
                ),
            )
            .await
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

/// Post the panel so members can open tickets
#[poise::command(slash_command, prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn publish(
    ctx: Context<'_>,
    #[description = "Channel to post the panel in (default: this channel)"]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    let data = ctx.data();
    let http = ctx.serenity_context().http.as_ref();

    let panel = match data.panels.require_panel(guild_id).await {
        Ok(panel) => panel,
        Err(e) => return reply_error(ctx, &e).await,
    };
    if panel.categories.is_empty() {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ Add at least one category with `/panel category-add` first.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());

    // Replace the previously published panel message
    if let (Some(old_channel), Some(old_message)) = (panel.channel_id, panel.message_id) {
        if let Err(e) = old_channel.delete_message(http, old_message).await {
            warn!("Could not remove previous panel message {}: {}", old_message, e);
        }
    }

    let message = channel_id
        .send_message(
            http,
            serenity::CreateMessage::new()
                .embed(components::panel_embed(&panel))
                .components(components::panel_components(&panel)),
        )
        .await
        .map_err(TicketError::from);
    let message = match message {
        Ok(message) => message,
        Err(e) => return reply_error(ctx, &e).await,
    };

    if let Err(e) = data
        .panels
        .mark_published(guild_id, channel_id, message.id)
        .await
    {
        return reply_error(ctx, &e).await;
    }

    info!("Published panel of guild {} in {}", guild_id, channel_id);
    reply_success(ctx, format!("✅ Panel published in <#{}>", channel_id)).await
}

/// Set the channel closed tickets are logged to
#[poise::command(slash_command, prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn logs(
    ctx: Context<'_>,
    #[description = "Logs channel; leave empty to stop logging"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a guild")?;
    let channel_id = channel.map(|c| c.id);

    match ctx.data().panels.set_logs_channel(guild_id, channel_id).await {
        Ok(()) => {
            let text = match channel_id {
                Some(id) => format!("✅ Closed tickets will be logged to <#{}>", id),
                None => "✅ Ticket logging disabled".to_string(),
            };
            reply_success(ctx, text).await
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

use async_trait::async_trait;
use poise::serenity_prelude::{
    self as serenity, ChannelId, GuildId, Http, Permissions, RoleId, UserId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::notifier::{SurfaceError, SurfaceRequest, TicketSurface};
use crate::components;
use crate::config::BotSettings;
use crate::error::Result;
use crate::messages;
use crate::state::{Priority, Ticket};

/// Category ticket channels are created under
pub const TICKETS_CATEGORY_NAME: &str = "Tickets";

/// Members fetched when adding staff to a thread ticket
const STAFF_MEMBER_SCAN_LIMIT: u64 = 1000;

/// Name of a ticket's channel or thread, e.g. `🟠ticket-0042`
pub fn ticket_channel_name(priority: Priority, ticket_number: u64) -> String {
    format!("{}ticket-{:04}", priority.emoji(), ticket_number)
}

fn participant_permissions() -> Permissions {
    Permissions::VIEW_CHANNEL
        | Permissions::SEND_MESSAGES
        | Permissions::READ_MESSAGE_HISTORY
        | Permissions::ATTACH_FILES
        | Permissions::EMBED_LINKS
}

/// The @everyone role shares its id with the guild
fn everyone_role(guild_id: GuildId) -> RoleId {
    RoleId::new(guild_id.get())
}

/// Permission overwrites of a ticket channel: hidden from everyone, open to
/// the creator, the category's staff roles and the bot
pub fn ticket_overwrites(
    guild_id: GuildId,
    creator: UserId,
    staff_roles: &[RoleId],
    bot_id: UserId,
) -> Vec<serenity::PermissionOverwrite> {
    let mut overwrites = vec![
        serenity::PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL,
            kind: serenity::PermissionOverwriteType::Role(everyone_role(guild_id)),
        },
        serenity::PermissionOverwrite {
            allow: participant_permissions(),
            deny: Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Member(creator),
        },
    ];

    for role in staff_roles {
        overwrites.push(serenity::PermissionOverwrite {
            allow: participant_permissions() | Permissions::MANAGE_MESSAGES,
            deny: Permissions::empty(),
            kind: serenity::PermissionOverwriteType::Role(*role),
        });
    }

    overwrites.push(serenity::PermissionOverwrite {
        allow: participant_permissions() | Permissions::MANAGE_CHANNELS | Permissions::MANAGE_MESSAGES,
        deny: Permissions::empty(),
        kind: serenity::PermissionOverwriteType::Member(bot_id),
    });

    overwrites
}

/// Embed at the top of every ticket
pub fn ticket_embed(
    ticket_number: u64,
    category: &str,
    subject: &str,
    description: &str,
    priority: Priority,
    settings: &BotSettings,
    image: Option<&str>,
) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(format!("🎫 Ticket #{:04}", ticket_number))
        .description(format!("**{}**\n\n{}", subject, description))
        .field("Category", category, true)
        .field(
            "Priority",
            format!("{} {}", priority.emoji(), settings.priority_label(priority)),
            true,
        )
        .color(priority.color())
        .timestamp(serenity::Timestamp::now());
    if let Some(image) = image {
        embed = embed.image(image);
    }
    embed
}

/// Opens and maintains ticket channels and threads on Discord
pub struct DiscordSurface {
    http: Arc<Http>,

    settings: Arc<BotSettings>,

    /// The bot's own user, granted access to every ticket channel
    bot_id: UserId,
}

impl DiscordSurface {
    pub fn new(http: Arc<Http>, settings: Arc<BotSettings>, bot_id: UserId) -> Self {
        Self {
            http,
            settings,
            bot_id,
        }
    }

    fn http(&self) -> &Http {
        self.http.as_ref()
    }

    async fn is_thread(&self, channel_id: ChannelId) -> Result<bool> {
        let channel = channel_id.to_channel(self.http()).await?;
        Ok(channel
            .guild()
            .map(|c| c.thread_metadata.is_some())
            .unwrap_or(false))
    }

    /// Find the tickets category, creating it if needed
    async fn ensure_tickets_category(&self, guild_id: GuildId) -> Result<ChannelId> {
        let channels = guild_id.channels(self.http()).await?;
        if let Some(category) = channels.values().find(|c| {
            c.kind == serenity::ChannelType::Category && c.name == TICKETS_CATEGORY_NAME
        }) {
            return Ok(category.id);
        }

        let category = guild_id
            .create_channel(
                self.http(),
                serenity::CreateChannel::new(TICKETS_CATEGORY_NAME)
                    .kind(serenity::ChannelType::Category),
            )
            .await?;
        info!("Created tickets category in guild {}", guild_id);
        Ok(category.id)
    }

    async fn open_thread(
        &self,
        request: &SurfaceRequest,
        name: &str,
    ) -> std::result::Result<ChannelId, SurfaceError> {
        let parent = request
            .panel_channel_id
            .ok_or_else(|| SurfaceError::new("the panel has not been published yet"))?;

        let thread = parent
            .create_thread(
                self.http(),
                serenity::CreateThread::new(name)
                    .kind(serenity::ChannelType::PrivateThread)
                    .invitable(false),
            )
            .await?;
        thread.id.add_thread_member(self.http(), request.user_id).await?;

        // Staff are added best effort
        if !request.category.staff_role_ids.is_empty() {
            match request
                .guild_id
                .members(self.http(), Some(STAFF_MEMBER_SCAN_LIMIT), None::<UserId>)
                .await
            {
                Ok(members) => {
                    for member in members
                        .iter()
                        .filter(|m| m.roles.iter().any(|r| request.category.is_staff_role(*r)))
                    {
                        if let Err(e) = thread.id.add_thread_member(self.http(), member.user.id).await
                        {
                            warn!("Failed to add {} to thread {}: {}", member.user.id, thread.id, e);
                        }
                    }
                }
                Err(e) => warn!("Failed to list members of guild {}: {}", request.guild_id, e),
            }
        }

        Ok(thread.id)
    }

    async fn open_channel(
        &self,
        request: &SurfaceRequest,
        name: &str,
    ) -> std::result::Result<ChannelId, SurfaceError> {
        let category_id = self
            .ensure_tickets_category(request.guild_id)
            .await
            .map_err(|e| SurfaceError::new(e.to_string()))?;
        let overwrites = ticket_overwrites(
            request.guild_id,
            request.user_id,
            &request.category.staff_role_ids,
            self.bot_id,
        );

        let channel = request
            .guild_id
            .create_channel(
                self.http(),
                serenity::CreateChannel::new(name)
                    .kind(serenity::ChannelType::Text)
                    .category(category_id)
                    .topic(format!(
                        "Ticket #{:04} | {} | {}",
                        request.ticket_number, request.category.name, request.subject
                    ))
                    .permissions(overwrites),
            )
            .await?;
        Ok(channel.id)
    }

    async fn post_welcome(&self, request: &SurfaceRequest, channel_id: ChannelId) -> Result<()> {
        let staff_mentions = request
            .category
            .staff_role_ids
            .iter()
            .map(|role| format!("<@&{}>", role))
            .collect::<Vec<_>>()
            .join(" ");

        let message = serenity::CreateMessage::new()
            .content(messages::ticket_welcome_message(
                &format!("<@{}>", request.user_id),
                &staff_mentions,
            ))
            .embed(ticket_embed(
                request.ticket_number,
                &request.category.name,
                &request.subject,
                &request.description,
                request.priority,
                &self.settings,
                request.panel_image.as_deref(),
            ))
            .components(components::control_buttons());

        channel_id.send_message(self.http(), message).await?;
        Ok(())
    }

    /// Stop (or allow again) the creator writing in the ticket
    pub async fn set_locked(&self, ticket: &Ticket, locked: bool) -> Result<()> {
        if self.is_thread(ticket.channel_id).await? {
            ticket
                .channel_id
                .edit_thread(self.http(), serenity::EditThread::new().locked(locked))
                .await?;
        } else {
            let (allow, deny) = if locked {
                (
                    Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY,
                    Permissions::SEND_MESSAGES,
                )
            } else {
                (participant_permissions(), Permissions::empty())
            };
            ticket
                .channel_id
                .create_permission(
                    self.http(),
                    serenity::PermissionOverwrite {
                        allow,
                        deny,
                        kind: serenity::PermissionOverwriteType::Member(ticket.user_id),
                    },
                )
                .await?;
        }
        debug!("Surface {} locked={}", ticket.channel_id, locked);
        Ok(())
    }

    pub async fn add_user(&self, channel_id: ChannelId, user_id: UserId) -> Result<()> {
        if self.is_thread(channel_id).await? {
            channel_id.add_thread_member(self.http(), user_id).await?;
        } else {
            channel_id
                .create_permission(
                    self.http(),
                    serenity::PermissionOverwrite {
                        allow: participant_permissions(),
                        deny: Permissions::empty(),
                        kind: serenity::PermissionOverwriteType::Member(user_id),
                    },
                )
                .await?;
        }
        info!("Added {} to ticket {}", user_id, channel_id);
        Ok(())
    }

    pub async fn remove_user(&self, channel_id: ChannelId, user_id: UserId) -> Result<()> {
        if self.is_thread(channel_id).await? {
            channel_id.remove_thread_member(self.http(), user_id).await?;
        } else {
            channel_id
                .delete_permission(
                    self.http(),
                    serenity::PermissionOverwriteType::Member(user_id),
                )
                .await?;
        }
        info!("Removed {} from ticket {}", user_id, channel_id);
        Ok(())
    }

    /// Rename the surface after a priority change
    pub async fn rename(&self, ticket: &Ticket) -> Result<()> {
        let name = ticket_channel_name(ticket.priority, ticket.ticket_number);
        if self.is_thread(ticket.channel_id).await? {
            ticket
                .channel_id
                .edit_thread(self.http(), serenity::EditThread::new().name(name))
                .await?;
        } else {
            ticket
                .channel_id
                .edit(self.http(), serenity::EditChannel::new().name(name))
                .await?;
        }
        Ok(())
    }

    pub async fn delete(&self, channel_id: ChannelId) -> Result<()> {
        channel_id.delete(self.http()).await?;
        info!("Deleted ticket surface {}", channel_id);
        Ok(())
    }
}

#[async_trait]
impl TicketSurface for DiscordSurface {
    async fn open(&self, request: &SurfaceRequest) -> std::result::Result<ChannelId, SurfaceError> {
        let name = ticket_channel_name(request.priority, request.ticket_number);
        let channel_id = if request.as_thread {
            self.open_thread(request, &name).await?
        } else {
            self.open_channel(request, &name).await?
        };

        if let Err(e) = self.post_welcome(request, channel_id).await {
            warn!("Failed to post welcome message in {}: {}", channel_id, e);
            if let Err(e) = self.delete(channel_id).await {
                warn!("Failed to remove half-opened ticket {}: {}", channel_id, e);
            }
            return Err(SurfaceError::new(e.to_string()));
        }

        info!(
            "Opened {} {} for ticket #{:04} in guild {}",
            if request.as_thread { "thread" } else { "channel" },
            channel_id,
            request.ticket_number,
            request.guild_id
        );
        Ok(channel_id)
    }

    async fn discard(&self, _guild_id: GuildId, channel_id: ChannelId) -> std::result::Result<(), SurfaceError> {
        self.delete(channel_id)
            .await
            .map_err(|e| SurfaceError::new(e.to_string()))
    }
}

/// Shared surface type
pub type SharedDiscordSurface = Arc<DiscordSurface>;

pub fn create_shared_discord_surface(
    http: Arc<Http>,
    settings: Arc<BotSettings>,
    bot_id: UserId,
) -> SharedDiscordSurface {
    Arc::new(DiscordSurface::new(http, settings, bot_id))
}

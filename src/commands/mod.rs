pub mod general;
pub mod owner;
pub mod panel;
pub mod ticket;

pub use general::{help, ping, setprefix, stats};
pub use owner::{blacklist, recentlogs, unblacklist};
pub use panel::panel;
pub use ticket::{add, claim, close, history, lock, priority, remove, unlock};

use poise::serenity_prelude as serenity;
use tracing::{error, warn};

use crate::error::TicketError;
use crate::managers::Actor;
use crate::messages;
use crate::{Context, Error};

/// The invoking member as a ticket actor
pub async fn actor(ctx: Context<'_>) -> Result<Actor, Error> {
    let member = ctx
        .author_member()
        .await
        .ok_or("This command can only be used in a server")?;
    let permissions = member
        .permissions
        .or_else(|| ctx.guild().map(|guild| guild.member_permissions(&member)));
    Ok(Actor::from_member(&member, permissions))
}

/// Reply with the user-facing text of a ticket error
///
/// Errors the user can't act on are logged as well.
pub async fn reply_error(ctx: Context<'_>, err: &TicketError) -> Result<(), Error> {
    log_ticket_error(ctx.command().qualified_name.as_str(), err);
    ctx.send(
        poise::CreateReply::default()
            .embed(
                serenity::CreateEmbed::new()
                    .description(messages::error_message(err))
                    .color(0xED4245),
            )
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

pub async fn reply_success(ctx: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .embed(
                serenity::CreateEmbed::new()
                    .description(text)
                    .color(0x57F287),
            )
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

pub fn log_ticket_error(operation: &str, err: &TicketError) {
    match err {
        TicketError::Persistence { .. }
        | TicketError::Surface { .. }
        | TicketError::Discord { .. }
        | TicketError::InvalidSettings { .. } => {
            error!("{} failed: {}", operation, err);
        }
        _ => warn!("{} rejected: {}", operation, err),
    }
}

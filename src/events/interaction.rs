use poise::serenity_prelude::{self as serenity, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::commands::log_ticket_error;
use crate::commands::ticket::{apply_priority_change, claimed_embed, closing_embed, schedule_surface_deletion};
use crate::components::{self, ComponentAction};
use crate::error::TicketError;
use crate::managers::close_notifier::{parse_rating, post_review, Review};
use crate::managers::panel_manager::validate_category;
use crate::managers::{Actor, CreateTicketRequest};
use crate::messages;
use crate::{Data, Error};

fn message(text: impl Into<String>, ephemeral: bool) -> serenity::CreateInteractionResponse {
    serenity::CreateInteractionResponse::Message(
        serenity::CreateInteractionResponseMessage::new()
            .content(text)
            .ephemeral(ephemeral),
    )
}

fn error_response(operation: &str, err: &TicketError) -> serenity::CreateInteractionResponse {
    log_ticket_error(operation, err);
    message(messages::error_message(err), true)
}

fn actor_of(member: Option<&serenity::Member>, user: &serenity::User) -> Actor {
    match member {
        Some(member) => Actor::from_member(member, member.permissions),
        None => Actor::new(user.id, Vec::new(), false),
    }
}

/// Route a component or modal interaction
pub async fn handle_interaction(
    ctx: &serenity::Context,
    interaction: &serenity::Interaction,
    data: &Data,
) -> Result<(), Error> {
    match interaction {
        serenity::Interaction::Component(component) => {
            handle_component(ctx, component, data).await
        }
        serenity::Interaction::Modal(modal) => handle_modal(ctx, modal, data).await,
        _ => Ok(()),
    }
}

async fn handle_component(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let Some(action) = ComponentAction::parse(&interaction.data.custom_id) else {
        warn!("Unknown component interaction: {}", interaction.data.custom_id);
        return Ok(());
    };
    debug!("Component {:?} from {}", action, interaction.user.id);

    let http = ctx.http.as_ref();
    let response = match action {
        ComponentAction::PanelSelect => {
            let selected = match &interaction.data.kind {
                serenity::ComponentInteractionDataKind::StringSelect { values } => {
                    values.first().cloned()
                }
                _ => None,
            };
            match selected {
                Some(name) => open_ticket_form(interaction.guild_id, &name, data).await,
                None => return Ok(()),
            }
        }
        ComponentAction::PanelButton(name) => {
            open_ticket_form(interaction.guild_id, &name, data).await
        }
        ComponentAction::Close => serenity::CreateInteractionResponse::Message(
            serenity::CreateInteractionResponseMessage::new()
                .content("Are you sure you want to close this ticket?")
                .components(components::close_confirmation_buttons())
                .ephemeral(true),
        ),
        ComponentAction::CloseCancel => serenity::CreateInteractionResponse::UpdateMessage(
            serenity::CreateInteractionResponseMessage::new()
                .content("Close cancelled.")
                .components(vec![]),
        ),
        ComponentAction::CloseConfirm => {
            let Some(guild_id) = interaction.guild_id else {
                return Ok(());
            };
            return confirm_close(ctx, interaction, data, guild_id).await;
        }
        ComponentAction::Claim => {
            let Some(guild_id) = interaction.guild_id else {
                return Ok(());
            };
            let actor = actor_of(interaction.member.as_ref(), &interaction.user);
            match data
                .tickets
                .claim_ticket(guild_id, interaction.channel_id, &actor)
                .await
            {
                Ok(ticket) => serenity::CreateInteractionResponse::Message(
                    serenity::CreateInteractionResponseMessage::new().embed(claimed_embed(&ticket)),
                ),
                Err(e) => error_response("claim ticket", &e),
            }
        }
        ComponentAction::Priority => {
            let Some(guild_id) = interaction.guild_id else {
                return Ok(());
            };
            let actor = actor_of(interaction.member.as_ref(), &interaction.user);
            match data
                .tickets
                .authorize(guild_id, interaction.channel_id, &actor)
                .await
            {
                Ok(ticket) => serenity::CreateInteractionResponse::Message(
                    serenity::CreateInteractionResponseMessage::new()
                        .content("Choose the new priority:")
                        .components(components::priority_select(
                            &data.settings.priority_levels,
                            ticket.priority,
                        ))
                        .ephemeral(true),
                ),
                Err(e) => error_response("change priority", &e),
            }
        }
        ComponentAction::PrioritySelect => {
            let Some(guild_id) = interaction.guild_id else {
                return Ok(());
            };
            let selected = match &interaction.data.kind {
                serenity::ComponentInteractionDataKind::StringSelect { values } => {
                    values.first().cloned().unwrap_or_default()
                }
                _ => String::new(),
            };
            let actor = actor_of(interaction.member.as_ref(), &interaction.user);
            match data
                .tickets
                .set_priority(guild_id, interaction.channel_id, &actor, &selected)
                .await
            {
                Ok(change) => {
                    let embed = apply_priority_change(data, &change).await;
                    if let Err(e) = interaction
                        .channel_id
                        .send_message(http, serenity::CreateMessage::new().embed(embed))
                        .await
                    {
                        warn!("Failed to announce priority change: {}", e);
                    }
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .content("✅ Priority updated.")
                            .components(vec![]),
                    )
                }
                Err(e) => error_response("change priority", &e),
            }
        }
        ComponentAction::ReviewOpen {
            guild_id,
            ticket_number,
        } => serenity::CreateInteractionResponse::Modal(components::review_modal(
            guild_id,
            ticket_number,
        )),
        ComponentAction::ReviewSkip { .. } => serenity::CreateInteractionResponse::UpdateMessage(
            serenity::CreateInteractionResponseMessage::new()
                .content("Review skipped. Thanks for contacting support!")
                .embeds(vec![])
                .components(vec![]),
        ),
        ComponentAction::TicketModal(_) | ComponentAction::ReviewModal { .. } => {
            warn!("Modal id used on a component: {}", interaction.data.custom_id);
            return Ok(());
        }
    };

    interaction.create_response(http, response).await?;
    Ok(())
}

/// Close the ticket after the confirmation button was pressed
async fn confirm_close(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    data: &Data,
    guild_id: GuildId,
) -> Result<(), Error> {
    let http = ctx.http.as_ref();

    // Archiving writes to disk; answer within the interaction deadline first
    interaction
        .create_response(http, serenity::CreateInteractionResponse::Acknowledge)
        .await?;

    let actor = actor_of(interaction.member.as_ref(), &interaction.user);
    match data
        .tickets
        .close_ticket(guild_id, interaction.channel_id, &actor)
        .await
    {
        Ok(closed) => {
            schedule_surface_deletion(Arc::clone(&data.surface), interaction.channel_id);
            interaction
                .edit_response(
                    http,
                    serenity::EditInteractionResponse::new()
                        .content("")
                        .embed(closing_embed(&closed.archived, actor.user_id))
                        .components(vec![]),
                )
                .await?;
        }
        Err(e) => {
            log_ticket_error("close ticket", &e);
            interaction
                .create_followup(
                    http,
                    serenity::CreateInteractionResponseFollowup::new()
                        .content(messages::error_message(&e))
                        .ephemeral(true),
                )
                .await?;
        }
    }
    Ok(())
}

/// Show the ticket form for a category, or why it can't be opened
async fn open_ticket_form(
    guild_id: Option<GuildId>,
    category_name: &str,
    data: &Data,
) -> serenity::CreateInteractionResponse {
    let Some(guild_id) = guild_id else {
        return message("Tickets can only be opened in a server.", true);
    };
    let panel = match data.panels.require_panel(guild_id).await {
        Ok(panel) => panel,
        Err(e) => return error_response("open ticket form", &e),
    };
    match validate_category(&panel, category_name) {
        Ok(category) => {
            serenity::CreateInteractionResponse::Modal(components::ticket_modal(&category.name))
        }
        Err(e) => error_response("open ticket form", &e),
    }
}

async fn handle_modal(
    ctx: &serenity::Context,
    interaction: &serenity::ModalInteraction,
    data: &Data,
) -> Result<(), Error> {
    let Some(action) = ComponentAction::parse(&interaction.data.custom_id) else {
        warn!("Unknown modal submission: {}", interaction.data.custom_id);
        return Ok(());
    };

    match action {
        ComponentAction::TicketModal(category) => {
            submit_ticket(ctx, interaction, data, category).await
        }
        ComponentAction::ReviewModal {
            guild_id,
            ticket_number,
        } => submit_review(ctx, interaction, data, guild_id, ticket_number).await,
        other => {
            warn!("Unexpected modal action {:?}", other);
            Ok(())
        }
    }
}

async fn submit_ticket(
    ctx: &serenity::Context,
    interaction: &serenity::ModalInteraction,
    data: &Data,
    category: String,
) -> Result<(), Error> {
    let http = ctx.http.as_ref();
    let Some(guild_id) = interaction.guild_id else {
        return Ok(());
    };

    // Opening a channel takes longer than the interaction deadline
    interaction
        .create_response(
            http,
            serenity::CreateInteractionResponse::Defer(
                serenity::CreateInteractionResponseMessage::new().ephemeral(true),
            ),
        )
        .await?;

    // The category is checked against the current panel during creation
    let fields = &interaction.data.components;
    let request = CreateTicketRequest {
        user_id: interaction.user.id,
        category,
        subject: components::modal_value(fields, components::SUBJECT_FIELD)
            .unwrap_or_default()
            .trim()
            .to_string(),
        description: components::modal_value(fields, components::DESCRIPTION_FIELD)
            .unwrap_or_default()
            .trim()
            .to_string(),
        priority: components::modal_value(fields, components::PRIORITY_FIELD)
            .unwrap_or("medium")
            .to_string(),
    };

    let text = match data
        .tickets
        .create_ticket(guild_id, request, data.surface.as_ref())
        .await
    {
        Ok(ticket) => messages::ticket_created_message(
            ticket.channel_id.get(),
            &ticket.display_number(),
        ),
        Err(e) => {
            log_ticket_error("create ticket", &e);
            messages::error_message(&e)
        }
    };

    interaction
        .create_followup(
            http,
            serenity::CreateInteractionResponseFollowup::new()
                .content(text)
                .ephemeral(true),
        )
        .await?;
    Ok(())
}

async fn submit_review(
    ctx: &serenity::Context,
    interaction: &serenity::ModalInteraction,
    data: &Data,
    guild_id: GuildId,
    ticket_number: u64,
) -> Result<(), Error> {
    let http = ctx.http.as_ref();
    let fields = &interaction.data.components;

    let Some(rating) = components::modal_value(fields, components::RATING_FIELD).and_then(parse_rating)
    else {
        interaction
            .create_response(
                http,
                message("❌ Invalid rating! Please enter a number between 1 and 5.", true),
            )
            .await?;
        return Ok(());
    };

    let category = data
        .store
        .archived_ticket(guild_id, ticket_number)
        .await
        .map(|a| a.ticket.category);
    let text_field = |field: &str| {
        components::modal_value(fields, field)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let review = Review {
        ticket_number,
        category,
        staff_member: text_field(components::STAFF_FIELD).unwrap_or_else(|| "N/A".to_string()),
        rating,
        feedback: text_field(components::FEEDBACK_FIELD).unwrap_or_default(),
        suggestions: text_field(components::SUGGESTIONS_FIELD),
    };

    interaction
        .create_response(
            http,
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content("✅ Thank you for your feedback!")
                    .embeds(vec![])
                    .components(vec![]),
            ),
        )
        .await?;

    match post_review(http, guild_id, &review, &interaction.user).await {
        Ok(channel_id) => info!(
            "Review for ticket #{:04} posted to {}",
            ticket_number, channel_id
        ),
        Err(e) => warn!(
            "Failed to post review for ticket #{:04} in guild {}: {}",
            ticket_number, guild_id, e
        ),
    }
    Ok(())
}

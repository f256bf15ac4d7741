//! Message components and modals, and the custom ids that route them back.

use poise::serenity_prelude::{self as serenity, GuildId};

use crate::config::{ButtonColor, PanelConfig, PanelStyle};
use crate::state::Priority;

pub const SUBJECT_FIELD: &str = "subject";
pub const DESCRIPTION_FIELD: &str = "description";
pub const PRIORITY_FIELD: &str = "priority";
pub const STAFF_FIELD: &str = "staff";
pub const RATING_FIELD: &str = "rating";
pub const FEEDBACK_FIELD: &str = "feedback";
pub const SUGGESTIONS_FIELD: &str = "suggestions";

/// Everything a component or modal interaction can ask for
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentAction {
    /// Category picked from the dropdown panel
    PanelSelect,
    /// Category button of the buttons panel
    PanelButton(String),
    /// Ticket form submitted for the named category
    TicketModal(String),
    Close,
    CloseConfirm,
    CloseCancel,
    Claim,
    Priority,
    PrioritySelect,
    ReviewOpen { guild_id: GuildId, ticket_number: u64 },
    ReviewSkip { guild_id: GuildId, ticket_number: u64 },
    ReviewModal { guild_id: GuildId, ticket_number: u64 },
}

impl ComponentAction {
    pub fn custom_id(&self) -> String {
        match self {
            ComponentAction::PanelSelect => "ticket_panel_select".to_string(),
            ComponentAction::PanelButton(category) => format!("ticket_panel_button_{}", category),
            ComponentAction::TicketModal(category) => format!("ticket_modal_{}", category),
            ComponentAction::Close => "ticket_close".to_string(),
            ComponentAction::CloseConfirm => "ticket_close_confirm".to_string(),
            ComponentAction::CloseCancel => "ticket_close_cancel".to_string(),
            ComponentAction::Claim => "ticket_claim".to_string(),
            ComponentAction::Priority => "ticket_priority".to_string(),
            ComponentAction::PrioritySelect => "ticket_priority_select".to_string(),
            ComponentAction::ReviewOpen {
                guild_id,
                ticket_number,
            } => format!("review_open_{}_{}", guild_id, ticket_number),
            ComponentAction::ReviewSkip {
                guild_id,
                ticket_number,
            } => format!("review_skip_{}_{}", guild_id, ticket_number),
            ComponentAction::ReviewModal {
                guild_id,
                ticket_number,
            } => format!("review_modal_{}_{}", guild_id, ticket_number),
        }
    }

    pub fn parse(custom_id: &str) -> Option<Self> {
        let action = match custom_id {
            "ticket_panel_select" => ComponentAction::PanelSelect,
            "ticket_close" => ComponentAction::Close,
            "ticket_close_confirm" => ComponentAction::CloseConfirm,
            "ticket_close_cancel" => ComponentAction::CloseCancel,
            "ticket_claim" => ComponentAction::Claim,
            "ticket_priority" => ComponentAction::Priority,
            "ticket_priority_select" => ComponentAction::PrioritySelect,
            _ => {
                if let Some(category) = custom_id.strip_prefix("ticket_panel_button_") {
                    ComponentAction::PanelButton(category_key(category)?)
                } else if let Some(category) = custom_id.strip_prefix("ticket_modal_") {
                    ComponentAction::TicketModal(category_key(category)?)
                } else if let Some(rest) = custom_id.strip_prefix("review_open_") {
                    let (guild_id, ticket_number) = parse_review_key(rest)?;
                    ComponentAction::ReviewOpen {
                        guild_id,
                        ticket_number,
                    }
                } else if let Some(rest) = custom_id.strip_prefix("review_skip_") {
                    let (guild_id, ticket_number) = parse_review_key(rest)?;
                    ComponentAction::ReviewSkip {
                        guild_id,
                        ticket_number,
                    }
                } else if let Some(rest) = custom_id.strip_prefix("review_modal_") {
                    let (guild_id, ticket_number) = parse_review_key(rest)?;
                    ComponentAction::ReviewModal {
                        guild_id,
                        ticket_number,
                    }
                } else {
                    return None;
                }
            }
        };
        Some(action)
    }
}

fn category_key(rest: &str) -> Option<String> {
    (!rest.is_empty()).then(|| rest.to_string())
}

fn parse_review_key(rest: &str) -> Option<(GuildId, u64)> {
    let (guild, number) = rest.split_once('_')?;
    let guild: u64 = guild.parse().ok()?;
    if guild == 0 {
        return None;
    }
    Some((GuildId::new(guild), number.parse().ok()?))
}

fn button_style(color: ButtonColor) -> serenity::ButtonStyle {
    match color {
        ButtonColor::Blurple => serenity::ButtonStyle::Primary,
        ButtonColor::Green => serenity::ButtonStyle::Success,
        ButtonColor::Red => serenity::ButtonStyle::Danger,
        ButtonColor::Grey => serenity::ButtonStyle::Secondary,
    }
}

/// Components of the published panel: one dropdown, or rows of five buttons
pub fn panel_components(panel: &PanelConfig) -> Vec<serenity::CreateActionRow> {
    match panel.style {
        PanelStyle::Dropdown => {
            let options = panel
                .categories
                .iter()
                .map(|category| {
                    let mut option =
                        serenity::CreateSelectMenuOption::new(&category.name, &category.name)
                            .description(format!("Open a {} ticket", category.name));
                    if let Some(emoji) = &category.emoji {
                        option = option.emoji(serenity::ReactionType::Unicode(emoji.clone()));
                    }
                    option
                })
                .collect();
            let menu = serenity::CreateSelectMenu::new(
                ComponentAction::PanelSelect.custom_id(),
                serenity::CreateSelectMenuKind::String { options },
            )
            .placeholder("Select a category");
            vec![serenity::CreateActionRow::SelectMenu(menu)]
        }
        PanelStyle::Buttons => panel
            .categories
            .chunks(5)
            .map(|categories| {
                let buttons = categories
                    .iter()
                    .map(|category| {
                        let mut button =
                            serenity::CreateButton::new(ComponentAction::PanelButton(category.name.clone()).custom_id())
                                .label(&category.name)
                                .style(button_style(category.color));
                        if let Some(emoji) = &category.emoji {
                            button = button.emoji(serenity::ReactionType::Unicode(emoji.clone()));
                        }
                        button
                    })
                    .collect();
                serenity::CreateActionRow::Buttons(buttons)
            })
            .collect(),
    }
}

/// The embed of the published panel
pub fn panel_embed(panel: &PanelConfig) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(&panel.title)
        .description(&panel.description)
        .color(panel.color);
    if let Some(image) = &panel.image {
        embed = embed.image(image);
    }
    if let Some(thumbnail) = &panel.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    embed
}

pub fn ticket_modal(category_name: &str) -> serenity::CreateModal {
    serenity::CreateModal::new(
        ComponentAction::TicketModal(category_name.to_string()).custom_id(),
        format!("{} Ticket", category_name),
    )
    .components(vec![
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(serenity::InputTextStyle::Short, "Subject", SUBJECT_FIELD)
                .placeholder("Brief summary of your issue")
                .max_length(100)
                .required(true),
        ),
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Paragraph,
                "Description",
                DESCRIPTION_FIELD,
            )
            .placeholder("Describe your issue in detail")
            .max_length(1000)
            .required(true),
        ),
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(serenity::InputTextStyle::Short, "Priority", PRIORITY_FIELD)
                .placeholder("low, medium, high or extreme")
                .value("medium")
                .max_length(10)
                .required(true),
        ),
    ])
}

/// Close / Claim / Priority buttons under the ticket's first message
pub fn control_buttons() -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(ComponentAction::Close.custom_id())
            .label("Close")
            .emoji('🔒')
            .style(serenity::ButtonStyle::Danger),
        serenity::CreateButton::new(ComponentAction::Claim.custom_id())
            .label("Claim")
            .emoji('🙋')
            .style(serenity::ButtonStyle::Success),
        serenity::CreateButton::new(ComponentAction::Priority.custom_id())
            .label("Priority")
            .emoji('⚡')
            .style(serenity::ButtonStyle::Secondary),
    ])]
}

pub fn close_confirmation_buttons() -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(ComponentAction::CloseConfirm.custom_id())
            .label("Close ticket")
            .style(serenity::ButtonStyle::Danger),
        serenity::CreateButton::new(ComponentAction::CloseCancel.custom_id())
            .label("Cancel")
            .style(serenity::ButtonStyle::Secondary),
    ])]
}

/// Priority picker; option labels come from the configured priority labels
pub fn priority_select(labels: &[String; 4], current: Priority) -> Vec<serenity::CreateActionRow> {
    let options = Priority::ALL
        .iter()
        .map(|priority| {
            serenity::CreateSelectMenuOption::new(&labels[priority.rank()], priority.as_str())
                .emoji(serenity::ReactionType::Unicode(priority.emoji().to_string()))
                .default_selection(*priority == current)
        })
        .collect();
    vec![serenity::CreateActionRow::SelectMenu(
        serenity::CreateSelectMenu::new(
            ComponentAction::PrioritySelect.custom_id(),
            serenity::CreateSelectMenuKind::String { options },
        )
        .placeholder("Select a priority"),
    )]
}

pub fn review_buttons(guild_id: GuildId, ticket_number: u64) -> Vec<serenity::CreateActionRow> {
    vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(
            ComponentAction::ReviewOpen {
                guild_id,
                ticket_number,
            }
            .custom_id(),
        )
        .label("Leave a Review")
        .emoji('⭐')
        .style(serenity::ButtonStyle::Primary),
        serenity::CreateButton::new(
            ComponentAction::ReviewSkip {
                guild_id,
                ticket_number,
            }
            .custom_id(),
        )
        .label("Skip")
        .style(serenity::ButtonStyle::Secondary),
    ])]
}

pub fn review_modal(guild_id: GuildId, ticket_number: u64) -> serenity::CreateModal {
    serenity::CreateModal::new(
        ComponentAction::ReviewModal {
            guild_id,
            ticket_number,
        }
        .custom_id(),
        "Review your support experience",
    )
    .components(vec![
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Short,
                "Staff member who helped you",
                STAFF_FIELD,
            )
            .max_length(100)
            .required(true),
        ),
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(serenity::InputTextStyle::Short, "Rating (1-5)", RATING_FIELD)
                .placeholder("5")
                .max_length(1)
                .required(true),
        ),
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Paragraph,
                "Feedback",
                FEEDBACK_FIELD,
            )
            .max_length(1000)
            .required(true),
        ),
        serenity::CreateActionRow::InputText(
            serenity::CreateInputText::new(
                serenity::InputTextStyle::Paragraph,
                "Suggestions (optional)",
                SUGGESTIONS_FIELD,
            )
            .max_length(500)
            .required(false),
        ),
    ])
}

/// Value of a text field of a submitted modal
pub fn modal_value<'a>(components: &'a [serenity::ActionRow], field: &str) -> Option<&'a str> {
    components
        .iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            serenity::ActionRowComponent::InputText(input) if input.custom_id == field => {
                input.value.as_deref()
            }
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_ids_route_back() {
        let actions = [
            ComponentAction::PanelSelect,
            ComponentAction::PanelButton("Support".to_string()),
            ComponentAction::TicketModal("Billing & refunds".to_string()),
            ComponentAction::TicketModal("bug_report_v2".to_string()),
            ComponentAction::CloseConfirm,
            ComponentAction::PrioritySelect,
            ComponentAction::ReviewModal {
                guild_id: GuildId::new(123),
                ticket_number: 42,
            },
        ];
        for action in actions {
            assert_eq!(ComponentAction::parse(&action.custom_id()), Some(action));
        }
    }

    #[test]
    fn test_unknown_custom_ids() {
        assert_eq!(ComponentAction::parse("config_global"), None);
        assert_eq!(ComponentAction::parse("ticket_panel_button_"), None);
        assert_eq!(ComponentAction::parse("ticket_modal_"), None);
        assert_eq!(ComponentAction::parse("review_open_0_1"), None);
        assert_eq!(ComponentAction::parse("review_skip_5"), None);
    }

    #[test]
    fn test_button_panel_rows() {
        let mut panel = PanelConfig::new("Help", "", PanelStyle::Buttons, false);
        panel.categories = (0..12)
            .map(|i| crate::config::Category::new(&format!("Category {}", i)))
            .collect();
        assert_eq!(panel_components(&panel).len(), 3);

        panel.style = PanelStyle::Dropdown;
        assert_eq!(panel_components(&panel).len(), 1);
    }

    #[test]
    fn test_longest_category_ids_fit() {
        let name = "é".repeat(crate::config::MAX_CATEGORY_NAME_LEN);
        let button = ComponentAction::PanelButton(name.clone()).custom_id();
        let modal = ComponentAction::TicketModal(name.clone()).custom_id();
        assert!(button.chars().count() <= 100);
        assert!(modal.chars().count() <= 100);
        assert_eq!(ComponentAction::parse(&button), Some(ComponentAction::PanelButton(name)));
    }
}

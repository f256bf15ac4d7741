use poise::serenity_prelude::{ChannelId, MessageId, RoleId};
use serde::{Deserialize, Serialize};

/// Maximum categories a panel can carry (select menu options / 5x5 button grid)
pub const MAX_CATEGORIES: usize = 25;

/// Longest category name; keeps component ids within Discord's 100 character limit
pub const MAX_CATEGORY_NAME_LEN: usize = 80;

/// Default embed color of a panel
pub const DEFAULT_PANEL_COLOR: u32 = 0x2F3136;

/// A guild's ticket panel: the published message users open tickets from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelConfig {
    pub title: String,
    pub description: String,

    #[serde(default = "default_color")]
    pub color: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    pub style: PanelStyle,

    #[serde(default)]
    pub categories: Vec<Category>,

    /// Channel the panel message was published in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,

    /// Open tickets as private threads instead of channels
    pub thread_tickets: bool,
}

impl PanelConfig {
    pub fn new(title: &str, description: &str, style: PanelStyle, thread_tickets: bool) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            color: DEFAULT_PANEL_COLOR,
            image: None,
            thumbnail: None,
            style,
            categories: Vec::new(),
            channel_id: None,
            message_id: None,
            thread_tickets,
        }
    }

    /// Find a category by exact name
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.category(name).is_some()
    }
}

fn default_color() -> u32 {
    DEFAULT_PANEL_COLOR
}

/// How the panel presents its categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, poise::ChoiceParameter)]
#[serde(rename_all = "lowercase")]
pub enum PanelStyle {
    #[name = "Dropdown"]
    Dropdown,
    #[name = "Buttons"]
    Buttons,
}

/// A ticket category with the roles allowed to manage its tickets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,

    #[serde(default)]
    pub staff_role_ids: Vec<RoleId>,

    #[serde(default)]
    pub color: ButtonColor,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            emoji: None,
            staff_role_ids: Vec::new(),
            color: ButtonColor::default(),
        }
    }

    pub fn with_staff_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        for role in roles {
            if !self.staff_role_ids.contains(&role) {
                self.staff_role_ids.push(role);
            }
        }
        self
    }

    pub fn is_staff_role(&self, role: RoleId) -> bool {
        self.staff_role_ids.contains(&role)
    }
}

/// Button color for the buttons panel style
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, poise::ChoiceParameter,
)]
#[serde(rename_all = "lowercase")]
pub enum ButtonColor {
    #[default]
    #[name = "Blurple"]
    Blurple,
    #[name = "Green"]
    Green,
    #[name = "Red"]
    Red,
    #[name = "Grey"]
    Grey,
}

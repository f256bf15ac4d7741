pub mod panel;
pub mod settings;

pub use panel::{ButtonColor, Category, PanelConfig, PanelStyle, DEFAULT_PANEL_COLOR, MAX_CATEGORIES, MAX_CATEGORY_NAME_LEN};
pub use settings::BotSettings;

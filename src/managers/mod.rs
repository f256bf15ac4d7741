pub mod channel_manager;
pub mod close_notifier;
pub mod notifier;
pub mod panel_manager;
pub mod permission_gate;
pub mod ticket_manager;

pub use channel_manager::{create_shared_discord_surface, SharedDiscordSurface};
pub use close_notifier::{LogChannelNotifier, ReviewNotifier, TextTranscriptRenderer};
pub use notifier::CloseNotifier;
pub use panel_manager::{create_shared_panel_manager, SharedPanelManager};
pub use permission_gate::Actor;
pub use ticket_manager::{
    create_shared_ticket_manager, CreateTicketRequest, PriorityChange, SharedTicketManager,
};

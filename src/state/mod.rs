pub mod blacklist;
pub mod guild_config;
pub mod store;
pub mod ticket;

pub use guild_config::GuildConfigUpdate;
pub use store::{create_shared_ticket_store, SharedTicketStore};
pub use ticket::{ArchivedTicket, Priority, Ticket};

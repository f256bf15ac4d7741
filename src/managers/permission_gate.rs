use poise::serenity_prelude::{Member, Permissions, RoleId, UserId};

use crate::config::PanelConfig;
use crate::error::{Result, TicketError};
use crate::state::Ticket;

/// Who is acting on a ticket, as far as authorization is concerned
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub user_id: UserId,
    pub role_ids: Vec<RoleId>,
    /// Holds the guild-wide ADMINISTRATOR permission
    pub is_administrator: bool,
}

impl Actor {
    pub fn new(user_id: UserId, role_ids: Vec<RoleId>, is_administrator: bool) -> Self {
        Self {
            user_id,
            role_ids,
            is_administrator,
        }
    }

    /// Build from a guild member; `permissions` are the member's guild-level permissions
    pub fn from_member(member: &Member, permissions: Option<Permissions>) -> Self {
        Self {
            user_id: member.user.id,
            role_ids: member.roles.clone(),
            is_administrator: permissions.is_some_and(|p| p.administrator()),
        }
    }

    pub fn has_any_role(&self, roles: &[RoleId]) -> bool {
        self.role_ids.iter().any(|r| roles.contains(r))
    }
}

/// Whether `actor` may perform staff-only operations on `ticket`
///
/// Administrators always may. Everyone else needs one of the staff roles of
/// the ticket's category; a missing panel or a category that no longer exists
/// denies.
pub fn can_manage(actor: &Actor, ticket: &Ticket, panel: Option<&PanelConfig>) -> bool {
    if actor.is_administrator {
        return true;
    }

    panel
        .and_then(|p| p.category(&ticket.category))
        .map(|category| actor.has_any_role(&category.staff_role_ids))
        .unwrap_or(false)
}

/// `can_manage` as a result, failing with `PermissionDenied`
pub fn require_manage(actor: &Actor, ticket: &Ticket, panel: Option<&PanelConfig>) -> Result<()> {
    if can_manage(actor, ticket, panel) {
        Ok(())
    } else {
        Err(TicketError::PermissionDenied)
    }
}

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TicketError};
use crate::managers::notifier::{CloseNotifier, SurfaceRequest, TicketSurface};
use crate::managers::panel_manager::{validate_category, SharedPanelManager};
use crate::managers::permission_gate::{require_manage, Actor};
use crate::state::{ArchivedTicket, Priority, SharedTicketStore, Ticket};

/// A request to open a ticket, as submitted through the panel modal
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    pub user_id: UserId,
    pub category: String,
    pub subject: String,
    pub description: String,
    /// Raw priority as entered; validated during creation
    pub priority: String,
}

/// A closed ticket and the notifier fan-out running for it
pub struct ClosedTicket {
    pub archived: ArchivedTicket,
    /// Finishes once every notifier has run
    pub notified: JoinHandle<()>,
}

/// Outcome of a priority change, for rendering
#[derive(Debug, Clone)]
pub struct PriorityChange {
    pub ticket: Ticket,
    pub old: Priority,
    pub new: Priority,
}

/// Drives tickets through their lifecycle
pub struct TicketManager {
    store: SharedTicketStore,

    panels: SharedPanelManager,

    /// Notified after every successful close
    notifiers: Vec<Arc<dyn CloseNotifier>>,

    /// Creations in flight ((guild, user) -> reservation)
    creating: DashMap<(GuildId, UserId), ()>,
}

/// Holds a creation reservation until dropped
struct CreationReservation<'a> {
    creating: &'a DashMap<(GuildId, UserId), ()>,
    key: (GuildId, UserId),
}

impl Drop for CreationReservation<'_> {
    fn drop(&mut self) {
        self.creating.remove(&self.key);
    }
}

impl TicketManager {
    pub fn new(store: SharedTicketStore, panels: SharedPanelManager) -> Self {
        Self {
            store,
            panels,
            notifiers: Vec::new(),
            creating: DashMap::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CloseNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn store(&self) -> &SharedTicketStore {
        &self.store
    }

    fn reserve(&self, guild_id: GuildId, user_id: UserId) -> Result<CreationReservation<'_>> {
        let key = (guild_id, user_id);
        match self.creating.entry(key) {
            Entry::Occupied(_) => {
                return Err(TicketError::DuplicateTicket { channel_id: None });
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }
        Ok(CreationReservation {
            creating: &self.creating,
            key,
        })
    }

    /// Validate a creation request, open its surface and record the ticket
    pub async fn create_ticket(
        &self,
        guild_id: GuildId,
        request: CreateTicketRequest,
        surface: &dyn TicketSurface,
    ) -> Result<Ticket> {
        if self.store.is_blacklisted(request.user_id).await {
            return Err(TicketError::Blacklisted);
        }

        let panel = self.panels.require_panel(guild_id).await?;
        let category = validate_category(&panel, &request.category)?.clone();

        let _reservation = self.reserve(guild_id, request.user_id)?;
        if let Some(existing) = self.store.find_open_ticket(guild_id, request.user_id).await {
            return Err(TicketError::DuplicateTicket {
                channel_id: Some(existing.channel_id),
            });
        }

        let priority: Priority = request.priority.parse()?;
        let ticket_number = self.panels.next_ticket_number(guild_id).await?;

        let surface_request = SurfaceRequest {
            guild_id,
            user_id: request.user_id,
            ticket_number,
            category,
            subject: request.subject.clone(),
            description: request.description.clone(),
            priority,
            as_thread: panel.thread_tickets,
            panel_channel_id: panel.channel_id,
            panel_image: panel.image.clone(),
        };
        let channel_id = surface
            .open(&surface_request)
            .await
            .map_err(|e| TicketError::Surface { message: e.message })?;

        let ticket = Ticket {
            ticket_number,
            user_id: request.user_id,
            category: request.category,
            subject: request.subject,
            description: request.description,
            priority,
            claimed_by: None,
            locked: false,
            closed: false,
            channel_id,
            created_at: Utc::now(),
            closed_at: None,
        };

        if let Err(e) = self
            .store
            .write_ticket(guild_id, channel_id, ticket.clone())
            .await
        {
            warn!(
                "Failed to record ticket #{} in guild {}, discarding channel {}: {}",
                ticket.display_number(),
                guild_id,
                channel_id,
                e
            );
            if let Err(discard) = surface.discard(guild_id, channel_id).await {
                warn!("Failed to discard channel {}: {}", channel_id, discard);
            }
            return Err(e);
        }

        info!(
            "Created ticket #{} for user {} in guild {} ({})",
            ticket.display_number(),
            ticket.user_id,
            guild_id,
            ticket.category
        );
        Ok(ticket)
    }

    /// The ticket bound to a channel
    pub async fn ticket(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Ticket> {
        self.store
            .read_ticket(guild_id, channel_id)
            .await
            .ok_or(TicketError::TicketNotFound { channel_id })
    }

    pub async fn open_ticket_for(&self, guild_id: GuildId, user_id: UserId) -> Option<Ticket> {
        self.store.find_open_ticket(guild_id, user_id).await
    }

    /// The ticket of a channel, provided `actor` may manage it
    pub async fn authorize(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        actor: &Actor,
    ) -> Result<Ticket> {
        let ticket = self.ticket(guild_id, channel_id).await?;
        let panel = self.panels.get_panel(guild_id).await;
        require_manage(actor, &ticket, panel.as_ref())?;
        Ok(ticket)
    }

    /// Claim a ticket; the first claim wins
    pub async fn claim_ticket(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        actor: &Actor,
    ) -> Result<Ticket> {
        self.authorize(guild_id, channel_id, actor).await?;

        let claimed = self
            .store
            .modify_ticket(guild_id, channel_id, |ticket| {
                if let Some(claimed_by) = ticket.claimed_by {
                    return Err(TicketError::AlreadyClaimed { claimed_by });
                }
                ticket.claimed_by = Some(actor.user_id);
                Ok(())
            })
            .await?
            .ok_or(TicketError::TicketNotFound { channel_id })?;

        info!(
            "Ticket #{} in guild {} claimed by {}",
            claimed.display_number(),
            guild_id,
            actor.user_id
        );
        Ok(claimed)
    }

    pub async fn set_priority(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        actor: &Actor,
        priority: &str,
    ) -> Result<PriorityChange> {
        self.authorize(guild_id, channel_id, actor).await?;
        let new: Priority = priority.parse()?;

        let mut old = new;
        let ticket = self
            .store
            .modify_ticket(guild_id, channel_id, |ticket| {
                old = ticket.priority;
                ticket.priority = new;
                Ok(())
            })
            .await?
            .ok_or(TicketError::TicketNotFound { channel_id })?;

        info!(
            "Ticket #{} in guild {} priority {} -> {}",
            ticket.display_number(),
            guild_id,
            old,
            new
        );
        Ok(PriorityChange { ticket, old, new })
    }

    /// Lock or unlock a ticket; re-applying the current state is a no-op
    pub async fn set_locked(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        actor: &Actor,
        locked: bool,
    ) -> Result<Ticket> {
        let current = self.authorize(guild_id, channel_id, actor).await?;
        if current.locked == locked {
            debug!(
                "Ticket #{} already {}",
                current.display_number(),
                if locked { "locked" } else { "unlocked" }
            );
            return Ok(current);
        }

        let ticket = self
            .store
            .modify_ticket(guild_id, channel_id, |ticket| {
                ticket.locked = locked;
                Ok(())
            })
            .await?
            .ok_or(TicketError::TicketNotFound { channel_id })?;

        info!(
            "Ticket #{} in guild {} {} by {}",
            ticket.display_number(),
            guild_id,
            if locked { "locked" } else { "unlocked" },
            actor.user_id
        );
        Ok(ticket)
    }

    /// Archive a ticket and start notifying every registered notifier
    ///
    /// The close is final once archived. Notifiers run on a spawned task so
    /// callers can answer the interaction right away; their failures are only
    /// logged.
    pub async fn close_ticket(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        actor: &Actor,
    ) -> Result<ClosedTicket> {
        self.authorize(guild_id, channel_id, actor).await?;

        let archived = self
            .store
            .close_ticket(guild_id, channel_id, Some(actor.user_id))
            .await?
            .ok_or(TicketError::TicketNotFound { channel_id })?;

        info!(
            "Ticket #{} in guild {} closed by {}",
            archived.ticket.display_number(),
            guild_id,
            actor.user_id
        );

        let notifiers = self.notifiers.clone();
        let notified_ticket = archived.clone();
        let notified = tokio::spawn(async move {
            notify_closed(&notifiers, guild_id, &notified_ticket).await;
        });

        Ok(ClosedTicket { archived, notified })
    }
}

async fn notify_closed(
    notifiers: &[Arc<dyn CloseNotifier>],
    guild_id: GuildId,
    archived: &ArchivedTicket,
) {
    for notifier in notifiers {
        if let Err(e) = notifier
            .ticket_closed(guild_id, archived.ticket.user_id, archived)
            .await
        {
            warn!(
                "{} notifier failed for ticket #{} in guild {}: {}",
                notifier.name(),
                archived.ticket.display_number(),
                guild_id,
                e
            );
        }
    }
}

/// Shared ticket manager type
pub type SharedTicketManager = Arc<TicketManager>;

pub fn create_shared_ticket_manager(
    store: SharedTicketStore,
    panels: SharedPanelManager,
    notifiers: Vec<Arc<dyn CloseNotifier>>,
) -> SharedTicketManager {
    let manager = notifiers
        .into_iter()
        .fold(TicketManager::new(store, panels), TicketManager::with_notifier);
    Arc::new(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Category, PanelConfig, PanelStyle};
    use crate::managers::notifier::{NotifyError, SurfaceError};
    use crate::managers::panel_manager::create_shared_panel_manager;
    use crate::state::create_shared_ticket_store;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use poise::serenity_prelude::RoleId;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn staff_role() -> RoleId {
        RoleId::new(100)
    }

    /// Hands out increasing channel ids, optionally slowly
    struct FakeSurface {
        next_channel: AtomicU64,
        delay: Option<Duration>,
        opened: Mutex<Vec<SurfaceRequest>>,
        discarded: Mutex<Vec<ChannelId>>,
    }

    impl FakeSurface {
        fn new() -> Self {
            Self {
                next_channel: AtomicU64::new(500),
                delay: None,
                opened: Mutex::new(Vec::new()),
                discarded: Mutex::new(Vec::new()),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl TicketSurface for FakeSurface {
        async fn open(&self, request: &SurfaceRequest) -> std::result::Result<ChannelId, SurfaceError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.opened.lock().push(request.clone());
            Ok(ChannelId::new(self.next_channel.fetch_add(1, Ordering::SeqCst)))
        }

        async fn discard(
            &self,
            _guild_id: GuildId,
            channel_id: ChannelId,
        ) -> std::result::Result<(), SurfaceError> {
            self.discarded.lock().push(channel_id);
            Ok(())
        }
    }

    struct FailingSurface;

    #[async_trait]
    impl TicketSurface for FailingSurface {
        async fn open(&self, _request: &SurfaceRequest) -> std::result::Result<ChannelId, SurfaceError> {
            Err(SurfaceError::new("Missing Permissions"))
        }

        async fn discard(
            &self,
            _guild_id: GuildId,
            _channel_id: ChannelId,
        ) -> std::result::Result<(), SurfaceError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        closed: Mutex<Vec<(GuildId, UserId, u64)>>,
    }

    #[async_trait]
    impl CloseNotifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn ticket_closed(
            &self,
            guild_id: GuildId,
            user_id: UserId,
            archived: &ArchivedTicket,
        ) -> std::result::Result<(), NotifyError> {
            self.closed
                .lock()
                .push((guild_id, user_id, archived.ticket.ticket_number));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl CloseNotifier for FailingNotifier {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn ticket_closed(
            &self,
            _guild_id: GuildId,
            _user_id: UserId,
            _archived: &ArchivedTicket,
        ) -> std::result::Result<(), NotifyError> {
            Err(NotifyError::Other("user has DMs disabled".to_string()))
        }
    }

    /// Blocks in `ticket_closed` until the gate is opened
    #[derive(Default)]
    struct GatedNotifier {
        gate: Notify,
        closed: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl CloseNotifier for GatedNotifier {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn ticket_closed(
            &self,
            _guild_id: GuildId,
            _user_id: UserId,
            archived: &ArchivedTicket,
        ) -> std::result::Result<(), NotifyError> {
            self.gate.notified().await;
            self.closed.lock().push(archived.ticket.ticket_number);
            Ok(())
        }
    }

    async fn setup(
        notifiers: Vec<Arc<dyn CloseNotifier>>,
    ) -> (tempfile::TempDir, TicketManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = create_shared_ticket_store(dir.path());
        let panels = create_shared_panel_manager(store.clone());

        let mut panel = PanelConfig::new("Help", "Open a ticket", PanelStyle::Dropdown, true);
        panel.categories = vec![
            Category::new("Support").with_staff_roles([staff_role()]),
            Category::new("Billing").with_staff_roles([RoleId::new(200)]),
        ];
        panels.set_panel(guild(), panel).await.unwrap();

        let manager = notifiers
            .into_iter()
            .fold(TicketManager::new(store, panels), TicketManager::with_notifier);
        (dir, manager)
    }

    fn request(user: u64) -> CreateTicketRequest {
        CreateTicketRequest {
            user_id: UserId::new(user),
            category: "Support".to_string(),
            subject: "Login issue".to_string(),
            description: "Can't log in".to_string(),
            priority: "high".to_string(),
        }
    }

    fn staff() -> Actor {
        Actor::new(UserId::new(42), vec![staff_role()], false)
    }

    #[tokio::test]
    async fn test_support_ticket_scenario() {
        let recorder = Arc::new(RecordingNotifier::default());
        let notifier: Arc<dyn CloseNotifier> = recorder.clone();
        let (_dir, manager) = setup(vec![notifier]).await;
        let surface = FakeSurface::new();

        let ticket = manager
            .create_ticket(guild(), request(7), &surface)
            .await
            .unwrap();
        assert_eq!(ticket.ticket_number, 1);
        assert_eq!(ticket.category, "Support");
        assert_eq!(ticket.priority, Priority::High);
        assert!(!ticket.closed);
        assert!(!ticket.locked);
        assert!(ticket.claimed_by.is_none());

        let opened = surface.opened.lock().clone();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].as_thread);
        assert_eq!(opened[0].ticket_number, 1);

        let claimed = manager
            .claim_ticket(guild(), ticket.channel_id, &staff())
            .await
            .unwrap();
        assert_eq!(claimed.claimed_by, Some(UserId::new(42)));

        let closed = manager
            .close_ticket(guild(), ticket.channel_id, &staff())
            .await
            .unwrap();
        closed.notified.await.unwrap();
        let archived = closed.archived;
        assert!(archived.closed_at >= archived.ticket.created_at);
        assert!(manager.store().list_tickets(guild()).await.is_empty());

        let archive = manager
            .store()
            .archived_tickets(guild(), None)
            .await;
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].ticket.ticket_number, 1);
        assert_eq!(archive[0].ticket.user_id, UserId::new(7));
        assert_eq!(archive[0].ticket.category, "Support");
        assert_eq!(archive[0].closed_by, Some(UserId::new(42)));

        assert_eq!(
            recorder.closed.lock().clone(),
            vec![(guild(), UserId::new(7), 1)]
        );
    }

    #[tokio::test]
    async fn test_duplicate_ticket_does_not_allocate() {
        let (_dir, manager) = setup(vec![]).await;
        let surface = FakeSurface::new();

        let first = manager
            .create_ticket(guild(), request(7), &surface)
            .await
            .unwrap();
        let second = manager.create_ticket(guild(), request(7), &surface).await;
        assert!(matches!(
            second,
            Err(TicketError::DuplicateTicket { channel_id: Some(c) }) if c == first.channel_id
        ));

        let other = manager
            .create_ticket(guild(), request(8), &surface)
            .await
            .unwrap();
        assert_eq!(other.ticket_number, 2);
    }

    #[tokio::test]
    async fn test_concurrent_creation_for_same_user() {
        let (_dir, manager) = setup(vec![]).await;
        let surface = FakeSurface::slow(Duration::from_millis(50));

        let (a, b) = tokio::join!(
            manager.create_ticket(guild(), request(7), &surface),
            manager.create_ticket(guild(), request(7), &surface),
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(TicketError::DuplicateTicket { .. }))));
        assert_eq!(manager.store().list_tickets(guild()).await.len(), 1);
        assert_eq!(surface.opened.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_creation_validation_order() {
        let (_dir, manager) = setup(vec![]).await;
        let surface = FakeSurface::new();

        let mut unknown = request(7);
        unknown.category = "Sales".to_string();
        unknown.priority = "urgent".to_string();
        assert!(matches!(
            manager.create_ticket(guild(), unknown, &surface).await,
            Err(TicketError::CategoryNotFound { .. })
        ));

        let mut bad_priority = request(7);
        bad_priority.priority = "urgent".to_string();
        assert!(matches!(
            manager.create_ticket(guild(), bad_priority, &surface).await,
            Err(TicketError::InvalidPriority { value }) if value == "urgent"
        ));

        assert!(matches!(
            manager
                .create_ticket(GuildId::new(99), request(7), &surface)
                .await,
            Err(TicketError::PanelNotConfigured)
        ));

        manager
            .store()
            .blacklist_user(UserId::new(7), None)
            .await
            .unwrap();
        assert!(matches!(
            manager.create_ticket(guild(), request(7), &surface).await,
            Err(TicketError::Blacklisted)
        ));

        assert!(surface.opened.lock().is_empty());
        assert!(manager.store().list_tickets(guild()).await.is_empty());
    }

    #[tokio::test]
    async fn test_surface_failure_writes_nothing() {
        let (_dir, manager) = setup(vec![]).await;

        let result = manager
            .create_ticket(guild(), request(7), &FailingSurface)
            .await;
        assert!(matches!(result, Err(TicketError::Surface { .. })));
        assert!(manager.store().list_tickets(guild()).await.is_empty());
        assert!(manager.open_ticket_for(guild(), UserId::new(7)).await.is_none());

        // The reservation is released; the failed attempt consumed number 1
        let ticket = manager
            .create_ticket(guild(), request(7), &FakeSurface::new())
            .await
            .unwrap();
        assert_eq!(ticket.ticket_number, 2);
    }

    #[tokio::test]
    async fn test_claim_first_wins() {
        let (_dir, manager) = setup(vec![]).await;
        let ticket = manager
            .create_ticket(guild(), request(7), &FakeSurface::new())
            .await
            .unwrap();

        manager
            .claim_ticket(guild(), ticket.channel_id, &staff())
            .await
            .unwrap();

        let again = manager
            .claim_ticket(guild(), ticket.channel_id, &staff())
            .await;
        assert!(matches!(
            again,
            Err(TicketError::AlreadyClaimed { claimed_by }) if claimed_by == UserId::new(42)
        ));

        let admin = Actor::new(UserId::new(43), vec![], true);
        assert!(matches!(
            manager.claim_ticket(guild(), ticket.channel_id, &admin).await,
            Err(TicketError::AlreadyClaimed { .. })
        ));

        let stored = manager.ticket(guild(), ticket.channel_id).await.unwrap();
        assert_eq!(stored.claimed_by, Some(UserId::new(42)));
    }

    #[tokio::test]
    async fn test_racing_claims_single_winner() {
        let (_dir, manager) = setup(vec![]).await;
        let ticket = manager
            .create_ticket(guild(), request(7), &FakeSurface::new())
            .await
            .unwrap();

        let first = Actor::new(UserId::new(42), vec![staff_role()], false);
        let second = Actor::new(UserId::new(43), vec![staff_role()], false);
        let (a, b) = tokio::join!(
            manager.claim_ticket(guild(), ticket.channel_id, &first),
            manager.claim_ticket(guild(), ticket.channel_id, &second),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    }

    #[tokio::test]
    async fn test_staff_operations_require_permission() {
        let (_dir, manager) = setup(vec![]).await;
        let ticket = manager
            .create_ticket(guild(), request(7), &FakeSurface::new())
            .await
            .unwrap();
        let billing = Actor::new(UserId::new(50), vec![RoleId::new(200)], false);

        assert!(matches!(
            manager.claim_ticket(guild(), ticket.channel_id, &billing).await,
            Err(TicketError::PermissionDenied)
        ));
        assert!(matches!(
            manager
                .set_locked(guild(), ticket.channel_id, &billing, true)
                .await,
            Err(TicketError::PermissionDenied)
        ));
        assert!(matches!(
            manager.close_ticket(guild(), ticket.channel_id, &billing).await,
            Err(TicketError::PermissionDenied)
        ));
        assert!(matches!(
            manager
                .claim_ticket(guild(), ChannelId::new(1), &staff())
                .await,
            Err(TicketError::TicketNotFound { .. })
        ));
        assert_eq!(manager.store().list_tickets(guild()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_priority_change() {
        let (_dir, manager) = setup(vec![]).await;
        let ticket = manager
            .create_ticket(guild(), request(7), &FakeSurface::new())
            .await
            .unwrap();

        let change = manager
            .set_priority(guild(), ticket.channel_id, &staff(), "Extreme")
            .await
            .unwrap();
        assert_eq!(change.old, Priority::High);
        assert_eq!(change.new, Priority::Extreme);
        assert_eq!(change.ticket.priority, Priority::Extreme);

        let invalid = manager
            .set_priority(guild(), ticket.channel_id, &staff(), "critical")
            .await;
        assert!(matches!(invalid, Err(TicketError::InvalidPriority { .. })));
        let stored = manager.ticket(guild(), ticket.channel_id).await.unwrap();
        assert_eq!(stored.priority, Priority::Extreme);
    }

    #[tokio::test]
    async fn test_lock_is_idempotent() {
        let (_dir, manager) = setup(vec![]).await;
        let ticket = manager
            .create_ticket(guild(), request(7), &FakeSurface::new())
            .await
            .unwrap();

        let locked = manager
            .set_locked(guild(), ticket.channel_id, &staff(), true)
            .await
            .unwrap();
        assert!(locked.locked);
        let again = manager
            .set_locked(guild(), ticket.channel_id, &staff(), true)
            .await
            .unwrap();
        assert!(again.locked);

        let unlocked = manager
            .set_locked(guild(), ticket.channel_id, &staff(), false)
            .await
            .unwrap();
        assert!(!unlocked.locked);
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_close() {
        let recorder = Arc::new(RecordingNotifier::default());
        let failing: Arc<dyn CloseNotifier> = Arc::new(FailingNotifier);
        let recording: Arc<dyn CloseNotifier> = recorder.clone();
        let (_dir, manager) = setup(vec![failing, recording]).await;
        let ticket = manager
            .create_ticket(guild(), request(7), &FakeSurface::new())
            .await
            .unwrap();

        let closed = manager
            .close_ticket(guild(), ticket.channel_id, &staff())
            .await
            .unwrap();
        closed.notified.await.unwrap();
        assert_eq!(closed.archived.ticket.ticket_number, ticket.ticket_number);
        assert!(manager.store().list_tickets(guild()).await.is_empty());
        assert_eq!(recorder.closed.lock().len(), 1);

        // Closed tickets no longer block a new one
        let next = manager
            .create_ticket(guild(), request(7), &FakeSurface::new())
            .await
            .unwrap();
        assert_eq!(next.ticket_number, 2);
    }

    #[tokio::test]
    async fn test_close_returns_before_notifiers_finish() {
        let gated = Arc::new(GatedNotifier::default());
        let notifier: Arc<dyn CloseNotifier> = gated.clone();
        let (_dir, manager) = setup(vec![notifier]).await;
        let ticket = manager
            .create_ticket(guild(), request(7), &FakeSurface::new())
            .await
            .unwrap();

        let closed = tokio::time::timeout(
            Duration::from_secs(5),
            manager.close_ticket(guild(), ticket.channel_id, &staff()),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(manager.store().list_tickets(guild()).await.is_empty());
        assert!(gated.closed.lock().is_empty());

        gated.gate.notify_one();
        closed.notified.await.unwrap();
        assert_eq!(gated.closed.lock().clone(), vec![ticket.ticket_number]);
    }

    #[tokio::test]
    async fn test_stale_category_is_rejected() {
        let (_dir, manager) = setup(vec![]).await;
        let surface = FakeSurface::new();

        // The form was opened for Billing, which is removed before submission
        manager
            .panels
            .remove_category(guild(), "Billing")
            .await
            .unwrap();
        let mut billing = request(7);
        billing.category = "Billing".to_string();
        assert!(matches!(
            manager.create_ticket(guild(), billing, &surface).await,
            Err(TicketError::CategoryNotFound { name }) if name == "Billing"
        ));
        assert!(surface.opened.lock().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_discards_surface() {
        let (dir, manager) = setup(vec![]).await;
        let surface = FakeSurface::new();

        // A directory where the tickets file should be makes the rename fail
        std::fs::create_dir_all(dir.path().join("tickets").join("1.json")).unwrap();

        let result = manager.create_ticket(guild(), request(7), &surface).await;
        assert!(matches!(result, Err(TicketError::Persistence { .. })));
        assert_eq!(surface.discarded.lock().clone(), vec![ChannelId::new(500)]);
        assert!(manager.store().list_tickets(guild()).await.is_empty());
    }
}

use chrono::Utc;
use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

use super::blacklist::{Blacklist, BlacklistEntry};
use super::guild_config::{GuildConfig, GuildConfigUpdate};
use super::ticket::{ArchivedTicket, Ticket, TicketUpdate};
use crate::error::{Result, TicketError};

/// Default number of archived tickets returned by `archived_tickets`
pub const DEFAULT_ARCHIVE_LIMIT: usize = 50;

/// Active ticket and closed ticket counts for a guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuildStats {
    pub active_tickets: usize,
    pub closed_tickets: usize,
    pub total_tickets: usize,
}

/// In-memory view of one guild's files
#[derive(Debug, Default)]
struct GuildShard {
    loaded: bool,
    config: Option<GuildConfig>,
    tickets: BTreeMap<ChannelId, Ticket>,
}

/// Durable storage for guild configs, active tickets, archives and the blacklist
///
/// Layout under the data directory:
/// data/
/// ├── guilds/{guild_id}.json    # GuildConfig
/// ├── tickets/{guild_id}.json   # channel_id -> Ticket
/// ├── archives/{guild_id}.json  # closed tickets, oldest first
/// └── blacklist.json
///
/// Every mutation of a guild runs under that guild's write lock, so
/// read-modify-write cycles never interleave within a guild while different
/// guilds proceed independently. Memory is only updated after the file write
/// succeeded.
pub struct TicketStore {
    root: PathBuf,
    guilds: DashMap<GuildId, Arc<RwLock<GuildShard>>>,
    blacklist: RwLock<Option<Blacklist>>,
}

impl TicketStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            guilds: DashMap::new(),
            blacklist: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn guild_config_path(&self, guild_id: GuildId) -> PathBuf {
        self.root.join("guilds").join(format!("{}.json", guild_id))
    }

    fn tickets_path(&self, guild_id: GuildId) -> PathBuf {
        self.root.join("tickets").join(format!("{}.json", guild_id))
    }

    fn archive_path(&self, guild_id: GuildId) -> PathBuf {
        self.root.join("archives").join(format!("{}.json", guild_id))
    }

    fn blacklist_path(&self) -> PathBuf {
        self.root.join("blacklist.json")
    }

    fn shard_lock(&self, guild_id: GuildId) -> Arc<RwLock<GuildShard>> {
        let entry = self
            .guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(RwLock::new(GuildShard::default())));
        Arc::clone(entry.value())
    }

    async fn ensure_loaded(&self, guild_id: GuildId, shard: &mut GuildShard) {
        if shard.loaded {
            return;
        }

        shard.config = load_json::<GuildConfig>(&self.guild_config_path(guild_id)).await;
        shard.tickets = load_json::<HashMap<String, Ticket>>(&self.tickets_path(guild_id))
            .await
            .map(|tickets| {
                tickets
                    .into_values()
                    .map(|ticket| (ticket.channel_id, ticket))
                    .collect()
            })
            .unwrap_or_default();
        shard.loaded = true;

        debug!(
            "Loaded guild {}: configured={}, active tickets={}",
            guild_id,
            shard.config.is_some(),
            shard.tickets.len()
        );
    }

    async fn read_shard(&self, guild_id: GuildId) -> OwnedRwLockReadGuard<GuildShard> {
        let lock = self.shard_lock(guild_id);
        {
            let guard = Arc::clone(&lock).read_owned().await;
            if guard.loaded {
                return guard;
            }
        }
        let mut guard = lock.write_owned().await;
        self.ensure_loaded(guild_id, &mut guard).await;
        guard.downgrade()
    }

    async fn write_shard(&self, guild_id: GuildId) -> OwnedRwLockWriteGuard<GuildShard> {
        let mut guard = self.shard_lock(guild_id).write_owned().await;
        self.ensure_loaded(guild_id, &mut guard).await;
        guard
    }

    async fn save_tickets(
        &self,
        guild_id: GuildId,
        tickets: &BTreeMap<ChannelId, Ticket>,
    ) -> Result<()> {
        let by_channel: BTreeMap<String, &Ticket> = tickets
            .iter()
            .map(|(channel_id, ticket)| (channel_id.to_string(), ticket))
            .collect();
        save_json(&self.tickets_path(guild_id), &by_channel).await
    }

    async fn load_archive(&self, guild_id: GuildId) -> Vec<ArchivedTicket> {
        load_json(&self.archive_path(guild_id))
            .await
            .unwrap_or_default()
    }

    // ========== Guild configuration ==========

    pub async fn read_guild_config(&self, guild_id: GuildId) -> Option<GuildConfig> {
        self.read_shard(guild_id).await.config.clone()
    }

    /// Merge an update into the guild config, creating it if absent
    pub async fn write_guild_config(
        &self,
        guild_id: GuildId,
        update: GuildConfigUpdate,
    ) -> Result<GuildConfig> {
        let mut shard = self.write_shard(guild_id).await;

        let mut next = shard
            .config
            .clone()
            .unwrap_or_else(|| GuildConfig::new(guild_id));
        next.merge(update);

        save_json(&self.guild_config_path(guild_id), &next).await?;
        shard.config = Some(next.clone());
        Ok(next)
    }

    /// Run a checked mutation on the guild config under the guild lock
    ///
    /// The config is created if absent. If `mutate` returns an error nothing
    /// is written and the error is returned.
    pub async fn modify_guild_config<F, R>(&self, guild_id: GuildId, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut GuildConfig) -> Result<R>,
    {
        let mut shard = self.write_shard(guild_id).await;

        let mut next = shard
            .config
            .clone()
            .unwrap_or_else(|| GuildConfig::new(guild_id));
        let output = mutate(&mut next)?;

        save_json(&self.guild_config_path(guild_id), &next).await?;
        shard.config = Some(next);
        Ok(output)
    }

    /// Increment the guild's ticket counter and return the new value
    pub async fn allocate_ticket_number(&self, guild_id: GuildId) -> Result<u64> {
        let mut shard = self.write_shard(guild_id).await;

        let mut next = shard
            .config
            .clone()
            .unwrap_or_else(|| GuildConfig::new(guild_id));
        next.ticket_counter += 1;
        let number = next.ticket_counter;

        save_json(&self.guild_config_path(guild_id), &next).await?;
        shard.config = Some(next);

        debug!("Allocated ticket number {} in guild {}", number, guild_id);
        Ok(number)
    }

    pub async fn delete_guild_config(&self, guild_id: GuildId) -> Result<()> {
        let mut shard = self.write_shard(guild_id).await;
        remove_file(&self.guild_config_path(guild_id)).await?;
        shard.config = None;
        Ok(())
    }

    // ========== Active tickets ==========

    pub async fn read_ticket(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<Ticket> {
        self.read_shard(guild_id)
            .await
            .tickets
            .get(&channel_id)
            .cloned()
    }

    pub async fn list_tickets(&self, guild_id: GuildId) -> BTreeMap<ChannelId, Ticket> {
        self.read_shard(guild_id).await.tickets.clone()
    }

    /// The user's non-closed ticket in this guild, if any
    pub async fn find_open_ticket(&self, guild_id: GuildId, user_id: UserId) -> Option<Ticket> {
        self.read_shard(guild_id)
            .await
            .tickets
            .values()
            .find(|t| t.user_id == user_id && !t.closed)
            .cloned()
    }

    pub async fn write_ticket(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        ticket: Ticket,
    ) -> Result<()> {
        let mut shard = self.write_shard(guild_id).await;

        let mut tickets = shard.tickets.clone();
        tickets.insert(channel_id, ticket);

        self.save_tickets(guild_id, &tickets).await?;
        shard.tickets = tickets;
        Ok(())
    }

    /// Apply a partial update; returns `None` without creating anything if the ticket is absent
    pub async fn update_ticket(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        update: TicketUpdate,
    ) -> Result<Option<Ticket>> {
        self.modify_ticket(guild_id, channel_id, |ticket| {
            ticket.apply(&update);
            Ok(())
        })
        .await
    }

    /// Run a checked mutation on a ticket under the guild lock
    ///
    /// If `mutate` returns an error nothing is written and the error is returned.
    pub async fn modify_ticket<F>(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        mutate: F,
    ) -> Result<Option<Ticket>>
    where
        F: FnOnce(&mut Ticket) -> Result<()>,
    {
        let mut shard = self.write_shard(guild_id).await;

        let Some(current) = shard.tickets.get(&channel_id) else {
            return Ok(None);
        };
        let mut updated = current.clone();
        mutate(&mut updated)?;

        let mut tickets = shard.tickets.clone();
        tickets.insert(channel_id, updated.clone());

        self.save_tickets(guild_id, &tickets).await?;
        shard.tickets = tickets;
        Ok(Some(updated))
    }

    /// Remove a ticket from the active set, returning it for archiving
    pub async fn delete_ticket(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Option<Ticket>> {
        let mut shard = self.write_shard(guild_id).await;

        if !shard.tickets.contains_key(&channel_id) {
            return Ok(None);
        }
        let mut tickets = shard.tickets.clone();
        let removed = tickets.remove(&channel_id);

        self.save_tickets(guild_id, &tickets).await?;
        shard.tickets = tickets;
        Ok(removed)
    }

    pub async fn delete_guild_tickets(&self, guild_id: GuildId) -> Result<()> {
        let mut shard = self.write_shard(guild_id).await;
        remove_file(&self.tickets_path(guild_id)).await?;
        shard.tickets.clear();
        Ok(())
    }

    // ========== Archive ==========

    /// Append a ticket to the guild's archive log, stamping `closed_at`
    pub async fn archive_ticket(
        &self,
        guild_id: GuildId,
        ticket: Ticket,
        closed_by: Option<UserId>,
    ) -> Result<ArchivedTicket> {
        let _shard = self.write_shard(guild_id).await;

        let mut archive = self.load_archive(guild_id).await;
        let archived = ArchivedTicket::seal(ticket, closed_by, Utc::now());
        archive.push(archived.clone());

        save_json(&self.archive_path(guild_id), &archive).await?;
        Ok(archived)
    }

    /// Remove a ticket from the active set and archive it in one step
    ///
    /// Returns `None` if no ticket is bound to the channel. If removing the
    /// ticket fails after the archive was written, the archive file is
    /// restored so neither side changes.
    pub async fn close_ticket(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        closed_by: Option<UserId>,
    ) -> Result<Option<ArchivedTicket>> {
        let mut shard = self.write_shard(guild_id).await;

        let Some(ticket) = shard.tickets.get(&channel_id).cloned() else {
            return Ok(None);
        };

        let previous_archive = self.load_archive(guild_id).await;
        let archived = ArchivedTicket::seal(ticket, closed_by, Utc::now());
        let mut archive = previous_archive.clone();
        archive.push(archived.clone());
        save_json(&self.archive_path(guild_id), &archive).await?;

        let mut tickets = shard.tickets.clone();
        tickets.remove(&channel_id);
        if let Err(e) = self.save_tickets(guild_id, &tickets).await {
            if let Err(restore) = save_json(&self.archive_path(guild_id), &previous_archive).await
            {
                warn!(
                    "Failed to restore archive of guild {} after aborted close: {}",
                    guild_id, restore
                );
            }
            return Err(e);
        }
        shard.tickets = tickets;

        info!(
            "Archived ticket #{} of guild {}",
            archived.ticket.display_number(),
            guild_id
        );
        Ok(Some(archived))
    }

    /// The most recent `limit` archived tickets (default `DEFAULT_ARCHIVE_LIMIT`), oldest first
    pub async fn archived_tickets(&self, guild_id: GuildId, limit: Option<usize>) -> Vec<ArchivedTicket> {
        let _shard = self.read_shard(guild_id).await;
        let mut archive = self.load_archive(guild_id).await;
        let limit = limit.unwrap_or(DEFAULT_ARCHIVE_LIMIT);
        let start = archive.len().saturating_sub(limit);
        archive.split_off(start)
    }

    /// An archived ticket by number, searching the whole archive
    pub async fn archived_ticket(&self, guild_id: GuildId, ticket_number: u64) -> Option<ArchivedTicket> {
        let _shard = self.read_shard(guild_id).await;
        self.load_archive(guild_id)
            .await
            .into_iter()
            .rev()
            .find(|a| a.ticket.ticket_number == ticket_number)
    }

    pub async fn guild_stats(&self, guild_id: GuildId) -> GuildStats {
        let shard = self.read_shard(guild_id).await;
        let active_tickets = shard.tickets.len();
        let closed_tickets = self.load_archive(guild_id).await.len();
        GuildStats {
            active_tickets,
            closed_tickets,
            total_tickets: active_tickets + closed_tickets,
        }
    }

    // ========== Blacklist ==========

    async fn with_blacklist<R>(&self, f: impl FnOnce(&Blacklist) -> R) -> R {
        {
            let guard = self.blacklist.read().await;
            if let Some(blacklist) = guard.as_ref() {
                return f(blacklist);
            }
        }
        let mut guard = self.blacklist.write().await;
        if guard.is_none() {
            *guard = Some(load_json(&self.blacklist_path()).await.unwrap_or_default());
        }
        f(guard.get_or_insert_with(Blacklist::new))
    }

    async fn modify_blacklist(&self, mutate: impl FnOnce(&mut Blacklist) -> bool) -> Result<bool> {
        let mut guard = self.blacklist.write().await;
        let mut next = match guard.as_ref() {
            Some(blacklist) => blacklist.clone(),
            None => load_json(&self.blacklist_path()).await.unwrap_or_default(),
        };

        if !mutate(&mut next) {
            *guard = Some(next);
            return Ok(false);
        }

        save_json(&self.blacklist_path(), &next).await?;
        *guard = Some(next);
        Ok(true)
    }

    pub async fn is_blacklisted(&self, user_id: UserId) -> bool {
        self.with_blacklist(|b| b.contains(user_id)).await
    }

    /// Returns false if the user was already blacklisted
    pub async fn blacklist_user(&self, user_id: UserId, added_by: Option<UserId>) -> Result<bool> {
        self.modify_blacklist(|b| b.insert(BlacklistEntry::new(user_id, added_by)))
            .await
    }

    /// Returns false if the user was not blacklisted
    pub async fn unblacklist_user(&self, user_id: UserId) -> Result<bool> {
        self.modify_blacklist(|b| b.remove(user_id)).await
    }

    pub async fn blacklisted_users(&self) -> Vec<BlacklistEntry> {
        self.with_blacklist(|b| b.entries().into_iter().cloned().collect())
            .await
    }
}

/// Shared store type
pub type SharedTicketStore = Arc<TicketStore>;

pub fn create_shared_ticket_store(root: impl Into<PathBuf>) -> SharedTicketStore {
    Arc::new(TicketStore::new(root))
}

/// Read a JSON file; missing, unreadable or malformed files read as `None`
///
/// Malformed files are moved aside to `<file>.corrupt` so a later write does
/// not overwrite the only copy.
async fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring malformed {}: {}", path.display(), e);
            let mut aside = path.as_os_str().to_owned();
            aside.push(".corrupt");
            if let Err(e) = tokio::fs::rename(path, &aside).await {
                warn!("Failed to move {} aside: {}", path.display(), e);
            }
            None
        }
    }
}

/// Write JSON atomically: temp file first, then rename
async fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let persistence_error = |source: std::io::Error| TicketError::Persistence {
        path: path.display().to_string(),
        source,
    };

    let content = serde_json::to_string_pretty(value)
        .map_err(|e| persistence_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(persistence_error)?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    tokio::fs::write(&temp_path, &content)
        .await
        .map_err(persistence_error)?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(persistence_error)?;

    Ok(())
}

async fn remove_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TicketError::Persistence {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PanelConfig, PanelStyle};
    use crate::state::ticket::tests::sample_ticket;
    use crate::state::Priority;

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn store() -> (tempfile::TempDir, TicketStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TicketStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_missing_files_read_as_absent() {
        let (_dir, store) = store();
        assert!(store.read_guild_config(guild()).await.is_none());
        assert!(store.read_ticket(guild(), ChannelId::new(5)).await.is_none());
        assert!(store.list_tickets(guild()).await.is_empty());
        assert!(store.archived_tickets(guild(), Some(10)).await.is_empty());
        assert_eq!(store.guild_stats(guild()).await, GuildStats::default());
    }

    #[tokio::test]
    async fn test_write_guild_config_merges_and_persists() {
        let (dir, store) = store();
        store.allocate_ticket_number(guild()).await.unwrap();

        let panel = PanelConfig::new("Support", "Open a ticket", PanelStyle::Dropdown, true);
        store
            .write_guild_config(guild(), GuildConfigUpdate::panel(panel.clone()))
            .await
            .unwrap();

        let reopened = TicketStore::new(dir.path());
        let config = reopened.read_guild_config(guild()).await.unwrap();
        assert_eq!(config.panel, Some(panel));
        assert_eq!(config.ticket_counter, 1);
    }

    #[tokio::test]
    async fn test_concurrent_config_modifications_all_land() {
        let (_dir, store) = store();
        let store = Arc::new(store);

        let tasks = (0..10).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .modify_guild_config(guild(), move |config| {
                        let prefix = config.prefix.take().unwrap_or_default();
                        config.prefix = Some(format!("{}{}", prefix, i));
                        Ok(())
                    })
                    .await
                    .unwrap()
            })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        let prefix = store.read_guild_config(guild()).await.unwrap().prefix.unwrap();
        let mut digits: Vec<char> = prefix.chars().collect();
        digits.sort_unstable();
        assert_eq!(digits.into_iter().collect::<String>(), "0123456789");
    }

    #[tokio::test]
    async fn test_rejected_config_modification_writes_nothing() {
        let (dir, store) = store();
        let result: Result<()> = store
            .modify_guild_config(guild(), |config| {
                config.prefix = Some("!".to_string());
                Err(TicketError::PanelNotConfigured)
            })
            .await;
        assert!(matches!(result, Err(TicketError::PanelNotConfigured)));
        assert!(store.read_guild_config(guild()).await.is_none());
        assert!(!dir.path().join("guilds").join("1.json").exists());
    }

    #[tokio::test]
    async fn test_concurrent_allocation_is_gapless() {
        let (dir, store) = store();
        store.allocate_ticket_number(guild()).await.unwrap();
        let store = Arc::new(store);

        let tasks = (0..25).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.allocate_ticket_number(guild()).await.unwrap() })
        });
        let mut numbers: Vec<u64> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        numbers.sort_unstable();

        assert_eq!(numbers, (2..=26).collect::<Vec<u64>>());

        let reopened = TicketStore::new(dir.path());
        assert_eq!(reopened.allocate_ticket_number(guild()).await.unwrap(), 27);
    }

    #[tokio::test]
    async fn test_guilds_have_independent_counters() {
        let (_dir, store) = store();
        assert_eq!(store.allocate_ticket_number(guild()).await.unwrap(), 1);
        assert_eq!(store.allocate_ticket_number(guild()).await.unwrap(), 2);
        assert_eq!(
            store.allocate_ticket_number(GuildId::new(2)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_missing_ticket_does_not_create() {
        let (_dir, store) = store();
        let channel = ChannelId::new(20);

        let outcome = store
            .update_ticket(guild(), channel, TicketUpdate::locked(true))
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(store.read_ticket(guild(), channel).await.is_none());
    }

    #[tokio::test]
    async fn test_update_ticket() {
        let (_dir, store) = store();
        let ticket = sample_ticket(1, 10, 20);
        store
            .write_ticket(guild(), ticket.channel_id, ticket.clone())
            .await
            .unwrap();

        let updated = store
            .update_ticket(guild(), ticket.channel_id, TicketUpdate::priority(Priority::Low))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.priority, Priority::Low);
        assert_eq!(
            store.read_ticket(guild(), ticket.channel_id).await.unwrap(),
            updated
        );
    }

    #[tokio::test]
    async fn test_update_keeps_existing_claim() {
        let (_dir, store) = store();
        let ticket = sample_ticket(1, 10, 20);
        store
            .write_ticket(guild(), ticket.channel_id, ticket.clone())
            .await
            .unwrap();

        store
            .update_ticket(guild(), ticket.channel_id, TicketUpdate::claimed_by(UserId::new(42)))
            .await
            .unwrap();
        let updated = store
            .update_ticket(guild(), ticket.channel_id, TicketUpdate::claimed_by(UserId::new(43)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.claimed_by, Some(UserId::new(42)));
        assert_eq!(
            store.read_ticket(guild(), ticket.channel_id).await.unwrap().claimed_by,
            Some(UserId::new(42))
        );
    }

    #[tokio::test]
    async fn test_rejected_modification_writes_nothing() {
        let (_dir, store) = store();
        let ticket = sample_ticket(1, 10, 20);
        store
            .write_ticket(guild(), ticket.channel_id, ticket.clone())
            .await
            .unwrap();

        let result = store
            .modify_ticket(guild(), ticket.channel_id, |t| {
                t.locked = true;
                Err(TicketError::PermissionDenied)
            })
            .await;
        assert!(matches!(result, Err(TicketError::PermissionDenied)));
        assert!(!store.read_ticket(guild(), ticket.channel_id).await.unwrap().locked);
    }

    #[tokio::test]
    async fn test_close_moves_ticket_to_archive() {
        let (_dir, store) = store();
        let ticket = sample_ticket(3, 10, 20);
        store
            .write_ticket(guild(), ticket.channel_id, ticket.clone())
            .await
            .unwrap();

        let archived = store
            .close_ticket(guild(), ticket.channel_id, Some(UserId::new(99)))
            .await
            .unwrap()
            .unwrap();

        assert!(store.list_tickets(guild()).await.is_empty());
        let archive = store.archived_tickets(guild(), None).await;
        assert_eq!(archive, vec![archived.clone()]);
        assert!(archived.closed_at >= ticket.created_at);

        // Round trip: archived record is the pre-close ticket plus closing fields
        let mut expected = ticket.clone();
        expected.closed = true;
        expected.closed_at = Some(archived.closed_at);
        assert_eq!(archive[0].ticket, expected);
        assert_eq!(archive[0].closed_by, Some(UserId::new(99)));

        assert!(store
            .close_ticket(guild(), ticket.channel_id, None)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.guild_stats(guild()).await.closed_tickets, 1);
    }

    #[tokio::test]
    async fn test_delete_then_archive() {
        let (_dir, store) = store();
        let ticket = sample_ticket(1, 10, 20);
        store
            .write_ticket(guild(), ticket.channel_id, ticket.clone())
            .await
            .unwrap();

        let removed = store
            .delete_ticket(guild(), ticket.channel_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed, ticket);
        assert!(store
            .delete_ticket(guild(), ticket.channel_id)
            .await
            .unwrap()
            .is_none());

        let archived = store.archive_ticket(guild(), removed, None).await.unwrap();
        assert_eq!(archived.ticket.ticket_number, 1);
        assert_eq!(store.archived_tickets(guild(), Some(10)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_archive_limit_returns_most_recent() {
        let (_dir, store) = store();
        for n in 1..=5 {
            store
                .archive_ticket(guild(), sample_ticket(n, 10, 20 + n), None)
                .await
                .unwrap();
        }

        let recent: Vec<u64> = store
            .archived_tickets(guild(), Some(2))
            .await
            .iter()
            .map(|a| a.ticket.ticket_number)
            .collect();
        assert_eq!(recent, vec![4, 5]);

        let oldest = store.archived_ticket(guild(), 1).await.unwrap();
        assert_eq!(oldest.ticket.channel_id, ChannelId::new(21));
        assert!(store.archived_ticket(guild(), 6).await.is_none());
    }

    #[tokio::test]
    async fn test_guild_cleanup_keeps_archive() {
        let (dir, store) = store();
        store.allocate_ticket_number(guild()).await.unwrap();
        let open = sample_ticket(2, 11, 21);
        let closed = sample_ticket(1, 10, 20);
        store
            .write_ticket(guild(), open.channel_id, open.clone())
            .await
            .unwrap();
        store
            .write_ticket(guild(), closed.channel_id, closed.clone())
            .await
            .unwrap();
        store
            .close_ticket(guild(), closed.channel_id, None)
            .await
            .unwrap();

        store.delete_guild_config(guild()).await.unwrap();
        store.delete_guild_tickets(guild()).await.unwrap();

        let reopened = TicketStore::new(dir.path());
        assert!(reopened.read_guild_config(guild()).await.is_none());
        assert!(reopened.list_tickets(guild()).await.is_empty());
        assert_eq!(reopened.archived_tickets(guild(), Some(10)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_absent() {
        let (dir, store) = store();
        let guilds_dir = dir.path().join("guilds");
        std::fs::create_dir_all(&guilds_dir).unwrap();
        std::fs::write(guilds_dir.join("1.json"), "{ not json").unwrap();

        assert!(store.read_guild_config(guild()).await.is_none());
        assert!(guilds_dir.join("1.json.corrupt").exists());

        // The next allocation starts a fresh record
        assert_eq!(store.allocate_ticket_number(guild()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let store = TicketStore::new(blocker.join("data"));

        let ticket = sample_ticket(1, 10, 20);
        let result = store.write_ticket(guild(), ticket.channel_id, ticket.clone()).await;
        assert!(matches!(result, Err(TicketError::Persistence { .. })));
        assert!(store.read_ticket(guild(), ticket.channel_id).await.is_none());

        assert!(store.allocate_ticket_number(guild()).await.is_err());
        assert!(store.read_guild_config(guild()).await.is_none());
    }

    #[tokio::test]
    async fn test_blacklist_persists() {
        let (dir, store) = store();
        let user = UserId::new(5);

        assert!(!store.is_blacklisted(user).await);
        assert!(store.blacklist_user(user, None).await.unwrap());
        assert!(!store.blacklist_user(user, None).await.unwrap());

        let reopened = TicketStore::new(dir.path());
        assert!(reopened.is_blacklisted(user).await);
        assert_eq!(reopened.blacklisted_users().await.len(), 1);
        assert!(reopened.unblacklist_user(user).await.unwrap());
        assert!(!reopened.is_blacklisted(user).await);
    }
}

use poise::serenity_prelude::{ChannelId, GuildId, MessageId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::config::{Category, PanelConfig, MAX_CATEGORIES, MAX_CATEGORY_NAME_LEN};
use crate::error::{Result, TicketError};
use crate::state::{GuildConfigUpdate, SharedTicketStore};

/// Maximum length of a per-guild prefix
pub const MAX_PREFIX_LEN: usize = 5;

/// Owns per-guild panel setup and the guild-level settings around it
pub struct PanelManager {
    store: SharedTicketStore,
}

impl PanelManager {
    pub fn new(store: SharedTicketStore) -> Self {
        Self { store }
    }

    /// Store a panel, replacing any previous one; the ticket counter is kept
    pub async fn set_panel(&self, guild_id: GuildId, panel: PanelConfig) -> Result<()> {
        validate_panel(&panel)?;
        let categories = panel.categories.len();
        self.store
            .modify_guild_config(guild_id, |config| {
                config.panel = Some(panel);
                Ok(())
            })
            .await?;
        info!(
            "Panel configured for guild {} with {} categories",
            guild_id, categories
        );
        Ok(())
    }

    /// Store new panel settings, keeping the categories and published message
    /// of an existing panel
    pub async fn setup_panel(&self, guild_id: GuildId, mut panel: PanelConfig) -> Result<PanelConfig> {
        let stored = self
            .store
            .modify_guild_config(guild_id, move |config| {
                if let Some(existing) = config.panel.take() {
                    panel.categories = existing.categories;
                    panel.channel_id = existing.channel_id;
                    panel.message_id = existing.message_id;
                }
                validate_panel(&panel)?;
                config.panel = Some(panel.clone());
                Ok(panel)
            })
            .await?;
        info!(
            "Panel set up for guild {} with {} categories",
            guild_id,
            stored.categories.len()
        );
        Ok(stored)
    }

    pub async fn get_panel(&self, guild_id: GuildId) -> Option<PanelConfig> {
        self.store
            .read_guild_config(guild_id)
            .await
            .and_then(|config| config.panel)
    }

    /// The current panel or `PanelNotConfigured`
    pub async fn require_panel(&self, guild_id: GuildId) -> Result<PanelConfig> {
        self.get_panel(guild_id)
            .await
            .ok_or(TicketError::PanelNotConfigured)
    }

    /// Allocate the next ticket number of the guild
    pub async fn next_ticket_number(&self, guild_id: GuildId) -> Result<u64> {
        self.store.allocate_ticket_number(guild_id).await
    }

    /// Apply a change to the stored panel under the guild lock
    async fn modify_panel<F, R>(&self, guild_id: GuildId, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut PanelConfig) -> Result<R>,
    {
        self.store
            .modify_guild_config(guild_id, |config| {
                let panel = config
                    .panel
                    .as_mut()
                    .ok_or(TicketError::PanelNotConfigured)?;
                mutate(panel)
            })
            .await
    }

    pub async fn add_category(&self, guild_id: GuildId, category: Category) -> Result<PanelConfig> {
        validate_category_name(&category.name)?;
        let name = category.name.clone();

        let panel = self
            .modify_panel(guild_id, move |panel| {
                if panel.has_category(&category.name) {
                    return Err(TicketError::DuplicateCategory {
                        name: category.name,
                    });
                }
                if panel.categories.len() >= MAX_CATEGORIES {
                    return Err(TicketError::PanelFull {
                        max: MAX_CATEGORIES,
                    });
                }
                panel.categories.push(category);
                Ok(panel.clone())
            })
            .await?;

        info!("Added category '{}' to guild {}", name, guild_id);
        Ok(panel)
    }

    pub async fn remove_category(&self, guild_id: GuildId, name: &str) -> Result<Category> {
        let removed = self
            .modify_panel(guild_id, |panel| {
                let index = panel
                    .categories
                    .iter()
                    .position(|c| c.name == name)
                    .ok_or_else(|| TicketError::CategoryNotFound {
                        name: name.to_string(),
                    })?;
                Ok(panel.categories.remove(index))
            })
            .await?;

        info!("Removed category '{}' from guild {}", name, guild_id);
        Ok(removed)
    }

    /// Remember where the panel message was posted
    pub async fn mark_published(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<()> {
        self.modify_panel(guild_id, |panel| {
            panel.channel_id = Some(channel_id);
            panel.message_id = Some(message_id);
            Ok(())
        })
        .await
    }

    pub async fn set_logs_channel(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    ) -> Result<()> {
        self.store
            .write_guild_config(guild_id, GuildConfigUpdate::logs_channel(channel_id))
            .await?;
        Ok(())
    }

    pub async fn logs_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.store
            .read_guild_config(guild_id)
            .await
            .and_then(|config| config.logs_channel_id)
    }

    /// Set the guild's command prefix; `None` restores the default
    pub async fn set_prefix(&self, guild_id: GuildId, prefix: Option<&str>) -> Result<()> {
        if let Some(prefix) = prefix {
            validate_prefix(prefix)?;
        }
        self.store
            .write_guild_config(
                guild_id,
                GuildConfigUpdate::prefix(prefix.map(str::to_string)),
            )
            .await?;
        Ok(())
    }

    pub async fn prefix(&self, guild_id: GuildId) -> Option<String> {
        self.store
            .read_guild_config(guild_id)
            .await
            .and_then(|config| config.prefix)
    }
}

/// Find a category of the panel by name, failing with `CategoryNotFound`
pub fn validate_category<'a>(panel: &'a PanelConfig, name: &str) -> Result<&'a Category> {
    panel
        .category(name)
        .ok_or_else(|| TicketError::CategoryNotFound {
            name: name.to_string(),
        })
}

/// Check a category name: not blank and short enough to fit in a component id
pub fn validate_category_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TicketError::InvalidCategoryName {
            message: "name cannot be empty".to_string(),
        });
    }
    if name.chars().count() > MAX_CATEGORY_NAME_LEN {
        return Err(TicketError::InvalidCategoryName {
            message: format!(
                "name cannot be longer than {} characters",
                MAX_CATEGORY_NAME_LEN
            ),
        });
    }
    Ok(())
}

/// Check the category list of a panel: valid names, no duplicates, within the limit
pub fn validate_panel(panel: &PanelConfig) -> Result<()> {
    if panel.categories.len() > MAX_CATEGORIES {
        return Err(TicketError::PanelFull {
            max: MAX_CATEGORIES,
        });
    }
    let mut seen = HashSet::new();
    for category in &panel.categories {
        validate_category_name(&category.name)?;
        if !seen.insert(category.name.as_str()) {
            return Err(TicketError::DuplicateCategory {
                name: category.name.clone(),
            });
        }
    }
    Ok(())
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.trim().is_empty() {
        return Err(TicketError::InvalidPrefix {
            message: "prefix cannot be empty".to_string(),
        });
    }
    if prefix.chars().count() > MAX_PREFIX_LEN {
        return Err(TicketError::InvalidPrefix {
            message: format!("prefix cannot be longer than {} characters", MAX_PREFIX_LEN),
        });
    }
    Ok(())
}

/// Shared panel manager type
pub type SharedPanelManager = Arc<PanelManager>;

pub fn create_shared_panel_manager(store: SharedTicketStore) -> SharedPanelManager {
    Arc::new(PanelManager::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelStyle;
    use crate::state::create_shared_ticket_store;
    use poise::serenity_prelude::RoleId;

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn manager() -> (tempfile::TempDir, PanelManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = create_shared_ticket_store(dir.path());
        (dir, PanelManager::new(store))
    }

    fn panel() -> PanelConfig {
        PanelConfig::new("Support", "Pick a category", PanelStyle::Buttons, false)
    }

    #[tokio::test]
    async fn test_set_panel_preserves_counter() {
        let (_dir, manager) = manager();
        manager.next_ticket_number(guild()).await.unwrap();
        manager.next_ticket_number(guild()).await.unwrap();

        manager.set_panel(guild(), panel()).await.unwrap();
        manager.set_panel(guild(), panel()).await.unwrap();

        assert_eq!(manager.next_ticket_number(guild()).await.unwrap(), 3);
        assert_eq!(manager.get_panel(guild()).await, Some(panel()));
    }

    #[tokio::test]
    async fn test_category_management() {
        let (_dir, manager) = manager();
        assert!(matches!(
            manager.add_category(guild(), Category::new("Support")).await,
            Err(TicketError::PanelNotConfigured)
        ));

        manager.set_panel(guild(), panel()).await.unwrap();
        manager
            .add_category(
                guild(),
                Category::new("Support").with_staff_roles([RoleId::new(3)]),
            )
            .await
            .unwrap();
        assert!(matches!(
            manager.add_category(guild(), Category::new("Support")).await,
            Err(TicketError::DuplicateCategory { .. })
        ));

        let stored = manager.require_panel(guild()).await.unwrap();
        let category = validate_category(&stored, "Support").unwrap();
        assert_eq!(category.staff_role_ids, vec![RoleId::new(3)]);
        assert!(matches!(
            validate_category(&stored, "Sales"),
            Err(TicketError::CategoryNotFound { name }) if name == "Sales"
        ));

        let removed = manager.remove_category(guild(), "Support").await.unwrap();
        assert_eq!(removed.name, "Support");
        assert!(matches!(
            manager.remove_category(guild(), "Support").await,
            Err(TicketError::CategoryNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_panel_category_limit() {
        let (_dir, manager) = manager();
        let mut full = panel();
        full.categories = (0..MAX_CATEGORIES)
            .map(|i| Category::new(&format!("Category {}", i)))
            .collect();
        manager.set_panel(guild(), full).await.unwrap();

        assert!(matches!(
            manager.add_category(guild(), Category::new("One more")).await,
            Err(TicketError::PanelFull { max }) if max == MAX_CATEGORIES
        ));
    }

    #[tokio::test]
    async fn test_category_names_are_validated() {
        let (_dir, manager) = manager();
        manager.set_panel(guild(), panel()).await.unwrap();

        assert!(matches!(
            manager.add_category(guild(), Category::new("   ")).await,
            Err(TicketError::InvalidCategoryName { .. })
        ));
        let long = "x".repeat(MAX_CATEGORY_NAME_LEN + 1);
        assert!(matches!(
            manager.add_category(guild(), Category::new(&long)).await,
            Err(TicketError::InvalidCategoryName { .. })
        ));
        let longest = "x".repeat(MAX_CATEGORY_NAME_LEN);
        manager
            .add_category(guild(), Category::new(&longest))
            .await
            .unwrap();
        assert_eq!(manager.require_panel(guild()).await.unwrap().categories.len(), 1);
    }

    #[tokio::test]
    async fn test_set_panel_rejects_bad_categories() {
        let (_dir, manager) = manager();

        let mut duplicated = panel();
        duplicated.categories = vec![Category::new("Support"), Category::new("Support")];
        assert!(matches!(
            manager.set_panel(guild(), duplicated).await,
            Err(TicketError::DuplicateCategory { name }) if name == "Support"
        ));

        let mut blank = panel();
        blank.categories = vec![Category::new("")];
        assert!(matches!(
            manager.set_panel(guild(), blank).await,
            Err(TicketError::InvalidCategoryName { .. })
        ));

        assert!(manager.get_panel(guild()).await.is_none());
    }

    #[tokio::test]
    async fn test_setup_panel_keeps_categories_and_publication() {
        let (_dir, manager) = manager();
        let first = manager.setup_panel(guild(), panel()).await.unwrap();
        assert!(first.categories.is_empty());

        manager
            .add_category(guild(), Category::new("Support"))
            .await
            .unwrap();
        manager
            .mark_published(guild(), ChannelId::new(4), MessageId::new(6))
            .await
            .unwrap();

        let renamed = PanelConfig::new("Help desk", "New text", PanelStyle::Dropdown, true);
        let stored = manager.setup_panel(guild(), renamed).await.unwrap();
        assert_eq!(stored.title, "Help desk");
        assert!(stored.thread_tickets);
        assert!(stored.has_category("Support"));
        assert_eq!(stored.channel_id, Some(ChannelId::new(4)));
        assert_eq!(stored.message_id, Some(MessageId::new(6)));
        assert_eq!(manager.get_panel(guild()).await, Some(stored));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_category_adds_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let manager = create_shared_panel_manager(create_shared_ticket_store(dir.path()));
        manager.set_panel(guild(), panel()).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .add_category(guild(), Category::new(&format!("Category {}", i)))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = manager.require_panel(guild()).await.unwrap();
        assert_eq!(stored.categories.len(), 10);
        for i in 0..10 {
            assert!(stored.has_category(&format!("Category {}", i)));
        }
    }

    #[tokio::test]
    async fn test_prefix_and_logs_channel() {
        let (_dir, manager) = manager();
        assert!(manager.prefix(guild()).await.is_none());

        manager.set_prefix(guild(), Some("?")).await.unwrap();
        assert_eq!(manager.prefix(guild()).await.as_deref(), Some("?"));
        assert!(matches!(
            manager.set_prefix(guild(), Some("toolong")).await,
            Err(TicketError::InvalidPrefix { .. })
        ));
        manager.set_prefix(guild(), None).await.unwrap();
        assert!(manager.prefix(guild()).await.is_none());

        manager
            .set_logs_channel(guild(), Some(ChannelId::new(8)))
            .await
            .unwrap();
        assert_eq!(manager.logs_channel(guild()).await, Some(ChannelId::new(8)));
    }

    #[tokio::test]
    async fn test_mark_published() {
        let (_dir, manager) = manager();
        manager.set_panel(guild(), panel()).await.unwrap();
        manager
            .mark_published(guild(), ChannelId::new(4), MessageId::new(6))
            .await
            .unwrap();

        let stored = manager.get_panel(guild()).await.unwrap();
        assert_eq!(stored.channel_id, Some(ChannelId::new(4)));
        assert_eq!(stored.message_id, Some(MessageId::new(6)));
    }
}

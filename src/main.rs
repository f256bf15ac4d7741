use anyhow::{Context as _, Result};
use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Discord support ticket bot
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Force re-sync of slash commands to all guilds (use when commands aren't showing up)
    #[arg(long, short = 's')]
    sync_commands: bool,

    /// Register commands per-guild instead of globally (faster for testing)
    #[arg(long)]
    guild_commands: bool,

    /// Specific guild ID to sync commands to (for testing)
    #[arg(long)]
    guild_id: Option<u64>,
}

mod commands;
mod components;
mod config;
mod error;
mod events;
mod logging;
mod managers;
mod messages;
mod state;

use commands::{
    add, blacklist, claim, close, help, history, lock, panel, ping, priority, recentlogs, remove,
    setprefix, stats, unblacklist, unlock,
};
use config::BotSettings;
use events::{handle_guild_create, handle_guild_delete, handle_interaction};
use logging::SharedLogBuffer;
use managers::{
    create_shared_discord_surface, create_shared_panel_manager, create_shared_ticket_manager,
    CloseNotifier, LogChannelNotifier, ReviewNotifier, SharedDiscordSurface, SharedPanelManager,
    SharedTicketManager, TextTranscriptRenderer,
};
use state::{create_shared_ticket_store, SharedTicketStore};

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared application state
pub struct Data {
    pub settings: Arc<BotSettings>,
    pub store: SharedTicketStore,
    pub panels: SharedPanelManager,
    pub tickets: SharedTicketManager,
    pub surface: SharedDiscordSurface,
    pub log_buffer: SharedLogBuffer,
    pub started_at: Instant,
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let Err(e) = handle_interaction(ctx, interaction, data).await {
                error!("Failed to handle interaction: {}", e);
            }
        }
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            if let Err(e) = handle_guild_create(ctx, guild, *is_new, data).await {
                error!("Failed to handle guild create: {}", e);
            }
        }
        serenity::FullEvent::GuildDelete { incomplete, full } => {
            if let Err(e) = handle_guild_delete(ctx, incomplete, full.as_ref(), data).await {
                error!("Failed to handle guild delete: {}", e);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Log the application ID encoded in the first token segment
fn log_bot_id(token: &str) {
    use base64::Engine;

    let Some(bot_id_b64) = token.split('.').next() else {
        return;
    };
    // Discord tokens use base64 without padding, sometimes the URL-safe variant
    let decoded = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(bot_id_b64)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(bot_id_b64));
    if let Some(id_str) = decoded.ok().and_then(|d| String::from_utf8(d).ok()) {
        info!(
            "Bot ID: {} (configure intents at https://discord.com/developers/applications/{}/bot)",
            id_str, id_str
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // Recent log lines for /recentlogs
    let log_buffer = logging::create_log_buffer(1000);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(logging::LogCaptureLayer::new(log_buffer.clone()))
        .init();

    let token = std::env::var("DISCORD_TOKEN").context("Missing DISCORD_TOKEN environment variable")?;
    log_bot_id(&token);

    let settings = Arc::new(BotSettings::from_env().context("Invalid bot settings")?);
    info!(
        "Settings loaded: prefix '{}', reviews {}, thread tickets by default {}",
        settings.default_prefix, settings.review_enabled, settings.thread_ticket_default
    );

    info!("Using data directory {}", settings.data_path);
    let store = create_shared_ticket_store(&settings.data_path);
    let panels = create_shared_panel_manager(store.clone());

    let owners: HashSet<serenity::UserId> = settings
        .owner_id
        .map(serenity::UserId::new)
        .into_iter()
        .collect();
    if owners.is_empty() {
        warn!("OWNER_ID not set, owner commands fall back to the application owner");
    }

    // Extract CLI flags for use in setup
    let sync_commands = args.sync_commands;
    let guild_commands = args.guild_commands;
    let target_guild_id = args.guild_id;

    if sync_commands {
        info!("--sync-commands: Will force re-register slash commands");
    }
    if guild_commands {
        info!("--guild-commands: Will register commands per-guild (faster for testing)");
    } else {
        info!("Registering commands globally by default (takes up to 1 hour to propagate)");
    }
    if let Some(gid) = target_guild_id {
        info!("--guild-id: Targeting specific guild {}", gid);
    }

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                ping(),
                help(),
                stats(),
                setprefix(),
                panel(),
                close(),
                claim(),
                lock(),
                unlock(),
                priority(),
                add(),
                remove(),
                history(),
                blacklist(),
                unblacklist(),
                recentlogs(),
            ],
            owners,
            prefix_options: poise::PrefixFrameworkOptions {
                dynamic_prefix: Some(|ctx| {
                    Box::pin(async move {
                        let custom = match ctx.guild_id {
                            Some(guild_id) => ctx.data.panels.prefix(guild_id).await,
                            None => None,
                        };
                        Ok(Some(
                            custom.unwrap_or_else(|| ctx.data.settings.default_prefix.clone()),
                        ))
                    })
                }),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' invoked by {} (ID: {}) in {}",
                        ctx.command().qualified_name,
                        ctx.author().name,
                        ctx.author().id,
                        ctx.guild_id().map(|g| g.to_string()).unwrap_or_else(|| "DM".to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' completed for {}",
                        ctx.command().qualified_name,
                        ctx.author().name
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx.say(format!("An error occurred: {}", error)).await;
                        }
                        poise::FrameworkError::ArgumentParse { error, input, ctx, .. } => {
                            warn!("Argument parse error in '{}': {} (input: {:?})", ctx.command().qualified_name, error, input);
                            let _ = ctx.say(format!("❌ {}", error)).await;
                        }
                        poise::FrameworkError::MissingBotPermissions { missing_permissions, ctx, .. } => {
                            error!("Bot missing permissions for '{}': {:?}", ctx.command().qualified_name, missing_permissions);
                            let _ = ctx.say(format!("Bot is missing permissions: {:?}", missing_permissions)).await;
                        }
                        poise::FrameworkError::MissingUserPermissions { missing_permissions, ctx, .. } => {
                            warn!("User {} missing permissions for '{}': {:?}", ctx.author().name, ctx.command().qualified_name, missing_permissions);
                            let _ = ctx.say("❌ You don't have permission to use this command.").await;
                        }
                        poise::FrameworkError::NotAnOwner { ctx, .. } => {
                            warn!("User {} tried to use owner command '{}'", ctx.author().name, ctx.command().qualified_name);
                        }
                        poise::FrameworkError::GuildOnly { ctx, .. } => {
                            warn!("Command '{}' is guild-only, used in DM by {}", ctx.command().qualified_name, ctx.author().name);
                        }
                        other => {
                            error!("Other framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            let settings = settings.clone();
            let store = store.clone();
            let panels = panels.clone();
            let log_buffer = log_buffer.clone();

            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);

                let http = ctx.http.clone();
                let surface =
                    create_shared_discord_surface(http.clone(), settings.clone(), ready.user.id);
                let log_notifier: Arc<dyn CloseNotifier> = Arc::new(LogChannelNotifier::new(
                    http.clone(),
                    panels.clone(),
                    Arc::new(TextTranscriptRenderer::new(http.clone())),
                ));
                let review_notifier: Arc<dyn CloseNotifier> =
                    Arc::new(ReviewNotifier::new(http.clone(), settings.clone()));
                let tickets = create_shared_ticket_manager(
                    store.clone(),
                    panels.clone(),
                    vec![log_notifier, review_notifier],
                );

                // Determine which guilds to register commands for
                let guilds_to_register: Vec<serenity::GuildId> = if let Some(gid) = target_guild_id {
                    vec![serenity::GuildId::new(gid)]
                } else {
                    ready.guilds.iter().map(|g| g.id).collect()
                };

                if guild_commands || sync_commands {
                    for guild_id in &guilds_to_register {
                        info!("Registering commands to guild: {}", guild_id);
                        if let Err(e) = poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            *guild_id,
                        ).await {
                            error!("Failed to register commands for guild {}: {}", guild_id, e);
                        } else {
                            info!("Successfully registered {} commands for guild {}",
                                  framework.options().commands.len(), guild_id);
                        }
                    }
                } else {
                    info!("Registering commands globally...");
                    if let Err(e) = poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    ).await {
                        error!("Failed to register commands globally: {}", e);
                    } else {
                        info!("Successfully registered {} commands globally (may take up to 1 hour to propagate)",
                              framework.options().commands.len());
                    }
                }

                Ok(Data {
                    settings,
                    store,
                    panels,
                    tickets,
                    surface,
                    log_buffer,
                    started_at: Instant::now(),
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    if let Err(e) = client.start().await {
        let err_str = e.to_string();
        if err_str.contains("Disallowed") || err_str.contains("intents") {
            error!("Failed to start bot: {}", e);
            error!("Enable MESSAGE_CONTENT and GUILD_MEMBERS under Bot -> Privileged Gateway Intents in the Discord Developer Portal");
            return Err(anyhow::anyhow!(
                "Disallowed gateway intents: MESSAGE_CONTENT, GUILD_MEMBERS"
            ));
        }
        return Err(e.into());
    }
    warn!("Bot ended.");

    Ok(())
}

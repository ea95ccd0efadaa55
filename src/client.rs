use std::{sync::Arc, time::Instant};

use anyhow::Context as _;
use poise::serenity_prelude::{self as serenity, GatewayIntents};
use songbird::{SerenityInit, Songbird};
use soundbot::{
    commands::catalog::{self, CommandCatalog, CommandScope},
    infrastructure::{botdata::Data, environment::Config, event_handler::event_handler},
    soundboard::SoundRegistry,
    voice::{
        connections::{ConnectionManager, ConnectionOptions},
        songbird_link::SongbirdBackend,
    },
};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

pub struct Bot {
    pub client: serenity::Client,
    pub connections: Arc<ConnectionManager>,
}

pub async fn create_serenity_client(config: Config) -> anyhow::Result<Bot> {
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let sounds = SoundRegistry::load(&config.sounds_directory).context("Failed to load sounds")?;
    let voice = Songbird::serenity();
    let connections = ConnectionManager::new(
        Arc::new(SongbirdBackend::new(voice.clone())),
        ConnectionOptions {
            disconnect_grace: config.disconnect_grace,
            auto_join: config.auto_join,
        },
    );
    let framework = create_poise_framework(&config, sounds, connections.clone());

    let client = serenity::ClientBuilder::new(&config.token, intents)
        .framework(framework)
        .register_songbird_with(voice)
        .await
        .context("Failed to create serenity client")?;
    Ok(Bot {
        client,
        connections,
    })
}

fn create_poise_framework(
    config: &Config,
    sounds: SoundRegistry,
    connections: Arc<ConnectionManager>,
) -> poise::Framework<Data, soundbot::Error> {
    let scope = match config.guild_id {
        Some(guild_id) => CommandScope::Guild(guild_id),
        None => CommandScope::Global,
    };
    let max_sound_bytes = config.max_sound_bytes;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: catalog::enabled_commands(&config.disabled_commands),
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Executing Command: {:?} for {} ({})",
                        ctx.command().name,
                        ctx.author()
                            .clone()
                            .member
                            .and_then(|m| m.nick)
                            .unwrap_or(ctx.author().display_name().to_string()),
                        ctx.author().name,
                    );

                    if let Ok(mut invoc_time) = ctx.data().invoc_time.write() {
                        invoc_time.insert(ctx.id(), Instant::now());
                    }
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    if let Ok(mut invoc_time_map) = ctx.data().invoc_time.write() {
                        match invoc_time_map.remove(&ctx.id()) {
                            Some(start_time) => {
                                debug!(
                                    "Command {} finished in {:?}",
                                    ctx.command().name,
                                    start_time.elapsed()
                                );
                            }
                            None => {
                                error!(
                                    "Post-command hook called for command without a start-time set."
                                );
                            }
                        }
                    }
                })
            },
            on_error: |error| Box::pin(catalog::on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                let command_catalog = CommandCatalog::new(scope);
                command_catalog
                    .register(&ctx.http, &framework.options().commands, &sounds.choices())
                    .await?;

                Ok(Data {
                    sounds: Arc::new(RwLock::new(sounds)),
                    connections,
                    catalog: command_catalog,
                    http_client: reqwest::Client::new(),
                    max_sound_bytes,
                    invoc_time: Default::default(),
                })
            })
        })
        .build();

    for cmd in framework.options().commands.iter() {
        info!("Loaded command: {:#?}", cmd.name);
    }

    framework
}

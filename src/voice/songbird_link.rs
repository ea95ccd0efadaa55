use std::path::Path;
use std::sync::Arc;

use poise::serenity_prelude::{ChannelId, GuildId, async_trait};
use songbird::error::JoinError;
use songbird::events::{CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use songbird::{Call, Songbird};
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

use crate::Error;
use crate::voice::connections::{LinkObserver, VoiceBackend, VoiceLink};

/// Joins voice channels through the songbird manager registered with the serenity client.
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        observer: LinkObserver,
    ) -> Result<Arc<dyn VoiceLink>, Error> {
        let call = self.manager.join(guild_id, channel_id).await?;
        {
            let mut handler = call.lock().await;
            // The call may have been moved here from another channel of the guild.
            handler.remove_all_global_events();
            handler.add_global_event(TrackEvent::Error.into(), TrackErrorNotifier);
            for event in [
                CoreEvent::DriverDisconnect,
                CoreEvent::DriverConnect,
                CoreEvent::DriverReconnect,
            ] {
                handler.add_global_event(
                    event.into(),
                    DriverStateNotifier {
                        observer: observer.clone(),
                    },
                );
            }
        }
        trace!(
            guild_id = guild_id.get(),
            channel_id = channel_id.get(),
            "Joined voice channel"
        );

        Ok(Arc::new(SongbirdLink {
            manager: self.manager.clone(),
            guild_id,
            call,
        }))
    }
}

struct SongbirdLink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    async fn play(&self, path: &Path) -> Result<(), Error> {
        if !tokio::fs::try_exists(path).await? {
            return Err(format!("{} does not exist", path.display()).into());
        }
        let mut handler = self.call.lock().await;
        let source = songbird::input::File::new(path.to_path_buf());
        let track = handler.play_only_input(source.into());
        trace!("Playing track {:?}", track.uuid());
        Ok(())
    }

    async fn leave(&self) -> Result<(), Error> {
        match self.manager.remove(self.guild_id).await {
            Ok(_) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

struct TrackErrorNotifier;

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (state, handle) in *track_list {
                error!(
                    "Track {:?} encountered an error: {:?}",
                    handle.uuid(),
                    state.playing
                );
            }
        }

        None
    }
}

/// Forwards driver connection changes to the connection manager.
struct DriverStateNotifier {
    observer: LinkObserver,
}

#[async_trait]
impl VoiceEventHandler for DriverStateNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::DriverDisconnect(data) => {
                debug!(
                    channel_id = self.observer.channel_id().get(),
                    "Voice driver disconnected: {:?}",
                    data.reason
                );
                self.observer.disconnected().await;
            }
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                self.observer.recovered().await;
            }
            _ => {}
        }

        None
    }
}

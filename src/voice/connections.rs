/*!

Keeps at most one voice session per channel and tears sessions down when they go idle.

A session goes away when:
- its channel is left with only the bot in it (checked on every voice state update),
- its link reports a disconnect and does not reconnect within the grace window,
- the process shuts down.

The actual transport sits behind [`VoiceBackend`]/[`VoiceLink`] so the lifecycle can be driven without a gateway.

*/

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use poise::serenity_prelude::{ChannelId, GuildId, async_trait};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::Error;

pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// An established audio link to a single voice channel.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Starts playing `path`, replacing anything currently playing on this link.
    async fn play(&self, path: &Path) -> Result<(), Error>;

    async fn leave(&self) -> Result<(), Error>;
}

/// Creates voice links. The backend reports link health back through the [`LinkObserver`].
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        observer: LinkObserver,
    ) -> Result<Arc<dyn VoiceLink>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot destroy unbound connection for channel {0}")]
    NoSession(ChannelId),
    #[error("Cannot join channel {channel_id}: {source}")]
    Join {
        channel_id: ChannelId,
        #[source]
        source: Error,
    },
    #[error("Cannot play the given file: {0}")]
    Play(#[source] Error),
    #[error("Cannot leave channel {channel_id}: {source}")]
    Leave {
        channel_id: ChannelId,
        #[source]
        source: Error,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    pub disconnect_grace: Duration,
    /// Join a channel when a user enters it, without waiting for a play request.
    pub auto_join: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
            auto_join: true,
        }
    }
}

/// Channel membership observed after a voice state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyUpdate {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    /// Everyone connected to the channel, the bot included.
    pub occupants: usize,
    /// A user entered this channel with this update (as opposed to leaving it).
    pub user_joined: bool,
}

/// Handed to a [`VoiceBackend`] on join so it can report the link's transport state.
#[derive(Debug, Clone)]
pub struct LinkObserver {
    manager: Weak<ConnectionManager>,
    channel_id: ChannelId,
    session_id: u64,
}

impl LinkObserver {
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub async fn disconnected(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager
                .on_link_disconnected(self.channel_id, self.session_id)
                .await;
        }
    }

    pub async fn recovered(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager
                .on_link_recovered(self.channel_id, self.session_id)
                .await;
        }
    }
}

struct Session {
    id: u64,
    guild_id: GuildId,
    link: Arc<dyn VoiceLink>,
    /// Set while the link is down; holds the number of the disconnect the pending timer belongs to.
    pending_disconnect: Option<u64>,
    disconnects: u64,
}

pub struct ConnectionManager {
    backend: Arc<dyn VoiceBackend>,
    sessions: Mutex<HashMap<ChannelId, Session>>,
    next_session_id: AtomicU64,
    options: ConnectionOptions,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(backend: Arc<dyn VoiceBackend>, options: ConnectionOptions) -> Arc<Self> {
        Arc::new(Self {
            backend,
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            options,
        })
    }

    #[cfg(test)]
    async fn has_session(&self, channel_id: ChannelId) -> bool {
        self.sessions.lock().await.contains_key(&channel_id)
    }

    #[cfg(test)]
    async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns the link for `channel_id`, joining the channel first if there is no session yet.
    ///
    /// The bot holds a single call per guild, so joining a second channel in the same guild moves the call
    /// and the previous channel's session is retired.
    pub async fn create_session(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceLink>, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&channel_id) {
            trace!(channel_id = channel_id.get(), "Reusing voice session");
            return Ok(session.link.clone());
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let observer = LinkObserver {
            manager: Arc::downgrade(self),
            channel_id,
            session_id,
        };
        let link = self
            .backend
            .join(guild_id, channel_id, observer)
            .await
            .map_err(|source| SessionError::Join { channel_id, source })?;

        sessions.retain(|other_channel, session| {
            let moved = session.guild_id == guild_id;
            if moved {
                debug!(
                    guild_id = guild_id.get(),
                    from = other_channel.get(),
                    to = channel_id.get(),
                    "Voice call moved to another channel"
                );
            }
            !moved
        });
        sessions.insert(
            channel_id,
            Session {
                id: session_id,
                guild_id,
                link: link.clone(),
                pending_disconnect: None,
                disconnects: 0,
            },
        );
        info!(
            guild_id = guild_id.get(),
            channel_id = channel_id.get(),
            "Created voice session"
        );
        Ok(link)
    }

    pub async fn destroy_session(&self, channel_id: ChannelId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        Self::remove_and_leave(&mut sessions, channel_id).await
    }

    /// Plays the file at `path` in `channel_id`, joining the channel if needed.
    pub async fn play(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
        path: &Path,
    ) -> Result<(), SessionError> {
        let link = self.create_session(guild_id, channel_id).await?;
        link.play(path).await.map_err(SessionError::Play)?;
        debug!(
            channel_id = channel_id.get(),
            path = %path.display(),
            "Started playback"
        );
        Ok(())
    }

    /// Reacts to a change in a channel's membership.
    pub async fn on_occupancy(self: &Arc<Self>, update: OccupancyUpdate) -> Result<(), SessionError> {
        trace!("Occupancy update: {:?}", update);
        {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(&update.channel_id) {
                if update.occupants <= 1 {
                    info!(
                        channel_id = update.channel_id.get(),
                        "Only the bot remains in the channel, leaving"
                    );
                    return Self::remove_and_leave(&mut sessions, update.channel_id).await;
                }
                return Ok(());
            }
        }

        if update.user_joined && self.options.auto_join {
            self.create_session(update.guild_id, update.channel_id)
                .await?;
        }
        Ok(())
    }

    /// Starts the grace timer for a link that lost its transport.
    pub async fn on_link_disconnected(self: &Arc<Self>, channel_id: ChannelId, session_id: u64) {
        let disconnect = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get_mut(&channel_id) {
                Some(session) if session.id == session_id && session.pending_disconnect.is_some() => {
                    trace!(
                        channel_id = channel_id.get(),
                        "Voice link already down, keeping the running grace window"
                    );
                    return;
                }
                Some(session) if session.id == session_id => {
                    session.disconnects += 1;
                    session.pending_disconnect = Some(session.disconnects);
                    session.disconnects
                }
                _ => {
                    trace!(
                        channel_id = channel_id.get(),
                        session_id = session_id,
                        "Ignoring disconnect from a retired link"
                    );
                    return;
                }
            }
        };

        debug!(
            channel_id = channel_id.get(),
            grace = ?self.options.disconnect_grace,
            "Voice link disconnected, waiting for it to recover"
        );
        let manager = Arc::downgrade(self);
        let grace = self.options.disconnect_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(manager) = manager.upgrade() {
                manager
                    .expire_disconnected(channel_id, session_id, disconnect)
                    .await;
            }
        });
    }

    /// Cancels a pending teardown once the link is signalling or connecting again.
    pub async fn on_link_recovered(&self, channel_id: ChannelId, session_id: u64) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&channel_id)
            && session.id == session_id
            && session.pending_disconnect.take().is_some()
        {
            debug!(channel_id = channel_id.get(), "Voice link recovered");
        }
    }

    /// Leaves every channel.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        let channels: Vec<ChannelId> = sessions.keys().copied().collect();
        for channel_id in channels {
            if let Err(e) = Self::remove_and_leave(&mut sessions, channel_id).await {
                warn!("Failed to close voice session on shutdown: {}", e);
            }
        }
    }

    async fn expire_disconnected(&self, channel_id: ChannelId, session_id: u64, disconnect: u64) {
        let mut sessions = self.sessions.lock().await;
        let expired = matches!(
            sessions.get(&channel_id),
            Some(session) if session.id == session_id && session.pending_disconnect == Some(disconnect)
        );
        if !expired {
            return;
        }

        warn!(
            channel_id = channel_id.get(),
            "Voice link did not recover in time, destroying session"
        );
        if let Err(e) = Self::remove_and_leave(&mut sessions, channel_id).await {
            warn!("{}", e);
        }
    }

    async fn remove_and_leave(
        sessions: &mut HashMap<ChannelId, Session>,
        channel_id: ChannelId,
    ) -> Result<(), SessionError> {
        let session = sessions
            .remove(&channel_id)
            .ok_or(SessionError::NoSession(channel_id))?;
        info!(channel_id = channel_id.get(), "Destroying voice session");
        session
            .link
            .leave()
            .await
            .map_err(|source| SessionError::Leave { channel_id, source })
    }
}

/*
    Turns gateway voice state changes into channel occupancy updates for the connection manager.
*/

use poise::serenity_prelude::{ChannelId, Context, GuildId, VoiceState};
use tracing::{debug, trace, warn};

use crate::{
    Error,
    infrastructure::botdata::Data,
    voice::connections::OccupancyUpdate,
};

/// Updates for the channel a user left and the channel they entered.
///
/// `occupants` reports how many members are connected to a channel, or `None` when that is unknown, in which
/// case the channel is skipped.
pub fn occupancy_updates<F>(
    guild_id: GuildId,
    old_channel: Option<ChannelId>,
    new_channel: Option<ChannelId>,
    occupants: F,
) -> Vec<OccupancyUpdate>
where
    F: Fn(ChannelId) -> Option<usize>,
{
    let mut updates = Vec::with_capacity(2);
    let mut push = |channel_id: ChannelId, user_joined: bool| match occupants(channel_id) {
        Some(occupants) => updates.push(OccupancyUpdate {
            guild_id,
            channel_id,
            occupants,
            user_joined,
        }),
        None => debug!(
            channel_id = channel_id.get(),
            "Channel membership unknown, skipping"
        ),
    };

    match (old_channel, new_channel) {
        // mute, deafen, stream toggles
        (Some(old), Some(new)) if old == new => push(new, false),
        (old, new) => {
            if let Some(old) = old {
                push(old, false);
            }
            if let Some(new) = new {
                push(new, true);
            }
        }
    }
    updates
}

fn cached_occupants(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
    ctx.cache.guild(guild_id).map(|guild| {
        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id))
            .count()
    })
}

pub async fn voice_state_update(
    ctx: &Context,
    data: &Data,
    old: Option<&VoiceState>,
    new: &VoiceState,
) -> Result<(), Error> {
    let bot_id = ctx.cache.current_user().id;
    if new.user_id == bot_id {
        trace!("Ignoring the bot's own voice state");
        return Ok(());
    }
    let Some(guild_id) = new.guild_id.or_else(|| old.and_then(|state| state.guild_id)) else {
        return Ok(());
    };

    let updates = occupancy_updates(
        guild_id,
        old.and_then(|state| state.channel_id),
        new.channel_id,
        |channel_id| cached_occupants(ctx, guild_id, channel_id),
    );
    for update in updates {
        if let Err(e) = data.connections.on_occupancy(update).await {
            warn!(
                channel_id = update.channel_id.get(),
                "Failed to apply voice state update: {}", e
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(1);
    const LOBBY: ChannelId = ChannelId::new(10);
    const GAMING: ChannelId = ChannelId::new(11);

    fn update(channel_id: ChannelId, occupants: usize, user_joined: bool) -> OccupancyUpdate {
        OccupancyUpdate {
            guild_id: GUILD,
            channel_id,
            occupants,
            user_joined,
        }
    }

    fn occupants(channel_id: ChannelId) -> Option<usize> {
        if channel_id == LOBBY {
            Some(1)
        } else if channel_id == GAMING {
            Some(3)
        } else {
            None
        }
    }

    #[test]
    fn test_join() {
        assert_eq!(
            occupancy_updates(GUILD, None, Some(LOBBY), occupants),
            vec![update(LOBBY, 1, true)]
        );
    }

    #[test]
    fn test_leave() {
        assert_eq!(
            occupancy_updates(GUILD, Some(GAMING), None, occupants),
            vec![update(GAMING, 3, false)]
        );
    }

    #[test]
    fn test_move_reports_old_channel_first() {
        assert_eq!(
            occupancy_updates(GUILD, Some(GAMING), Some(LOBBY), occupants),
            vec![update(GAMING, 3, false), update(LOBBY, 1, true)]
        );
    }

    #[test]
    fn test_state_change_in_same_channel_is_not_a_join() {
        assert_eq!(
            occupancy_updates(GUILD, Some(LOBBY), Some(LOBBY), occupants),
            vec![update(LOBBY, 1, false)]
        );
    }

    #[test]
    fn test_unknown_membership_is_skipped() {
        let unknown = ChannelId::new(99);

        assert!(occupancy_updates(GUILD, Some(unknown), None, occupants).is_empty());
    }
}

use poise::CreateReply;
use poise::serenity_prelude::{ChannelId, GuildId};
use tracing::trace;

use crate::{
    Context, Error,
    commands::catalog::MAX_CHOICES,
    infrastructure::{ids::require_guild_id, util::DebuggableReply},
};

const NOT_IN_VOICE: &str = "The member is not connected to a voice channel";

/// Names containing `partial` (case-insensitive), at most one page of suggestions.
pub fn matching_names(names: Vec<String>, partial: &str) -> Vec<String> {
    let partial = partial.to_lowercase();
    names
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&partial))
        .take(MAX_CHOICES)
        .collect()
}

async fn autocomplete_sound<'a>(
    ctx: Context<'a>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    trace!(partial = partial, "play autocomplete executed with args");
    let names = ctx.data().sounds.read().await.names();
    matching_names(names, partial).into_iter()
}

/// The voice channel the invoking member is connected to.
async fn invoker_voice_channel(ctx: Context<'_>, guild_id: GuildId) -> Result<ChannelId, Error> {
    let cached = ctx.guild().and_then(|guild| {
        guild
            .voice_states
            .get(&ctx.author().id)
            .and_then(|state| state.channel_id)
    });
    if let Some(channel_id) = cached {
        return Ok(channel_id);
    }

    let voice_state = guild_id
        .get_user_voice_state(&ctx.serenity_context().http, ctx.author().id)
        .await
        .map_err(|e| {
            trace!("Voice state lookup failed: {:?}", e);
            NOT_IN_VOICE
        })?;
    voice_state.channel_id.ok_or::<Error>(NOT_IN_VOICE.into())
}

/// Plays a sound
#[poise::command(slash_command, guild_only)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "The name of the sound"]
    #[autocomplete = "autocomplete_sound"]
    name: String,
) -> Result<(), Error> {
    trace!(name = name.as_str(), "play executed with args");
    ctx.defer_ephemeral().await?;
    let guild_id = require_guild_id(ctx)?;
    let channel_id = invoker_voice_channel(ctx, guild_id).await?;

    let path = {
        let sounds = ctx.data().sounds.read().await;
        let sound = sounds
            .get(&name)
            .ok_or("Could not find a sound with the given name")?;
        sounds.path_of(sound)
    };

    ctx.data()
        .connections
        .play(guild_id, channel_id, &path)
        .await?;

    let reply = CreateReply::default()
        .content(format!("Playing {}", name))
        .ephemeral(true);
    trace!("Sending reply: {:?}", DebuggableReply::new(&reply));
    ctx.send(reply).await?;
    Ok(())
}

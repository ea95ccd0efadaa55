use std::num::{NonZeroU64, ParseIntError};

use poise::serenity_prelude::GuildId;
use tracing::trace;

use crate::{Context, Error};

pub fn require_guild_id(ctx: Context<'_>) -> Result<GuildId, Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command is only available in guilds")?;
    trace!("Found guild_id={:?}", guild_id);
    Ok(guild_id)
}

/// Parses a snowflake id. Zero is rejected since serenity ids are non-zero.
pub fn id_from_string<T>(value: &str) -> Result<T, ParseIntError>
where
    T: From<NonZeroU64>,
{
    value.trim().parse::<NonZeroU64>().map(T::from)
}

#[cfg(test)]
mod tests {
    use poise::serenity_prelude::ChannelId;

    use super::*;

    #[test]
    fn test_id_from_string() {
        assert_eq!(id_from_string::<GuildId>("42"), Ok(GuildId::new(42)));
        assert_eq!(id_from_string::<ChannelId>(" 7 "), Ok(ChannelId::new(7)));
        assert!(id_from_string::<GuildId>("0").is_err());
        assert!(id_from_string::<GuildId>("guild").is_err());
    }
}

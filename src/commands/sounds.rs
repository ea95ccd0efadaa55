use poise::{CreateReply, serenity_prelude::CreateEmbed};
use tracing::trace;

use crate::{
    Context, Error,
    infrastructure::{
        colors,
        util::{DebuggableReply, truncate_with_ellipsis},
    },
};

/// Longest description Discord accepts in an embed.
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

pub fn describe_sounds(names: &[String]) -> String {
    if names.is_empty() {
        return "No sounds registered yet, add one with `/register`".into();
    }
    truncate_with_ellipsis(&names.join(", "), EMBED_DESCRIPTION_LIMIT)
}

/// Display all the registered sounds
#[poise::command(slash_command)]
pub async fn sounds(ctx: Context<'_>) -> Result<(), Error> {
    let names = ctx.data().sounds.read().await.names();

    let reply = CreateReply::default().embed(
        CreateEmbed::new()
            .title(format!("Sounds ({})", names.len()))
            .description(describe_sounds(&names))
            .color(colors::slate()),
    );
    trace!("Sending reply: {:?}", DebuggableReply::new(&reply));
    ctx.send(reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_sounds() {
        assert_eq!(
            describe_sounds(&["boom".to_string(), "zap".to_string()]),
            "boom, zap"
        );
        assert!(describe_sounds(&[]).contains("/register"));
    }

    #[test]
    fn test_describe_sounds_fits_embed() {
        let names: Vec<String> = (0..2000).map(|i| format!("sound{i}")).collect();

        assert_eq!(
            describe_sounds(&names).chars().count(),
            EMBED_DESCRIPTION_LIMIT
        );
    }
}

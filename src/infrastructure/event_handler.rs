use poise::serenity_prelude::{Context, FullEvent};
use tracing::{info, warn};

use crate::{Error, events::voice_state::voice_state_update, infrastructure::botdata::Data};

pub async fn event_handler(
    ctx: &Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        FullEvent::Ready { data_about_bot, .. } => {
            info!("Bot is ready. Logged in as {}", data_about_bot.user.name);
        }
        FullEvent::VoiceStateUpdate { old, new } => {
            let result = voice_state_update(ctx, data, old.as_ref(), new).await;
            if let Err(e) = result {
                warn!("Voice state handler produced an error: {:?}", e);
            }
        }
        _ => {}
    }
    Ok(())
}

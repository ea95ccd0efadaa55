/*!

The command table: which commands exist, how they are registered with Discord and how dispatch failures reach the user.

`play` is registered from a hand-built schema rather than poise's, because its choices are the registry's sound names and
are re-pushed whenever a sound is registered.

*/

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
};

use poise::{
    CreateReply, FrameworkError,
    serenity_prelude::{
        self as serenity, CommandId, CommandOptionType, CreateCommand, CreateCommandOption,
        CreateInteractionResponse, CreateInteractionResponseMessage, GuildId, Http,
    },
};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::{Error, commands, infrastructure::botdata::Data};

pub const PLAY_COMMAND: &str = "play";
/// Discord rejects options with more choices than this.
pub const MAX_CHOICES: usize = 25;

/// Every command the bot knows, minus those named in `disabled` (lower-case).
pub fn enabled_commands(disabled: &HashSet<String>) -> Vec<poise::Command<Data, Error>> {
    let default_commands = vec![
        commands::ping::ping(),
        commands::play::play(),
        commands::sounds::sounds(),
        commands::register::register(),
    ];

    let disabled_commands_info: Vec<&String> = disabled
        .iter()
        .filter(|s| default_commands.iter().any(|cmd| cmd.name.to_lowercase() == **s))
        .collect();
    if disabled_commands_info.is_empty() {
        info!("Loading default commands");
    } else {
        info!("Disabled commands: {:?}", disabled_commands_info);
    }

    default_commands
        .into_iter()
        .filter(|cmd| !disabled.contains(&cmd.name.to_lowercase()))
        .collect()
}

/// Remote schema for `play`. Up to [`MAX_CHOICES`] sounds are offered as fixed choices, beyond that the option
/// switches to autocomplete.
pub fn play_command_schema(choices: &[(String, String)]) -> CreateCommand {
    let mut option = CreateCommandOption::new(
        CommandOptionType::String,
        "name",
        "The name of the sound",
    )
    .required(true);

    if choices.len() > MAX_CHOICES {
        option = option.set_autocomplete(true);
    } else {
        for (name, value) in choices {
            option = option.add_string_choice(name, value);
        }
    }

    CreateCommand::new(PLAY_COMMAND)
        .description("Plays a sound")
        .add_option(option)
}

/// Builds the remote schema of every command in `commands`.
pub fn command_schemas(
    commands: &[poise::Command<Data, Error>],
    choices: &[(String, String)],
) -> Vec<CreateCommand> {
    commands
        .iter()
        .filter_map(|cmd| {
            if cmd.name == PLAY_COMMAND {
                Some(play_command_schema(choices))
            } else {
                cmd.create_as_slash_command()
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Guild(GuildId),
    Global,
}

/// Remote ids of the registered commands, by name.
#[derive(Debug)]
pub struct CommandCatalog {
    scope: CommandScope,
    ids: RwLock<HashMap<String, CommandId>>,
}

impl CommandCatalog {
    pub fn new(scope: CommandScope) -> Self {
        Self {
            scope,
            ids: RwLock::new(HashMap::new()),
        }
    }

    pub async fn id_of(&self, name: &str) -> Option<CommandId> {
        self.ids.read().await.get(name).copied()
    }

    /// Replaces the remote command list with `commands` and records the ids Discord assigned.
    pub async fn register(
        &self,
        http: &Http,
        commands: &[poise::Command<Data, Error>],
        choices: &[(String, String)],
    ) -> Result<usize, Error> {
        let schemas = command_schemas(commands, choices);
        let registered = match self.scope {
            CommandScope::Guild(guild_id) => guild_id.set_commands(http, schemas).await?,
            CommandScope::Global => serenity::Command::set_global_commands(http, schemas).await?,
        };

        let mut ids = self.ids.write().await;
        ids.clear();
        ids.extend(registered.iter().map(|cmd| (cmd.name.clone(), cmd.id)));
        info!(
            "Registered {} commands ({:?})!",
            registered.len(),
            self.scope
        );
        Ok(registered.len())
    }

    /// Pushes `play`'s schema again so its choices match the registry.
    pub async fn refresh_play(&self, http: &Http, choices: &[(String, String)]) -> Result<(), Error> {
        let Some(id) = self.id_of(PLAY_COMMAND).await else {
            warn!("play is not registered, skipping choice refresh");
            return Ok(());
        };

        let schema = play_command_schema(choices);
        match self.scope {
            CommandScope::Guild(guild_id) => {
                guild_id.edit_command(http, id, schema).await?;
            }
            CommandScope::Global => {
                serenity::Command::edit_global_command(http, id, schema).await?;
            }
        }
        info!("Updated play with {} sounds", choices.len());
        Ok(())
    }
}

pub fn error_message(error: impl Display) -> String {
    format!("Encountered an error: {}", error)
}

/// Dispatch boundary: command failures and unknown commands are reported to the invoking user.
pub async fn on_error(error: FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            warn!(
                command = ctx.command().name.as_str(),
                "Command failed: {}", error
            );
            let reply = CreateReply::default()
                .content(error_message(&error))
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                error!("Failed to report command error: {:?}", e);
            }
        }
        FrameworkError::UnknownInteraction {
            ctx, interaction, ..
        } => {
            warn!("Called unknown command {}", interaction.data.name);
            let response = CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(error_message("Called unknown command"))
                    .ephemeral(true),
            );
            if let Err(e) = interaction.create_response(ctx, response).await {
                error!("Failed to report unknown command: {:?}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("{:?}", e);
            }
        }
    }
}

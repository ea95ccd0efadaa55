use std::{collections::HashSet, fmt::Debug, path::PathBuf, time::Duration};

use poise::serenity_prelude::GuildId;

use crate::{
    infrastructure::ids::id_from_string, voice::connections::DEFAULT_DISCONNECT_GRACE,
};

macro_rules! const_str {
    ($name:ident) => {
        pub const $name: &str = stringify!($name);
    };
}

const_str!(DISCORD_TOKEN);
const_str!(GUILD_ID);
const_str!(SOUNDS_DIRECTORY);
const_str!(AUTO_JOIN);
const_str!(DISCONNECT_GRACE_MS);
const_str!(MAX_SOUND_BYTES);
const_str!(COMMAND_DISABLE_LIST);

const_str!(LOG_LEVEL);
const_str!(LOG_STYLE);
const_str!(LOG_PATH);
const_str!(LOG_DIRECTORY);

pub const DEFAULT_SOUNDS_DIRECTORY: &str = "sounds";
pub const DEFAULT_MAX_SOUND_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for environment variable {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings read from the environment (after `.env` has been loaded).
#[derive(Clone)]
pub struct Config {
    pub token: String,
    /// Commands are registered for this guild only when set, globally otherwise.
    pub guild_id: Option<GuildId>,
    pub sounds_directory: PathBuf,
    pub auto_join: bool,
    pub disconnect_grace: Duration,
    pub max_sound_bytes: u64,
    /// Lower-cased names of commands removed from the command table.
    pub disabled_commands: HashSet<String>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .field("sounds_directory", &self.sounds_directory)
            .field("auto_join", &self.auto_join)
            .field("disconnect_grace", &self.disconnect_grace)
            .field("max_sound_bytes", &self.max_sound_bytes)
            .field("disabled_commands", &self.disabled_commands)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let token = var(DISCORD_TOKEN).ok_or(ConfigError::Missing(DISCORD_TOKEN))?;

        let guild_id = var(GUILD_ID)
            .map(|value| {
                id_from_string::<GuildId>(&value).map_err(|e| invalid(GUILD_ID, &value, e))
            })
            .transpose()?;

        let auto_join = var(AUTO_JOIN)
            .map(|value| parse_bool(&value).ok_or_else(|| invalid(AUTO_JOIN, &value, "expected a boolean")))
            .transpose()?
            .unwrap_or(true);

        let disconnect_grace = var(DISCONNECT_GRACE_MS)
            .map(|value| {
                value
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| invalid(DISCONNECT_GRACE_MS, &value, e))
            })
            .transpose()?
            .unwrap_or(DEFAULT_DISCONNECT_GRACE);

        let max_sound_bytes = var(MAX_SOUND_BYTES)
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|e| invalid(MAX_SOUND_BYTES, &value, e))
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_SOUND_BYTES);

        let disabled_commands = var(COMMAND_DISABLE_LIST)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            token,
            guild_id,
            sounds_directory: var(SOUNDS_DIRECTORY)
                .unwrap_or_else(|| DEFAULT_SOUNDS_DIRECTORY.to_string())
                .into(),
            auto_join,
            disconnect_grace,
            max_sound_bytes,
            disabled_commands,
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[(DISCORD_TOKEN, "token")]).unwrap();

        assert_eq!(config.token, "token");
        assert_eq!(config.guild_id, None);
        assert_eq!(config.sounds_directory, PathBuf::from("sounds"));
        assert!(config.auto_join);
        assert_eq!(config.disconnect_grace, Duration::from_secs(5));
        assert_eq!(config.max_sound_bytes, DEFAULT_MAX_SOUND_BYTES);
        assert!(config.disabled_commands.is_empty());
    }

    #[test]
    fn test_missing_token() {
        assert_eq!(
            config_from(&[]).unwrap_err(),
            ConfigError::Missing(DISCORD_TOKEN)
        );
        assert_eq!(
            config_from(&[(DISCORD_TOKEN, "  ")]).unwrap_err(),
            ConfigError::Missing(DISCORD_TOKEN)
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            (DISCORD_TOKEN, "token"),
            (GUILD_ID, "123456789"),
            (SOUNDS_DIRECTORY, "/srv/clips"),
            (AUTO_JOIN, "no"),
            (DISCONNECT_GRACE_MS, "2500"),
            (MAX_SOUND_BYTES, "1024"),
            (COMMAND_DISABLE_LIST, "Ping, register,,"),
        ])
        .unwrap();

        assert_eq!(config.guild_id, Some(GuildId::new(123456789)));
        assert_eq!(config.sounds_directory, PathBuf::from("/srv/clips"));
        assert!(!config.auto_join);
        assert_eq!(config.disconnect_grace, Duration::from_millis(2500));
        assert_eq!(config.max_sound_bytes, 1024);
        assert_eq!(
            config.disabled_commands,
            HashSet::from(["ping".to_string(), "register".to_string()])
        );
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = config_from(&[(DISCORD_TOKEN, "token"), (GUILD_ID, "not-a-number")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: GUILD_ID, .. }));

        let err = config_from(&[(DISCORD_TOKEN, "token"), (AUTO_JOIN, "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: AUTO_JOIN, .. }));

        let err =
            config_from(&[(DISCORD_TOKEN, "token"), (DISCONNECT_GRACE_MS, "-1")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: DISCONNECT_GRACE_MS, .. }));
    }

    #[test]
    fn test_debug_hides_token() {
        let config = config_from(&[(DISCORD_TOKEN, "super-secret")]).unwrap();

        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}

use crate::infrastructure::botdata;

pub mod soundboard;

pub mod commands {
    pub mod catalog;
    pub mod ping;
    pub mod play;
    pub mod register;
    pub mod sounds;
}

pub mod infrastructure {
    pub mod botdata;
    pub mod colors;
    pub mod environment;
    pub mod event_handler;
    pub mod ids;
    pub mod util;
}

pub mod events {
    pub mod voice_state;
}

pub mod voice {
    pub mod connections;
    pub mod songbird_link;
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, botdata::Data, Error>;

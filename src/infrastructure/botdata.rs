use std::{collections::HashMap, sync::Arc, time::Instant};

use tokio::sync::RwLock;

use crate::{
    commands::catalog::CommandCatalog, soundboard::SoundRegistry,
    voice::connections::ConnectionManager,
};

pub struct Data {
    pub sounds: Arc<RwLock<SoundRegistry>>,
    pub connections: Arc<ConnectionManager>,
    pub catalog: CommandCatalog,
    pub http_client: reqwest::Client,
    pub max_sound_bytes: u64,
    pub invoc_time: std::sync::RwLock<HashMap<u64, Instant>>,
}

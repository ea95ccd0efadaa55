/*!

In-memory mapping of sound names to the clip files in the sounds directory.

The registry is populated from a directory scan at startup and extended by the `register` command.
Names are never removed; registering an existing name replaces its file.

*/

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tracing::{debug, info, trace, warn};

use crate::lazy_regex;

lazy_regex! { SOUND_NAME_REGEX, r"^[A-Za-z0-9_\- ]{1,32}$" }

const EXCLUDED_FILES: &[&str] = &[".gitkeep"];
const DEFAULT_EXTENSION: &str = "mp3";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Cannot read sound directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid sound name {0:?}, use 1-32 letters, digits, spaces, '-' or '_'")]
    InvalidName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sound {
    name: String,
    relative_path: PathBuf,
}

impl Sound {
    pub fn new(name: impl Into<String>, relative_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
        }
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }
}

#[derive(Debug)]
pub struct SoundRegistry {
    root: PathBuf,
    sounds: BTreeMap<String, Sound>,
}

impl SoundRegistry {
    /// Creates an empty registry rooted at `root` without touching the filesystem.
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sounds: BTreeMap::new(),
        }
    }

    /// Scans `root` for clips, creating the directory if it does not exist yet.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let mut registry = Self::empty(root);
        let root = registry.root.clone();
        let io_err = |source| RegistryError::Io {
            path: root.clone(),
            source,
        };

        std::fs::create_dir_all(&root).map_err(io_err)?;
        let entries = std::fs::read_dir(&root).map_err(io_err)?;

        for entry in entries {
            let entry = entry.map_err(io_err)?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                debug!("Skipping non UTF-8 file name {:?}", entry.file_name());
                continue;
            };
            if EXCLUDED_FILES.contains(&file_name) || file_name.starts_with('.') {
                continue;
            }
            let name = Path::new(file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file_name);
            if let Err(e) = Self::validate_name(name) {
                warn!("Skipping {}: {}", file_name, e);
                continue;
            }
            trace!(name = name, file = file_name, "Found sound");
            if let Some(previous) = registry.add(name, file_name) {
                warn!(
                    "Sound {} is provided by both {} and {}, using {}",
                    name,
                    previous.relative_path().display(),
                    file_name,
                    file_name
                );
            }
        }

        info!(
            "Loaded {} sounds from {}",
            registry.len(),
            registry.root.display()
        );
        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Inserts or replaces the sound called `name`, returning the replaced entry.
    pub fn add(&mut self, name: impl Into<String>, relative_path: impl Into<PathBuf>) -> Option<Sound> {
        let sound = Sound::new(name, relative_path);
        self.sounds.insert(sound.name.clone(), sound)
    }

    pub fn get(&self, name: &str) -> Option<&Sound> {
        self.sounds.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.sounds.keys().cloned().collect()
    }

    /// `(name, value)` pairs for the `play` command's option choices.
    pub fn choices(&self) -> Vec<(String, String)> {
        self.sounds
            .keys()
            .map(|name| (name.clone(), name.clone()))
            .collect()
    }

    pub fn path_of(&self, sound: &Sound) -> PathBuf {
        self.root.join(&sound.relative_path)
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    pub fn validate_name(name: &str) -> Result<(), RegistryError> {
        if name.trim().is_empty() || !SOUND_NAME_REGEX.is_match(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// File name used on disk for a clip uploaded as `uploaded_file_name`.
    pub fn file_name_for(name: &str, uploaded_file_name: &str) -> String {
        let ext = Path::new(uploaded_file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        format!("{}.{}", name, ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"clip").expect("write test clip");
    }

    #[test]
    fn test_load_maps_file_stems_to_files() {
        let dir = tempfile::tempdir().expect("create temp dir");
        touch(dir.path(), "airhorn.mp3");
        touch(dir.path(), "bruh.ogg");
        touch(dir.path(), ".gitkeep");
        touch(dir.path(), ".hidden.mp3");
        std::fs::create_dir(dir.path().join("nested")).expect("create nested dir");

        let registry = SoundRegistry::load(dir.path()).expect("load registry");

        assert_eq!(registry.names(), vec!["airhorn", "bruh"]);
        let airhorn = registry.get("airhorn").expect("airhorn is registered");
        assert_eq!(airhorn.relative_path(), Path::new("airhorn.mp3"));
        assert_eq!(registry.path_of(airhorn), dir.path().join("airhorn.mp3"));
        assert!(registry.get("nested").is_none());
    }

    #[test]
    fn test_load_skips_files_without_a_valid_name() {
        let dir = tempfile::tempdir().expect("create temp dir");
        touch(dir.path(), "boom.mp3");
        touch(dir.path(), &format!("{}.mp3", "x".repeat(120)));
        touch(dir.path(), "what?.mp3");

        let registry = SoundRegistry::load(dir.path()).expect("load registry");

        assert_eq!(registry.names(), vec!["boom"]);
    }

    #[test]
    fn test_load_keeps_one_file_per_stem() {
        let dir = tempfile::tempdir().expect("create temp dir");
        touch(dir.path(), "boom.mp3");
        touch(dir.path(), "boom.ogg");

        let registry = SoundRegistry::load(dir.path()).expect("load registry");

        assert_eq!(registry.len(), 1);
        let path = registry.get("boom").expect("boom is registered").relative_path();
        assert!(path == Path::new("boom.mp3") || path == Path::new("boom.ogg"));
    }

    #[test]
    fn test_load_creates_missing_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().join("sounds");

        let registry = SoundRegistry::load(&root).expect("load registry");

        assert!(registry.is_empty());
        assert!(root.is_dir());
    }

    #[test]
    fn test_add_overwrites_existing_name() {
        let mut registry = SoundRegistry::empty("sounds");
        assert!(registry.add("airhorn", "airhorn.mp3").is_none());

        let replaced = registry.add("airhorn", "airhorn.ogg");

        assert_eq!(replaced, Some(Sound::new("airhorn", "airhorn.mp3")));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("airhorn").map(Sound::relative_path),
            Some(Path::new("airhorn.ogg"))
        );
    }

    #[test]
    fn test_choices_follow_name_order() {
        let mut registry = SoundRegistry::empty("sounds");
        registry.add("zap", "zap.mp3");
        registry.add("boom", "boom.mp3");

        assert_eq!(
            registry.choices(),
            vec![
                ("boom".to_string(), "boom".to_string()),
                ("zap".to_string(), "zap".to_string())
            ]
        );
    }

    #[test]
    fn test_validate_name_rejects_paths_and_blanks() {
        assert!(SoundRegistry::validate_name("air horn_2-final").is_ok());

        assert!(SoundRegistry::validate_name("").is_err());
        assert!(SoundRegistry::validate_name("   ").is_err());
        assert!(SoundRegistry::validate_name("../etc/passwd").is_err());
        assert!(SoundRegistry::validate_name("a/b").is_err());
        assert!(SoundRegistry::validate_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_file_name_keeps_upload_extension() {
        assert_eq!(SoundRegistry::file_name_for("boom", "Boom.OGG"), "boom.ogg");
        assert_eq!(SoundRegistry::file_name_for("boom", "boom"), "boom.mp3");
        assert_eq!(SoundRegistry::file_name_for("boom", "boom.m-p3"), "boom.mp3");
    }
}

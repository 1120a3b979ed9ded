//! System prompt presets and the object store they live in.
//!
//! The store is a plain key -> UTF-8 blob map. Presets are one JSON object
//! under [`PRESETS_KEY`], read once per session and written back only on an
//! explicit save.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::error::PresetStoreError;

pub const PRESETS_KEY: &str = "lunachat/system_prompts.json";
pub const DEFAULT_PRESET: &str = "default";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub trait PresetStore: Send + Sync {
    /// `Ok(None)` when the key does not exist
    fn read(&self, key: &str) -> Result<Option<String>, PresetStoreError>;

    fn write(&self, key: &str, blob: &str) -> Result<(), PresetStoreError>;
}

/// Store backed by a directory, one file per key
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PresetStoreError> {
        let rel = Path::new(key);
        let valid = !key.is_empty()
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(PresetStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl PresetStore for DirectoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, PresetStoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, blob: &str) -> Result<(), PresetStoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, blob)?;
        Ok(())
    }
}

/// In-process store, used when no directory is available and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresetStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, PresetStoreError> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.get(key).cloned())
    }

    fn write(&self, key: &str, blob: &str) -> Result<(), PresetStoreError> {
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// Named system prompts. `"default"` always resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompts {
    prompts: BTreeMap<String, String>,
}

impl Default for SystemPrompts {
    fn default() -> Self {
        let mut prompts = BTreeMap::new();
        prompts.insert(DEFAULT_PRESET.to_string(), DEFAULT_SYSTEM_PROMPT.to_string());
        Self { prompts }
    }
}

impl SystemPrompts {
    /// Load presets, seeding the store when the key is missing or blank.
    /// Store or parse failures fall back to the built-in default mapping.
    pub fn load(store: &dyn PresetStore) -> Self {
        match Self::try_load(store) {
            Ok(prompts) => prompts,
            Err(e) => {
                warn!(error = %e, "could not load system prompts, using defaults");
                Self::default()
            }
        }
    }

    fn try_load(store: &dyn PresetStore) -> Result<Self, PresetStoreError> {
        let blob = store.read(PRESETS_KEY)?;

        let blob = match blob {
            Some(blob) if !blob.trim().is_empty() => blob,
            _ => {
                info!(key = PRESETS_KEY, "seeding default system prompts");
                let seeded = Self::default();
                seeded.save(store)?;
                return Ok(seeded);
            }
        };

        let mut prompts: BTreeMap<String, String> = serde_json::from_str(&blob)?;
        prompts
            .entry(DEFAULT_PRESET.to_string())
            .or_insert_with(|| DEFAULT_SYSTEM_PROMPT.to_string());
        Ok(Self { prompts })
    }

    pub fn save(&self, store: &dyn PresetStore) -> Result<(), PresetStoreError> {
        let blob = serde_json::to_string_pretty(&self.prompts)?;
        store.write(PRESETS_KEY, &blob)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.prompts.get(name).map(String::as_str)
    }

    pub fn default_prompt(&self) -> &str {
        self.get(DEFAULT_PRESET).unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn insert(&mut self, name: &str, text: &str) {
        self.prompts.insert(name.to_string(), text.to_string());
    }

    /// Returns false for unknown names and for `"default"`, which cannot go
    pub fn remove(&mut self, name: &str) -> bool {
        if name == DEFAULT_PRESET {
            return false;
        }
        self.prompts.remove(name).is_some()
    }
}

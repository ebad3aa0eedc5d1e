// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Small key-value store for UI preferences such as acknowledged
//! explainers. Stores are injected where they are needed.

use log::*;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Set once the user dismissed the registration explainer.
pub const EXPLAINER_ACKNOWLEDGED: &str = "explainer_acknowledged";

const PREFS_FILE: &str = "preferences.toml";

#[derive(Debug, thiserror::Error)]
pub enum PrefsErr {
    #[error("failed to access preferences: {0}")]
    Io(#[from] std::io::Error),

    #[error("preferences file is corrupt: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("failed to encode preferences: {0}")]
    Encode(#[from] toml::ser::Error),
}

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsErr>;

    fn set(&self, key: &str, value: &str) -> Result<(), PrefsErr>;

    /// Boolean preference, `false` if unset.
    fn flag(&self, key: &str) -> Result<bool, PrefsErr> {
        Ok(self.get(key)?.map_or(false, |value| value == "true"))
    }

    fn set_flag(&self, key: &str, value: bool) -> Result<(), PrefsErr> {
        self.set(key, if value { "true" } else { "false" })
    }
}

#[derive(Debug, Default)]
pub struct MemoryPrefs {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryPrefs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPrefs {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsErr> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PrefsErr> {
        self.values.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Preferences kept in a TOML file, rewritten on every change.
#[derive(Debug)]
pub struct FilePrefs {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FilePrefs {
    /// Opens the preferences file in `data_dir`, creating the directory if
    /// needed. A missing file means no preferences are set.
    pub fn open(data_dir: &Path) -> Result<Self, PrefsErr> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(PREFS_FILE);

        let values: BTreeMap<String, String> = match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        debug!("Loaded {} preferences from {}", values.len(), path.display());
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), PrefsErr> {
        let encoded = toml::to_string_pretty(values)?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for FilePrefs {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsErr> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PrefsErr> {
        let mut values = self.values.write();
        let previous = values.insert(key.to_owned(), value.to_owned());

        if let Err(err) = self.persist(&values) {
            // Keep memory and disk in sync
            match previous {
                Some(previous) => values.insert(key.to_owned(), previous),
                None => values.remove(key),
            };
            return Err(err);
        }

        Ok(())
    }
}

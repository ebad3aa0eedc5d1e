// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use config::{Config, ConfigError, File};
use lazy_static::*;
use log::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, metadata, File as FsFile};
use std::io::Write;
use std::path::{Path, PathBuf};
use struct_field_names_as_array::FieldNamesAsArray;

const ENV_PREFIX: &str = "idwallet";
const APP_DIR: &str = "IdWallet";

lazy_static! {
    pub static ref SETTINGS: Settings = Settings::new().unwrap();
}

#[derive(Debug, Serialize, Deserialize, Default, FieldNamesAsArray)]
pub struct Settings {
    /// Wallet daemon connection settings.
    pub backend: Backend,

    /// Invoke bridge settings.
    pub bridge: Bridge,

    /// Confirmation tracker settings.
    pub tracker: Tracker,

    /// Application settings.
    pub app: App,
}

impl Settings {
    /// Loads settings from the default location, creating a default
    /// configuration file if there is none.
    pub fn new() -> Result<Self, ConfigError> {
        let mut config_path = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("user configuration directory".to_owned()))?;
        config_path.push(APP_DIR);
        config_path.push("config.toml");

        if metadata(&config_path).is_err() {
            write_default_config(&config_path);
        }

        Self::load(&config_path)
    }

    /// Loads settings from `config_path` if it exists, then applies
    /// environment overrides on top.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let default_settings = Settings::default();
        let env_source: Vec<_> = std::env::vars().collect();
        let mut s = Config::builder()
            .add_source(File::from(config_path.to_path_buf()).required(false));

        // Set defaults
        let defaults: HashMap<String, HashMap<String, DynamicConfVal>> = serde_yaml::to_value(
            &default_settings,
        )
        .and_then(serde_yaml::from_value)
        .map_err(|err| ConfigError::Foreign(Box::new(err)))?;

        for (k1, inner) in &defaults {
            for (k2, v) in inner {
                match v {
                    DynamicConfVal::String(v) => {
                        s = s.set_default(format!("{k1}.{k2}"), v.as_str())?;
                    }

                    DynamicConfVal::Bool(v) => {
                        s = s.set_default(format!("{k1}.{k2}"), v.to_string())?;
                    }

                    DynamicConfVal::U16(v) => {
                        s = s.set_default(format!("{k1}.{k2}"), v.to_string())?;
                    }

                    DynamicConfVal::U64(v) => {
                        s = s.set_default(format!("{k1}.{k2}"), v.to_string())?;
                    }

                    DynamicConfVal::Option(v) => {
                        if let Some(v) = v {
                            s = s.set_default(format!("{k1}.{k2}"), v.as_str())?;
                        }
                    }
                }
            }
        }

        // Make sure to list these in order
        let settings_modules: Vec<_> = vec![
            Backend::FIELD_NAMES_AS_ARRAY,
            Bridge::FIELD_NAMES_AS_ARRAY,
            Tracker::FIELD_NAMES_AS_ARRAY,
            App::FIELD_NAMES_AS_ARRAY,
        ];

        // Gather all possible settings keys
        let possible_keys: HashMap<String, (&str, &str)> = Settings::FIELD_NAMES_AS_ARRAY
            .iter()
            .enumerate()
            .flat_map(|(i, field)| {
                settings_modules[i].iter().map(move |nested| {
                    (
                        format!(
                            "{}_{}_{}",
                            ENV_PREFIX,
                            field,
                            nested.split('_').collect::<Vec<_>>().join("")
                        ),
                        (*field, *nested),
                    )
                })
            })
            .collect();

        // Parse env vars manually and set overrides if they exist as the
        // config package `Environment` module seems to behave poorly.
        for (k, v) in env_source.iter() {
            if let Some((section, field)) = possible_keys.get(&k.to_lowercase()) {
                // Filter empty values
                if v.as_str() == "" {
                    continue;
                }

                s = s.set_override(format!("{section}.{field}"), v.as_str())?;
            }
        }

        let settings: Settings = s.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects combinations that would make the process misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracker.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "tracker.poll_interval_secs must be at least 1".to_owned(),
            ));
        }

        if self.tracker.min_confirmations == 0 {
            return Err(ConfigError::Message(
                "tracker.min_confirmations must be at least 1".to_owned(),
            ));
        }

        if self.bridge.enabled && self.bridge.password.is_empty() {
            return Err(ConfigError::Message(
                "bridge.password must be set when the bridge is enabled".to_owned(),
            ));
        }

        Ok(())
    }

    /// Directory holding preferences and other application state.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.app.data_dir)
    }
}

fn write_default_config(config_path: &Path) {
    let settings_str = match toml::ser::to_string_pretty(&Settings::default()) {
        Ok(settings_str) => settings_str,
        Err(err) => {
            error!("Failed to serialize default configuration! Reason: {:#?}", err);
            return;
        }
    };

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).unwrap_or(());
    }

    // Create configuration file
    match FsFile::create(config_path) {
        Ok(mut file) => {
            file.write_all(settings_str.as_bytes()).unwrap_or(());
        }
        Err(err) => {
            // If this fails, do nothing and fall back to envionment variables
            error!("Failed to create configuration! Reason: {:#?}", err);
        }
    }
}

fn default_app_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(std::env::temp_dir);
    path.push(APP_DIR);
    path
}

#[derive(Debug, Clone, Serialize, Deserialize, FieldNamesAsArray)]
pub struct Backend {
    /// Wallet daemon RPC host.
    #[serde(alias = "rpchost")]
    pub rpc_host: String,

    /// Wallet daemon RPC port.
    #[serde(alias = "rpcport")]
    pub rpc_port: u16,

    /// Wallet daemon RPC username.
    #[serde(alias = "rpcusername")]
    pub rpc_username: String,

    /// Wallet daemon RPC password.
    #[serde(alias = "rpcpassword")]
    pub rpc_password: String,

    /// Timeout of a single RPC request in seconds.
    #[serde(alias = "requesttimeoutsecs")]
    pub request_timeout_secs: u64,

    /// Chain the daemon runs, used to pick the root currency.
    #[serde(alias = "chainid")]
    pub chain_id: String,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            rpc_host: "127.0.0.1".to_owned(),
            rpc_port: 18843,
            rpc_username: "user".to_owned(),
            rpc_password: String::new(),
            request_timeout_secs: 30,
            chain_id: "verus-testnet".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FieldNamesAsArray)]
pub struct Bridge {
    /// Serve the invoke bridge.
    #[serde(alias = "enabled")]
    pub enabled: bool,

    /// Bridge listen port. The bridge only listens on localhost.
    #[serde(alias = "listenport")]
    pub listen_port: u16,

    /// Bridge username.
    #[serde(alias = "username")]
    pub username: String,

    /// Bridge password.
    #[serde(alias = "password")]
    pub password: String,

    /// Number of runtime worker threads.
    ///
    /// Default is 0 which means the number of cores of the system
    #[serde(alias = "threads")]
    pub threads: u16,

    /// Seconds a tracker session may go unread by the UI before it is
    /// cancelled and dropped. 0 keeps sessions until they are closed.
    #[serde(alias = "sessionidlesecs")]
    pub session_idle_secs: u64,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_port: 8067,
            username: "idwallet".to_owned(),
            password: hex::encode(rand::thread_rng().gen::<[u8; 16]>()),
            threads: 0,
            session_idle_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FieldNamesAsArray)]
pub struct Tracker {
    /// Seconds between readiness checks.
    #[serde(alias = "pollintervalsecs")]
    pub poll_interval_secs: u64,

    /// How long to wait for a transaction to confirm.
    #[serde(alias = "confirmationtimeoutsecs")]
    pub confirmation_timeout_secs: u64,

    /// How long to wait for a registered identity to appear.
    #[serde(alias = "identitytimeoutsecs")]
    pub identity_timeout_secs: u64,

    /// How long to wait for a conversion or incoming funds.
    ///
    /// 0 means wait until cancelled.
    #[serde(alias = "conversiontimeoutsecs")]
    pub conversion_timeout_secs: u64,

    /// Confirmations after which a transaction counts as mined.
    #[serde(alias = "minconfirmations")]
    pub min_confirmations: u64,
}

impl Default for Tracker {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            confirmation_timeout_secs: 30 * 60,
            identity_timeout_secs: 30 * 60,
            conversion_timeout_secs: 30 * 60,
            min_confirmations: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FieldNamesAsArray)]
pub struct App {
    /// Application data directory
    #[serde(alias = "datadir")]
    pub data_dir: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            data_dir: default_app_dir().to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum DynamicConfVal {
    String(String),
    Option(Option<String>),
    Bool(bool),
    U16(u16),
    U64(u64),
}

use serde::Serialize;
use std::path::PathBuf;

use crate::hex::{is_valid_hex, is_valid_id_hex, ID_HEX_LEN};
use crate::size::{DEFAULT_MAX_FILE_SIZE_MIB, DEFAULT_NUM_UNITS, MAX_FILE_SIZE_LIMIT_MIB};

pub const ATX_FORMAT_ERROR: &str = "ATX ID must be a 64-character hexadecimal string";

/// Where the commitment ATX id comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AtxIdSource {
    Api,
    Manual,
}

/// How the node identity is passed to postcli.
///
/// At most one of key file or manual key can be in use; `New` lets postcli
/// create a fresh identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    #[default]
    New,
    PublicKey(String),
    File {
        path: PathBuf,
        /// Public key loaded from the file, if it could be read
        public_key: Option<String>,
    },
}

impl Identity {
    pub fn public_key(&self) -> Option<&str> {
        match self {
            Identity::New => None,
            Identity::PublicKey(key) => Some(key),
            Identity::File { public_key, .. } => public_key.as_deref(),
        }
    }
}

/// The `{numUnits, maxFileSize}` pair the progress parser needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosSettings {
    pub num_units: u32,
    pub max_file_size_mib: u64,
}

/// User configuration for one generation run.
///
/// Snapshots are immutable: every change goes through [`Settings::apply`],
/// which returns a new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub provider: Option<u32>,
    pub provider_model: Option<String>,
    /// Custom directory chosen by the user; `None` means postcli's default
    pub selected_dir: Option<PathBuf>,
    pub default_dir: Option<PathBuf>,
    pub num_units: Option<u32>,
    pub max_file_size_mib: u64,
    pub identity: Identity,
    pub atx_id: Option<String>,
    pub atx_id_source: AtxIdSource,
    pub atx_id_error: Option<String>,
    pub atx_id_fetching: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: None,
            provider_model: None,
            selected_dir: None,
            default_dir: None,
            num_units: Some(DEFAULT_NUM_UNITS),
            max_file_size_mib: DEFAULT_MAX_FILE_SIZE_MIB,
            identity: Identity::New,
            atx_id: None,
            atx_id_source: AtxIdSource::Api,
            atx_id_error: None,
            atx_id_fetching: false,
        }
    }
}

/// Values adopted from an existing `postdata_metadata.json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSettings {
    pub atx_id: Option<String>,
    pub public_key: Option<String>,
    pub num_units: u32,
    pub max_file_size_mib: u64,
}

/// One change to a [`Settings`] snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsUpdate {
    SetProvider { id: u32, model: Option<String> },
    SetNumUnits(u32),
    SetMaxFileSize(u64),
    SetDirectory(Option<PathBuf>),
    SetDefaultDirectory(PathBuf),
    SetPublicKey(String),
    SetIdentityFile { path: PathBuf, public_key: Option<String> },
    ClearIdentity,
    /// Raw text typed by the user as ATX id
    ManualAtxId(String),
    AtxFetchStarted,
    AtxFetched(String),
    AtxFetchFailed(String),
    LoadMetadata(MetadataSettings),
}

impl Settings {
    pub fn apply(&self, update: SettingsUpdate) -> Settings {
        let mut next = self.clone();
        match update {
            SettingsUpdate::SetProvider { id, model } => {
                next.provider = Some(id);
                next.provider_model = model;
            }
            SettingsUpdate::SetNumUnits(units) => next.num_units = Some(units),
            SettingsUpdate::SetMaxFileSize(mib) => next.max_file_size_mib = mib,
            SettingsUpdate::SetDirectory(dir) => next.selected_dir = dir,
            SettingsUpdate::SetDefaultDirectory(dir) => next.default_dir = Some(dir),
            SettingsUpdate::SetPublicKey(key) => {
                next.identity = if key.is_empty() {
                    Identity::New
                } else {
                    Identity::PublicKey(key)
                };
            }
            SettingsUpdate::SetIdentityFile { path, public_key } => {
                next.identity = Identity::File { path, public_key };
            }
            SettingsUpdate::ClearIdentity => next.identity = Identity::New,
            SettingsUpdate::ManualAtxId(input) => {
                let input = input.trim();
                if input.is_empty() {
                    next.atx_id = None;
                    next.atx_id_source = AtxIdSource::Api;
                    next.atx_id_error = None;
                } else if is_valid_id_hex(input) {
                    next.atx_id = Some(input.to_lowercase());
                    next.atx_id_source = AtxIdSource::Manual;
                    next.atx_id_error = None;
                } else {
                    next.atx_id = None;
                    next.atx_id_source = AtxIdSource::Manual;
                    next.atx_id_error = Some(ATX_FORMAT_ERROR.to_string());
                }
                next.atx_id_fetching = false;
            }
            SettingsUpdate::AtxFetchStarted => {
                next.atx_id = None;
                next.atx_id_source = AtxIdSource::Api;
                next.atx_id_error = None;
                next.atx_id_fetching = true;
            }
            SettingsUpdate::AtxFetched(id) => {
                // A manual entry made while the request was in flight wins
                if self.atx_id_fetching && self.atx_id_source == AtxIdSource::Api {
                    next.atx_id = Some(id.to_lowercase());
                    next.atx_id_error = None;
                    next.atx_id_fetching = false;
                }
            }
            SettingsUpdate::AtxFetchFailed(message) => {
                if self.atx_id_source == AtxIdSource::Api {
                    next.atx_id_error = Some(format!("Failed to fetch ATX ID: {message}"));
                }
                next.atx_id_fetching = false;
            }
            SettingsUpdate::LoadMetadata(meta) => {
                next.num_units = Some(meta.num_units);
                next.max_file_size_mib = meta.max_file_size_mib;
                if let Some(atx) = meta.atx_id {
                    next.atx_id = Some(atx.to_lowercase());
                    next.atx_id_source = AtxIdSource::Manual;
                    next.atx_id_error = None;
                    next.atx_id_fetching = false;
                }
                if let Some(key) = meta.public_key {
                    next.identity = Identity::PublicKey(key);
                }
            }
        }
        next
    }

    pub fn pos_settings(&self) -> PosSettings {
        PosSettings {
            num_units: self.num_units.unwrap_or(DEFAULT_NUM_UNITS),
            max_file_size_mib: self.max_file_size_mib,
        }
    }

    /// Directory postcli will write into
    pub fn effective_dir(&self) -> Option<&PathBuf> {
        self.selected_dir.as_ref().or(self.default_dir.as_ref())
    }
}

/// Every reason the settings cannot start a run, in a stable order.
/// An empty list means generation may start.
pub fn validate(settings: &Settings) -> Vec<String> {
    let mut errors = Vec::new();

    if settings.provider.is_none() {
        errors.push("Provider must be selected".to_string());
    }

    match settings.num_units {
        Some(units) if units >= DEFAULT_NUM_UNITS => {}
        _ => errors.push(format!("Number of units must be at least {DEFAULT_NUM_UNITS}")),
    }

    if let Some(key) = settings.identity.public_key() {
        if !is_valid_hex(key, Some(ID_HEX_LEN)) {
            errors.push("Invalid public key format".to_string());
        }
    }

    let atx_id = settings.atx_id.as_deref().filter(|id| !id.is_empty());
    match (settings.atx_id_source, atx_id) {
        (AtxIdSource::Api, None) if settings.atx_id_error.is_none() => {
            errors.push("Waiting for ATX ID to be fetched...".to_string());
        }
        (AtxIdSource::Manual, None) if settings.atx_id_error.is_none() => {
            errors.push("ATX ID is required".to_string());
        }
        (_, Some(id)) if !is_valid_id_hex(id) => errors.push(ATX_FORMAT_ERROR.to_string()),
        _ => {}
    }

    if let Some(error) = &settings.atx_id_error {
        errors.push(error.clone());
    }

    if let Some(dir) = &settings.selected_dir {
        if dir.as_os_str().to_string_lossy().trim().is_empty() {
            errors.push("Selected directory cannot be empty".to_string());
        }
    }

    if settings.max_file_size_mib == 0 || settings.max_file_size_mib > MAX_FILE_SIZE_LIMIT_MIB {
        errors.push(format!(
            "Max file size must be between 1 and {MAX_FILE_SIZE_LIMIT_MIB} MiB"
        ));
    }

    errors
}

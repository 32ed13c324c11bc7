// Settings adoption from an existing postdata_metadata.json

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::datadir::METADATA_FILE_NAME;
use crate::error::MetadataError;
use crate::hex::base64_to_hex;
use crate::settings::{MetadataSettings, Settings};
use crate::size::{DEFAULT_LABELS_PER_UNIT, MIB_TO_BYTES};

/// The fields of the metadata file written by postcli
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PosMetadata {
    pub node_id: Option<String>,
    pub commitment_atx_id: Option<String>,
    pub labels_per_unit: u64,
    pub num_units: u32,
    pub max_file_size: u64,
    #[serde(default)]
    pub nonce: Option<u64>,
}

pub fn metadata_path(dir: &Path) -> PathBuf {
    dir.join(METADATA_FILE_NAME)
}

/// Read the metadata file in `dir`; `Ok(None)` when there is none
pub fn read_metadata(dir: &Path) -> Result<Option<PosMetadata>, MetadataError> {
    let path = metadata_path(dir);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No metadata file in {}", dir.display());
            return Ok(None);
        }
        Err(source) => return Err(MetadataError::Io { path, source }),
    };
    let metadata = serde_json::from_str(&raw).map_err(|source| MetadataError::Parse { path, source })?;
    Ok(Some(metadata))
}

impl PosMetadata {
    /// Convert to the values a settings snapshot can adopt
    pub fn to_settings(&self) -> Result<MetadataSettings, MetadataError> {
        if self.labels_per_unit != DEFAULT_LABELS_PER_UNIT {
            return Err(MetadataError::LabelsPerUnitMismatch {
                got: self.labels_per_unit,
                expected: DEFAULT_LABELS_PER_UNIT,
            });
        }
        let atx_id = decode_field(self.commitment_atx_id.as_deref(), "CommitmentAtxId")?;
        let public_key = decode_field(self.node_id.as_deref(), "NodeId")?;
        Ok(MetadataSettings {
            atx_id,
            public_key,
            num_units: self.num_units,
            max_file_size_mib: self.max_file_size / MIB_TO_BYTES,
        })
    }

    /// True when `settings` already carries these values
    pub fn matches(&self, settings: &Settings) -> bool {
        let Ok(meta) = self.to_settings() else {
            return false;
        };
        settings.atx_id == meta.atx_id
            && settings.identity.public_key() == meta.public_key.as_deref()
            && settings.num_units == Some(meta.num_units)
            && settings.max_file_size_mib == meta.max_file_size_mib
    }
}

fn decode_field(value: Option<&str>, field: &'static str) -> Result<Option<String>, MetadataError> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => base64_to_hex(v)
            .map(Some)
            .ok_or(MetadataError::InvalidEncoding { field }),
    }
}

/// Read `dir`'s metadata and turn it into a settings update
pub fn load_metadata_settings(dir: &Path) -> Result<Option<MetadataSettings>, MetadataError> {
    match read_metadata(dir)? {
        Some(metadata) => {
            let settings = metadata.to_settings()?;
            info!(
                num_units = settings.num_units,
                max_file_size_mib = settings.max_file_size_mib,
                "Found existing metadata in {}",
                dir.display()
            );
            Ok(Some(settings))
        }
        None => Ok(None),
    }
}

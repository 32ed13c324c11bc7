// postcli argument vector from a settings snapshot

use crate::hex::is_valid_id_hex;
use crate::settings::{AtxIdSource, Settings};
use crate::size::{DEFAULT_LABELS_PER_UNIT, DEFAULT_NUM_UNITS, MIB_TO_BYTES};

/// Build the postcli arguments for `settings`.
///
/// Returns `None` while the ATX id is not usable: still pending from the API,
/// missing or invalid when entered manually, or when a fetch error is recorded.
/// Callers must not launch in that case.
pub fn build_args(settings: &Settings) -> Option<Vec<String>> {
    if settings.atx_id_error.is_some() {
        return None;
    }
    let atx_id = match (settings.atx_id_source, settings.atx_id.as_deref()) {
        (_, None) | (_, Some("")) => return None,
        (AtxIdSource::Manual, Some(id)) if !is_valid_id_hex(id) => return None,
        (_, Some(id)) => id,
    };

    let mut args = vec![
        format!("-provider={}", settings.provider.unwrap_or(0)),
        format!("-numUnits={}", settings.num_units.unwrap_or(DEFAULT_NUM_UNITS)),
        format!("-commitmentAtxId={atx_id}"),
    ];

    if let Some(key) = settings.identity.public_key() {
        if is_valid_id_hex(key) {
            args.push(format!("-id={}", key.to_lowercase()));
        }
    }

    if let Some(dir) = &settings.selected_dir {
        let dir = dir.to_string_lossy();
        if !dir.trim().is_empty() {
            args.push(format!("-datadir={dir}"));
        }
    }

    if settings.max_file_size_mib > 0 {
        args.push(format!("-maxFileSize={}", settings.max_file_size_mib * MIB_TO_BYTES));
    }

    args.push(format!("-labelsPerUnit={DEFAULT_LABELS_PER_UNIT}"));
    args.push("-yes".to_string());

    Some(args)
}

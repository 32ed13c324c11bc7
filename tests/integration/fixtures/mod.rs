// Sample postcli output lines as they arrive from the process

#![allow(dead_code)]

pub const STARTING_FILE_0: &str = r#"2024-12-17T22:30:01.112+0100	INFO	initialization: starting to write file	{"fileIndex": 0, "currentNumLabels": 0, "targetNumLabels": 268435456, "startPosition": 0}"#;

pub const COMPLETED_FILE_0: &str =
    r#"2024-12-17T22:34:57.991+0100	INFO	initialization: completed	{"fileIndex": 0, "numLabelsWritten": 268435456}"#;

pub const STARTING_FILE_1: &str = r#"2024-12-17T22:34:58.003+0100	INFO	initialization: starting to write file	{"fileIndex": 1, "currentNumLabels": 0, "targetNumLabels": 268435456, "startPosition": 268435456}"#;

pub const ALREADY_INITIALIZED_FILE_1: &str =
    r#"2024-12-17T22:34:58.010+0100	INFO	initialization: file already initialized	{"fileIndex": 1}"#;

pub const RUN_COMPLETED: &str = "2024-12-17T23:01:12.400+0100	INFO	cli: initialization completed";

pub const FOUND_NONCE: &str =
    r#"2024-12-17T23:01:12.398+0100	INFO	initialization: completed, found nonce	{"nonce": 1337}"#;

pub const WRITE_ERROR: &str = "ERROR: Failed to write file";

pub const ATX_MISMATCH: &str =
    "WARNING: existing commitmentAtxId differs, cannot proceed. Aborting";

pub const NOISE: &str = "2024-12-17T22:30:00.001+0100	INFO	cli: opening data directory";

/// Settings that the samples above correspond to: 4 units of 4096 MiB files
pub const NUM_UNITS: u32 = 4;
pub const MAX_FILE_SIZE_MIB: u64 = 4096;
pub const TOTAL_FILES: u64 = 64;

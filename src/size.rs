// Size constants and calculations shared by the parser, the validator and the CLI

/// Minimum (and default) number of space units
pub const DEFAULT_NUM_UNITS: u32 = 4;

/// Default maximum size of one data file in MiB (4 GiB)
pub const DEFAULT_MAX_FILE_SIZE_MIB: u64 = 4096;

/// Upper bound accepted for the max file size setting
pub const MAX_FILE_SIZE_LIMIT_MIB: u64 = DEFAULT_MAX_FILE_SIZE_MIB * 2;

/// Labels per space unit passed to postcli
pub const DEFAULT_LABELS_PER_UNIT: u64 = 1 << 32;

/// Size of one label in bits
pub const BITS_PER_LABEL: u64 = 128;

/// Size of one space unit in GiB
pub const UNIT_SIZE_GIB: u64 = 64;

/// Bytes in one MiB
pub const MIB_TO_BYTES: u64 = 1_048_576;

const GIB_TO_BYTES: u64 = 1 << 30;

/// Hours between PoST cycles on the network
pub const CYCLE_GAP_HOURS: u64 = 12;

/// Fraction of the cycle gap we allow initialization to take
pub const K_SAFE_PERIOD: f64 = 0.7;

const SIZE_UNITS: [&str; 6] = ["GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// Bytes covered by one space unit for the given labels-per-unit value
pub fn size_per_unit(labels_per_unit: u64) -> u64 {
    labels_per_unit * BITS_PER_LABEL / 8
}

/// Number of `postdata_<n>.bin` files postcli writes for these settings.
///
/// `ceil(num_units * 64 GiB in MiB / max_file_size_mib)`; zero when the max
/// file size is zero.
pub fn calculate_num_files(num_units: u32, max_file_size_mib: u64) -> u64 {
    if max_file_size_mib == 0 {
        return 0;
    }
    // per-unit MiB first: any u32 unit count times 64 GiB in MiB fits a u64
    let unit_mib = size_per_unit(DEFAULT_LABELS_PER_UNIT) / MIB_TO_BYTES;
    (u64::from(num_units) * unit_mib).div_ceil(max_file_size_mib)
}

/// Format a GiB quantity with the largest binary unit that keeps it below 1024
pub fn format_size_gib(size_gib: f64) -> String {
    let mut size = size_gib;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }
    format!("{:.1} {}", size, SIZE_UNITS[unit_index])
}

/// Human-readable byte count (B up to TiB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }
    format!("{:.1} {}", size, UNITS[unit_index])
}

/// Total generated size for `num_units`, e.g. "256.0 GiB" for 4 units
pub fn calculate_total_size(num_units: u32) -> String {
    let unit_gib = size_per_unit(DEFAULT_LABELS_PER_UNIT) / GIB_TO_BYTES;
    format_size_gib((u64::from(num_units) * unit_gib) as f64)
}

/// Largest amount of data (bytes) a provider running at `speed_gib_s` can
/// initialize within the safe part of one cycle gap
pub fn calculate_max_data_size(speed_gib_s: f64) -> u64 {
    let cycle_gap_seconds = (CYCLE_GAP_HOURS * 3600) as f64;
    let speed_bytes = speed_gib_s * GIB_TO_BYTES as f64;
    (speed_bytes * cycle_gap_seconds * K_SAFE_PERIOD).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_is_64_gib() {
        assert_eq!(size_per_unit(DEFAULT_LABELS_PER_UNIT), UNIT_SIZE_GIB * GIB_TO_BYTES);
    }

    #[test]
    fn test_num_files() {
        assert_eq!(calculate_num_files(100, 1000), 6554);
        assert_eq!(calculate_num_files(4, 4096), 64);
        assert_eq!(calculate_num_files(4, 5000), 53);
        assert_eq!(calculate_num_files(4, 0), 0);
    }

    #[test]
    fn test_huge_unit_counts() {
        assert_eq!(calculate_num_files(300_000_000, 4096), 4_800_000_000);
        assert_eq!(calculate_num_files(u32::MAX, 1), u64::from(u32::MAX) * 65_536);
        assert_eq!(calculate_total_size(300_000_000), "17.9 EiB");
        assert_eq!(calculate_total_size(u32::MAX), "256.0 ZiB");
    }

    #[test]
    fn test_total_size_formatting() {
        assert_eq!(calculate_total_size(4), "256.0 GiB");
        assert_eq!(calculate_total_size(16), "1.0 TiB");
        assert_eq!(calculate_total_size(24), "1.5 TiB");
        assert_eq!(format_size_gib(512.0), "512.0 GiB");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.0 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(4096 * MIB_TO_BYTES), "4.0 GiB");
    }

    #[test]
    fn test_max_data_size() {
        // 1 GiB/s for 12h at 70%
        let expected = 30_240 * GIB_TO_BYTES;
        assert!(calculate_max_data_size(1.0).abs_diff(expected) <= 1);
        assert_eq!(calculate_max_data_size(0.0), 0);
    }
}

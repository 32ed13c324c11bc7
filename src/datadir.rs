use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const METADATA_FILE_NAME: &str = "postdata_metadata.json";

const POST_FILE_PREFIX: &str = "postdata_";
const POST_FILE_SUFFIX: &str = ".bin";

/// `~/post/data`, the directory postcli uses when no `-datadir` is given
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("post").join("data"))
}

/// Path of the data file with the given index
pub fn post_file_path(dir: &Path, file_index: u32) -> PathBuf {
    dir.join(format!("{POST_FILE_PREFIX}{file_index}{POST_FILE_SUFFIX}"))
}

/// Extract the index from a `postdata_<n>.bin` file name
pub fn parse_post_file_index(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(POST_FILE_PREFIX)?
        .strip_suffix(POST_FILE_SUFFIX)?
        .parse()
        .ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostFile {
    pub index: u32,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// List the data files directly inside `dir`, ordered by index
pub fn scan_post_files(dir: &Path) -> Result<Vec<PostFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(index) = entry.file_name().to_str().and_then(parse_post_file_index) else {
            continue;
        };
        let size_bytes = entry.metadata()?.len();
        files.push(PostFile { index, path: entry.into_path(), size_bytes });
    }
    files.sort_by_key(|f| f.index);
    debug!("Found {} data files in {}", files.len(), dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_post_file_path() {
        let path = post_file_path(Path::new("/data"), 12);
        assert_eq!(path, PathBuf::from("/data/postdata_12.bin"));
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_post_file_index("postdata_0.bin"), Some(0));
        assert_eq!(parse_post_file_index("postdata_31.bin"), Some(31));
        assert_eq!(parse_post_file_index("postdata_x.bin"), None);
        assert_eq!(parse_post_file_index(METADATA_FILE_NAME), None);
    }

    #[test]
    fn test_scan_sorts_by_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("postdata_10.bin"), vec![0u8; 3]).unwrap();
        std::fs::write(dir.path().join("postdata_2.bin"), vec![0u8; 5]).unwrap();
        std::fs::write(dir.path().join(METADATA_FILE_NAME), "{}").unwrap();
        std::fs::create_dir(dir.path().join("postdata_3.bin")).unwrap();

        let files = scan_post_files(dir.path()).unwrap();
        let indexes: Vec<u32> = files.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![2, 10]);
        assert_eq!(files[0].size_bytes, 5);
    }

    #[test]
    fn test_scan_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        assert!(scan_post_files(&dir.path().join("nope")).is_err());
    }
}

use blake3::Hasher;
use remod_graph::FileMetadata;
use serde_json::Value;

/// Bumped whenever generated output changes shape for identical input.
const OUTPUT_FORMAT_VERSION: u32 = 1;

const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Stat-based checksum of a source file.
pub fn source_checksum(meta: &FileMetadata) -> String {
    let mut hasher = Hasher::new();
    hasher.update(&meta.size.to_le_bytes());
    hasher.update(&meta.modified.unwrap_or_default().to_le_bytes());
    hasher.update(&meta.changed.unwrap_or_default().to_le_bytes());
    hasher.update(&meta.inode.unwrap_or_default().to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Checksum of everything besides the source that shapes a resource's output.
pub fn options_checksum(fingerprint: &Value, pipeline: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(&OUTPUT_FORMAT_VERSION.to_le_bytes());
    hasher.update(CRATE_VERSION.as_bytes());
    hasher.update(pipeline.as_bytes());
    hasher.update(&[0]);
    // serde_json keeps object keys sorted, so the encoding is stable.
    hasher.update(fingerprint.to_string().as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(size: u64, modified: u128) -> FileMetadata {
        FileMetadata {
            size,
            is_dir: false,
            is_file: true,
            modified: Some(modified),
            changed: Some(modified as i128),
            inode: Some(7),
        }
    }

    #[test]
    fn source_checksum_follows_stat() {
        assert_eq!(source_checksum(&meta(10, 1)), source_checksum(&meta(10, 1)));
        assert_ne!(source_checksum(&meta(10, 1)), source_checksum(&meta(11, 1)));
        assert_ne!(source_checksum(&meta(10, 1)), source_checksum(&meta(10, 2)));
    }

    #[test]
    fn options_checksum_covers_pipeline_and_fingerprint() {
        let a = json!({ "strict": false });
        let b = json!({ "strict": true });
        assert_eq!(options_checksum(&a, "script"), options_checksum(&a, "script"));
        assert_ne!(options_checksum(&a, "script"), options_checksum(&a, "css"));
        assert_ne!(options_checksum(&a, "script"), options_checksum(&b, "script"));
    }
}

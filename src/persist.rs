//! Shared on-disk JSON helpers.
//!
//! Factors out the two cross-cutting concerns every on-disk record shares:
//! optional transparent gzip compression (the `.gz` suffix) and the
//! `version: 1` fatal-mismatch check.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// On-disk format version every JSON record must carry.
pub const FORMAT_VERSION: u32 = 1;

/// I/O or serialization failure while reading/writing a JSON record.
/// Each component maps this into its own error enum's `Io`/`Serde` variants.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// `serde_json` (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Returns `base` with a `.gz` suffix appended when `use_compression` is set.
#[must_use]
pub fn json_path(base: &Path, use_compression: bool) -> PathBuf {
    if use_compression {
        let mut name = base.as_os_str().to_owned();
        name.push(".gz");
        PathBuf::from(name)
    } else {
        base.to_path_buf()
    }
}

/// Serializes `value` as JSON to `base` (optionally gzip-compressed),
/// creating parent directories as needed and removing a stale sibling file
/// left over from a prior save under the opposite compression setting.
pub fn write_json<T: Serialize>(
    base: &Path,
    value: &T,
    use_compression: bool,
) -> Result<(), PersistError> {
    if let Some(parent) = base.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let path = json_path(base, use_compression);
    let file = File::create(&path)?;
    if use_compression {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, value)?;
        encoder.finish()?;
    } else {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    let stale = json_path(base, !use_compression);
    if stale.exists() {
        let _ = std::fs::remove_file(stale);
    }
    Ok(())
}

/// Reads and deserializes a JSON record previously written by
/// [`write_json`]. Tries the compressed path first when `use_compression`
/// is set, then falls back to the uncompressed path (a partition may have
/// been created before compression was turned on). Returns `Ok(None)` if
/// neither file exists — a missing file is never an error.
pub fn read_json<T: DeserializeOwned>(
    base: &Path,
    use_compression: bool,
) -> Result<Option<T>, PersistError> {
    let primary = json_path(base, use_compression);
    let fallback = json_path(base, !use_compression);
    let path = if primary.exists() {
        primary
    } else if fallback.exists() {
        fallback
    } else {
        return Ok(None);
    };

    let compressed = path.extension().is_some_and(|ext| ext == "gz");
    let file = File::open(&path)?;
    let value = if compressed {
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let mut buf = String::new();
        decoder.read_to_string(&mut buf)?;
        serde_json::from_str(&buf)?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    Ok(Some(value))
}

/// Writes a raw little-endian `f32` payload (the `vec.bin` format) and
/// returns its CRC32.
pub fn write_vec_bin(path: &Path, floats: &[f32]) -> io::Result<u32> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes: &[u8] = bytemuck::cast_slice(floats);
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(bytes)?;
    file.flush()?;
    Ok(crc32fast::hash(bytes))
}

/// Reads a raw little-endian `f32` payload back, returning the floats and
/// their CRC32 for the caller to compare against the recorded checksum.
pub fn read_vec_bin(path: &Path) -> io::Result<(Vec<f32>, u32)> {
    let mut file = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let checksum = crc32fast::hash(&bytes);
    let floats = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok((floats, checksum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        version: u32,
        value: String,
    }

    #[test]
    fn json_roundtrip_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("thing.json");
        let value = Sample {
            version: FORMAT_VERSION,
            value: "hello".into(),
        };
        write_json(&base, &value, false).unwrap();
        let loaded: Option<Sample> = read_json(&base, false).unwrap();
        assert_eq!(loaded, Some(value));
    }

    #[test]
    fn json_roundtrip_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("thing.json");
        let value = Sample {
            version: FORMAT_VERSION,
            value: "compressed".into(),
        };
        write_json(&base, &value, true).unwrap();
        assert!(dir.path().join("thing.json.gz").exists());
        assert!(!dir.path().join("thing.json").exists());
        let loaded: Option<Sample> = read_json(&base, true).unwrap();
        assert_eq!(loaded, Some(value));
    }

    #[test]
    fn missing_file_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("absent.json");
        let loaded: Option<Sample> = read_json(&base, false).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn vec_bin_roundtrip_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vec.bin");
        let floats = vec![1.0_f32, -2.5, 3.25, 0.0];
        let checksum = write_vec_bin(&path, &floats).unwrap();
        let (loaded, loaded_checksum) = read_vec_bin(&path).unwrap();
        assert_eq!(loaded, floats);
        assert_eq!(loaded_checksum, checksum);
    }
}

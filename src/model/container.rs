//! Single-file binary container for a [`TrainedModel`].
//!
//! Layout, all integers little-endian:
//!
//! | bytes | field |
//! |---|---|
//! | 8 | magic `QPRMODL1` |
//! | 4 | container version |
//! | 4 | header length |
//! | 8 | payload length |
//! | 32 | SHA-256 of the payload |
//! | n | JSON-encoded model |

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::TrainedModel;

const MODEL_MAGIC: &[u8; 8] = b"QPRMODL1";
const MODEL_CONTAINER_VERSION: u32 = 1;
const MODEL_CHECKSUM_LEN: usize = 32;
const MODEL_HEADER_LEN: usize = 8 + 4 + 4 + 8 + MODEL_CHECKSUM_LEN;

/// Failures reading or writing a model file.
#[derive(Debug, Error)]
pub enum ModelIoError {
    #[error("Model file not found at {path}")]
    Missing { path: PathBuf },
    #[error("Failed to read model file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to write model file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("Model stream error: {0}")]
    Stream(#[from] io::Error),
    #[error("Not a model file (magic mismatch)")]
    BadMagic,
    #[error("Unsupported model container version {0}")]
    UnsupportedVersion(u32),
    #[error("Model header length mismatch: {0}")]
    HeaderLength(u32),
    #[error("Model file truncated: expected {expected} payload bytes, found {found}")]
    Truncated { expected: u64, found: u64 },
    #[error("Model file has trailing bytes after the payload")]
    TrailingData,
    #[error("Model checksum mismatch")]
    ChecksumMismatch,
    #[error("Failed to decode model payload: {0}")]
    Decode(serde_json::Error),
    #[error("Failed to encode model payload: {0}")]
    Encode(serde_json::Error),
    #[error("Invalid model: {0}")]
    Invalid(String),
}

/// Serialize `model` into `writer`; invalid models are refused before any byte is written.
pub fn write_model(mut writer: impl Write, model: &TrainedModel) -> Result<(), ModelIoError> {
    model.validate()?;
    let payload = serde_json::to_vec(model).map_err(ModelIoError::Encode)?;
    let checksum: [u8; MODEL_CHECKSUM_LEN] = Sha256::digest(&payload).into();
    writer.write_all(&build_header_bytes(payload.len() as u64, &checksum))?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read and verify a model from `reader`.
pub fn read_model(mut reader: impl Read) -> Result<TrainedModel, ModelIoError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode(&bytes)
}

/// Write `model` to `path` atomically: a sibling temp file is renamed over the target.
pub fn save_model(path: &Path, model: &TrainedModel) -> Result<(), ModelIoError> {
    let write_err = |source: io::Error| ModelIoError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".model")
        .tempfile_in(&dir)
        .map_err(write_err)?;
    write_model(io::BufWriter::new(temp.as_file_mut()), model).map_err(|err| match err {
        ModelIoError::Stream(source) => write_err(source),
        other => other,
    })?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|err| write_err(err.error))?;
    tracing::info!("Saved model to {}", path.display());
    Ok(())
}

/// Load and verify the model at `path`.
pub fn load_model(path: &Path) -> Result<TrainedModel, ModelIoError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ModelIoError::Missing {
            path: path.to_path_buf(),
        },
        _ => ModelIoError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let model = read_model(io::BufReader::new(file)).map_err(|err| match err {
        ModelIoError::Stream(source) => ModelIoError::Read {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    tracing::info!(
        "Loaded model from {} ({} trees, {} features)",
        path.display(),
        model.ensemble.trees.len(),
        model.meta.feature_len
    );
    Ok(model)
}

fn build_header_bytes(payload_len: u64, checksum: &[u8; MODEL_CHECKSUM_LEN]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MODEL_HEADER_LEN);
    buf.extend_from_slice(MODEL_MAGIC);
    buf.extend_from_slice(&MODEL_CONTAINER_VERSION.to_le_bytes());
    buf.extend_from_slice(&(MODEL_HEADER_LEN as u32).to_le_bytes());
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(checksum);
    buf
}

fn decode(bytes: &[u8]) -> Result<TrainedModel, ModelIoError> {
    if bytes.len() < 8 || &bytes[..8] != MODEL_MAGIC {
        return Err(ModelIoError::BadMagic);
    }
    if bytes.len() < MODEL_HEADER_LEN {
        return Err(ModelIoError::Truncated {
            expected: MODEL_HEADER_LEN as u64,
            found: bytes.len() as u64,
        });
    }
    let version = read_u32(&bytes[8..12]);
    if version != MODEL_CONTAINER_VERSION {
        return Err(ModelIoError::UnsupportedVersion(version));
    }
    let header_len = read_u32(&bytes[12..16]);
    if header_len as usize != MODEL_HEADER_LEN {
        return Err(ModelIoError::HeaderLength(header_len));
    }
    let payload_len = read_u64(&bytes[16..24]);
    let mut checksum = [0u8; MODEL_CHECKSUM_LEN];
    checksum.copy_from_slice(&bytes[24..MODEL_HEADER_LEN]);

    let payload = &bytes[MODEL_HEADER_LEN..];
    let found = payload.len() as u64;
    if found < payload_len {
        return Err(ModelIoError::Truncated {
            expected: payload_len,
            found,
        });
    }
    if found > payload_len {
        return Err(ModelIoError::TrailingData);
    }
    let actual: [u8; MODEL_CHECKSUM_LEN] = Sha256::digest(payload).into();
    if actual != checksum {
        return Err(ModelIoError::ChecksumMismatch);
    }
    let model: TrainedModel = serde_json::from_slice(payload).map_err(ModelIoError::Decode)?;
    model.validate()?;
    Ok(model)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::QueryRecord;
    use crate::features::PipelineConfig;
    use crate::ml::gbdt::{MODEL_VERSION, Tree, TreeEnsemble, TreeNode};
    use tempfile::tempdir;

    fn records() -> Vec<QueryRecord> {
        vec![
            QueryRecord::new(1, "red apple", "an apple is red", true, 1),
            QueryRecord::new(1, "red apple", "the sky is blue", false, 2),
            QueryRecord::new(2, "blue sky", "the sky is blue", true, 3),
        ]
    }

    fn sample_model() -> TrainedModel {
        let pipeline = PipelineConfig::default().fit(&records()).unwrap();
        let ensemble = TreeEnsemble {
            model_version: MODEL_VERSION,
            feature_len: pipeline.feature_dim,
            base_score: 0.123_456_79,
            trees: vec![Tree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 0,
                        threshold: 0.333_333_34,
                        left: 1,
                        right: 2,
                    },
                    TreeNode::Leaf { value: -0.1 },
                    TreeNode::Leaf { value: 0.7 },
                ],
            }],
        };
        TrainedModel::new(pipeline, ensemble, 3, Default::default()).unwrap()
    }

    #[test]
    fn save_and_load_round_trip_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("model.bin");
        let model = sample_model();
        save_model(&path, &model).unwrap();
        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded, model);
        let a = model.predict_batch(&records()).unwrap();
        let b = loaded.predict_batch(&records()).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.score.to_bits(), y.score.to_bits());
            assert_eq!(x.probability.to_bits(), y.probability.to_bits());
        }
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let dir = tempdir().unwrap();
        let err = load_model(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, ModelIoError::Missing { .. }));
    }

    #[test]
    fn corrupted_files_are_rejected() {
        let mut bytes = Vec::new();
        write_model(&mut bytes, &sample_model()).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(read_model(&bad_magic[..]), Err(ModelIoError::BadMagic)));

        let mut bad_version = bytes.clone();
        bad_version[8] = 9;
        assert!(matches!(
            read_model(&bad_version[..]),
            Err(ModelIoError::UnsupportedVersion(9))
        ));

        let truncated = &bytes[..bytes.len() - 10];
        assert!(matches!(read_model(truncated), Err(ModelIoError::Truncated { .. })));

        let mut flipped = bytes.clone();
        let last = flipped.len() - 2;
        flipped[last] ^= 0x01;
        assert!(matches!(read_model(&flipped[..]), Err(ModelIoError::ChecksumMismatch)));

        let mut trailing = bytes.clone();
        trailing.push(b'\n');
        assert!(matches!(read_model(&trailing[..]), Err(ModelIoError::TrailingData)));

        assert!(matches!(read_model(&b"QPR"[..]), Err(ModelIoError::BadMagic)));
    }

    #[test]
    fn inconsistent_payload_fails_validation() {
        let mut model = sample_model();
        model.ensemble.feature_len += 1;
        assert!(matches!(write_model(Vec::new(), &model), Err(ModelIoError::Invalid(_))));

        let payload = serde_json::to_vec(&model).unwrap();
        let checksum: [u8; MODEL_CHECKSUM_LEN] = Sha256::digest(&payload).into();
        let mut bytes = build_header_bytes(payload.len() as u64, &checksum);
        bytes.extend_from_slice(&payload);
        assert!(matches!(read_model(&bytes[..]), Err(ModelIoError::Invalid(_))));
    }

    #[test]
    fn failed_save_leaves_existing_file_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let model = sample_model();
        save_model(&path, &model).unwrap();
        let before = std::fs::read(&path).unwrap();

        let mut broken = model.clone();
        broken.ensemble.base_score = f32::NAN;
        assert!(save_model(&path, &broken).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}

//! Label store codec.
//!
//! The store is a stream of JSON objects, one [`LabelRecord`] per line and one
//! line per trained sample. Every save rewrites the whole file.

use crate::index::{ClassificationIndex, IndexError};
use crate::types::LabelRecord;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("refusing to write inconsistent store: {0}")]
    Integrity(#[from] IndexError),
    #[error("malformed store record at line {line}: {source}")]
    StrictDecode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("store i/o failed for {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize store record: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Serialize the index as newline-delimited records, after checking its
/// invariants.
pub fn encode(index: &ClassificationIndex) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    for record in index.records()? {
        serde_json::to_writer(&mut buf, &record).map_err(StoreError::Serialize)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Parse a record stream. Records carrying unknown fields are rejected.
pub fn decode<R: Read>(reader: R) -> Result<Vec<LabelRecord>, StoreError> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<LabelRecord>()
        .map(|record| {
            record.map_err(|source| StoreError::StrictDecode {
                line: source.line(),
                source,
            })
        })
        .collect()
}

/// The single on-disk location holding the record stream.
#[derive(Debug, Clone)]
pub struct LabelStore {
    path: PathBuf,
}

impl LabelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<LabelRecord>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no label store yet, starting empty");
                return Ok(Vec::new());
            }
            Err(source) => return Err(self.persistence(source)),
        };

        let records = self.read_records(io::BufReader::new(file))?;
        tracing::debug!(path = %self.path.display(), records = records.len(), "label store loaded");
        Ok(records)
    }

    /// Decode from an open store. A read failure mid-stream is an i/o
    /// problem with this path, not a malformed record.
    fn read_records<R: Read>(&self, reader: R) -> Result<Vec<LabelRecord>, StoreError> {
        decode(reader).map_err(|err| match err {
            StoreError::StrictDecode { source, .. } if source.is_io() => self.persistence(source.into()),
            other => other,
        })
    }

    /// Rewrite the store from the full index.
    pub fn save(&self, index: &ClassificationIndex) -> Result<(), StoreError> {
        let buf = encode(index)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.persistence(e))?;
        }
        fs::write(&self.path, buf).map_err(|e| self.persistence(e))?;

        tracing::debug!(path = %self.path.display(), records = index.len(), "label store saved");
        Ok(())
    }

    fn persistence(&self, source: io::Error) -> StoreError {
        StoreError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_store_path;
    use crate::types::Descriptor;

    fn record(label: &str, values: &[f32]) -> LabelRecord {
        LabelRecord {
            label: label.into(),
            descriptor: Descriptor::new(values.to_vec()),
        }
    }

    #[test]
    fn test_encode_one_record_per_line() {
        let index = ClassificationIndex::from_records(
            vec![record("Alice", &[1.0, 0.5]), record("Bob", &[0.0, -2.0])],
            1.0,
        )
        .unwrap();
        let text = String::from_utf8(encode(&index).unwrap()).unwrap();
        assert_eq!(
            text,
            "{\"label\":\"Alice\",\"descriptor\":[1.0,0.5]}\n{\"label\":\"Bob\",\"descriptor\":[0.0,-2.0]}\n"
        );
    }

    #[test]
    fn test_encode_empty_index() {
        assert!(encode(&ClassificationIndex::new(1.0)).unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_keeps_label_order() {
        let original = ClassificationIndex::from_records(
            vec![
                record("Carol", &[0.0, 1.0]),
                record("Alice", &[1.0, 0.0]),
                record("Carol", &[0.1, 0.9]),
            ],
            1.0,
        )
        .unwrap();

        let decoded = decode(encode(&original).unwrap().as_slice()).unwrap();
        let rebuilt = ClassificationIndex::from_records(decoded, 1.0).unwrap();

        assert_eq!(rebuilt.labels(), original.labels());
        assert_eq!(rebuilt.categories(), original.categories());
        assert_eq!(rebuilt.samples(), original.samples());
    }

    #[test]
    fn test_decode_accepts_concatenated_objects() {
        let input = br#"{"label":"a","descriptor":[1.0]} {"label":"b","descriptor":[2.0]}"#;
        let records = decode(&input[..]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].label, "b");
    }

    #[test]
    fn test_decode_rejects_unknown_field_with_line() {
        let input = "{\"label\":\"a\",\"descriptor\":[1.0]}\n{\"label\":\"b\",\"descriptor\":[2.0],\"name\":\"x\"}\n";
        match decode(input.as_bytes()) {
            Err(StoreError::StrictDecode { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected strict decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_missing_descriptor() {
        let input = br#"{"label":"a"}"#;
        assert!(matches!(decode(&input[..]), Err(StoreError::StrictDecode { .. })));
    }

    #[test]
    fn test_decode_overflowing_value_fails_integrity() {
        // 1e39 does not fit in an f32 and decodes to infinity.
        let records = decode(&br#"{"label":"a","descriptor":[1e39,0.0]}"#[..]).unwrap();
        let err = ClassificationIndex::from_records(records, 1.0).unwrap_err();
        assert_eq!(err, IndexError::NonFiniteDescriptor { index: 0 });
    }

    #[test]
    fn test_decode_rejects_null_component() {
        let input = br#"{"label":"a","descriptor":[null,0.0]}"#;
        assert!(matches!(decode(&input[..]), Err(StoreError::StrictDecode { .. })));
    }

    struct FailingReader {
        head: &'static [u8],
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.head.is_empty() {
                return Err(io::Error::other("device went away"));
            }
            let n = self.head.len().min(buf.len());
            buf[..n].copy_from_slice(&self.head[..n]);
            self.head = &self.head[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_read_failure_is_persistence_error() {
        let store = LabelStore::new("/var/lib/facerec/facerec.json");
        let reader = FailingReader {
            head: b"{\"label\":\"a\",\"descriptor\":[1.0]}\n{\"label\":",
        };
        match store.read_records(reader) {
            Err(StoreError::Persistence { path, source }) => {
                assert_eq!(path, store.path());
                assert_eq!(source.to_string(), "device went away");
            }
            other => panic!("expected persistence error, got {other:?}"),
        }

        // Malformed content read successfully stays a decode error.
        let err = store.read_records(&br#"{"label":"a"}"#[..]).unwrap_err();
        assert!(matches!(err, StoreError::StrictDecode { .. }));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = LabelStore::new(temp_store_path());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_store_path();
        let store = LabelStore::new(&path);
        let index = ClassificationIndex::from_records(
            vec![record("Alice", &[1.0, 0.0]), record("Bob", &[0.0, 1.0])],
            1.0,
        )
        .unwrap();

        store.save(&index).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, index.records().unwrap());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_is_full_rewrite() {
        let path = temp_store_path();
        let store = LabelStore::new(&path);

        let two = ClassificationIndex::from_records(
            vec![record("Alice", &[1.0]), record("Bob", &[2.0])],
            1.0,
        )
        .unwrap();
        store.save(&two).unwrap();

        let one = ClassificationIndex::from_records(vec![record("Carol", &[3.0])], 1.0).unwrap();
        store.save(&one).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![record("Carol", &[3.0])]);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_reports_persistence_error() {
        // A directory cannot be overwritten as a file.
        let path = temp_store_path();
        fs::create_dir_all(&path).unwrap();
        let store = LabelStore::new(&path);

        let err = store.save(&ClassificationIndex::new(1.0)).unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}

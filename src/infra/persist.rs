//! Cache storage snapshots on disk.
//!
//! The whole storage is written as one `caches.json` document. Writes go to a
//! temporary file in the same directory that is then renamed over the old
//! snapshot, so a crash mid-write leaves the previous snapshot intact.
//! Namespace creation order and entry insertion order survive a round trip.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use folio_offline_types::NamespaceSummary;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::worker::{CacheStorage, FetchResponse, RequestKey};

pub const SNAPSHOT_FILE: &str = "caches.json";
const SNAPSHOT_FORMAT: u32 = 2;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to access `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot `{path}` is not valid JSON")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode the cache snapshot")]
    Encode(#[source] serde_json::Error),
    #[error("snapshot format {found} is not supported (expected {SNAPSHOT_FORMAT})")]
    UnsupportedFormat { found: u32 },
}

impl PersistError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub format: u32,
    pub namespaces: Vec<NamespaceSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamespaceSnapshot {
    pub name: String,
    /// Oldest first.
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Header name and base64 of the raw value bytes.
    pub headers: Vec<(String, String)>,
    /// Base64 of the response body.
    pub body: String,
}

impl NamespaceSnapshot {
    /// Entry count and stored size, measured the way live namespaces measure it.
    pub fn summary(&self) -> NamespaceSummary {
        let bytes = self
            .entries
            .iter()
            .map(|entry| {
                let body = STANDARD
                    .decode(&entry.body)
                    .map(|body| body.len())
                    .unwrap_or(0);
                let headers: usize = entry
                    .headers
                    .iter()
                    .map(|(name, value)| {
                        name.len() + STANDARD.decode(value).map(|raw| raw.len()).unwrap_or(0)
                    })
                    .sum();
                (body + headers) as u64
            })
            .sum();
        NamespaceSummary {
            name: self.name.clone(),
            entries: self.entries.len(),
            bytes,
        }
    }
}

pub fn snapshot_path(directory: &Path) -> PathBuf {
    directory.join(SNAPSHOT_FILE)
}

/// Capture every namespace of `storage`.
pub fn snapshot(storage: &CacheStorage) -> Snapshot {
    let namespaces = storage
        .namespaces()
        .into_iter()
        .map(|namespace| NamespaceSnapshot {
            name: namespace.name().to_string(),
            entries: namespace
                .entries()
                .into_iter()
                .filter(|(_, response)| !response.is_error())
                .map(|(key, response)| encode_entry(&key, &response))
                .collect(),
        })
        .collect();

    Snapshot {
        format: SNAPSHOT_FORMAT,
        namespaces,
    }
}

/// Write `storage` to `directory/caches.json`. Returns the number of entries written.
pub fn save(storage: &CacheStorage, directory: &Path) -> Result<usize, PersistError> {
    let started = Instant::now();
    let snapshot = snapshot(storage);
    let entries = snapshot.namespaces.iter().map(|ns| ns.entries.len()).sum();
    let encoded = serde_json::to_vec(&snapshot).map_err(PersistError::Encode)?;

    fs::create_dir_all(directory).map_err(|err| PersistError::io(directory, err))?;
    let mut file = tempfile::Builder::new()
        .prefix(".caches")
        .suffix(".json.tmp")
        .tempfile_in(directory)
        .map_err(|err| PersistError::io(directory, err))?;
    file.write_all(&encoded)
        .and_then(|()| file.flush())
        .map_err(|err| PersistError::io(file.path(), err))?;

    let target = snapshot_path(directory);
    file.persist(&target)
        .map_err(|err| PersistError::io(&target, err.error))?;

    debug!(
        path = %target.display(),
        namespaces = snapshot.namespaces.len(),
        entries,
        bytes = encoded.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "cache snapshot written"
    );
    Ok(entries)
}

/// Read the snapshot in `directory`; `None` when there is none yet.
pub fn read(directory: &Path) -> Result<Option<Snapshot>, PersistError> {
    let path = snapshot_path(directory);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(PersistError::io(&path, err)),
    };
    let snapshot: Snapshot =
        serde_json::from_slice(&raw).map_err(|source| PersistError::Decode { path, source })?;
    if snapshot.format != SNAPSHOT_FORMAT {
        return Err(PersistError::UnsupportedFormat {
            found: snapshot.format,
        });
    }
    Ok(Some(snapshot))
}

/// Build cache storage from the snapshot in `directory`, or an empty one.
///
/// Entries that cannot be decoded or no longer fit the quota are skipped.
pub fn load(directory: &Path, quota_bytes: Option<u64>) -> Result<CacheStorage, PersistError> {
    let storage = CacheStorage::new(quota_bytes);
    let Some(snapshot) = read(directory)? else {
        info!(path = %snapshot_path(directory).display(), "no cache snapshot found, starting empty");
        return Ok(storage);
    };

    let mut restored = 0usize;
    let mut skipped = 0usize;
    for namespace in snapshot.namespaces {
        let target = storage.open(&namespace.name);
        for entry in namespace.entries {
            let outcome = decode_entry(&entry)
                .and_then(|(key, response)| target.put(key, response).map_err(|err| err.to_string()));
            match outcome {
                Ok(()) => restored += 1,
                Err(reason) => {
                    skipped += 1;
                    warn!(cache = %namespace.name, url = %entry.url, reason = %reason, "skipping persisted entry");
                }
            }
        }
    }

    info!(
        namespaces = storage.keys().len(),
        restored,
        skipped,
        "cache storage restored from snapshot"
    );
    Ok(storage)
}

fn encode_entry(key: &RequestKey, response: &FetchResponse) -> EntrySnapshot {
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| (name.as_str().to_string(), STANDARD.encode(value.as_bytes())))
        .collect();

    EntrySnapshot {
        method: key.method().as_str().to_string(),
        url: key.url().to_string(),
        status: response.status().as_u16(),
        headers,
        body: STANDARD.encode(response.body()),
    }
}

fn decode_entry(entry: &EntrySnapshot) -> Result<(RequestKey, FetchResponse), String> {
    let method = Method::from_bytes(entry.method.as_bytes()).map_err(|err| err.to_string())?;
    let url = Url::parse(&entry.url).map_err(|err| err.to_string())?;
    let status = StatusCode::from_u16(entry.status).map_err(|err| err.to_string())?;
    let body = STANDARD.decode(&entry.body).map_err(|err| err.to_string())?;

    let mut headers = HeaderMap::with_capacity(entry.headers.len());
    for (name, value) in &entry.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| err.to_string())?;
        let raw = STANDARD.decode(value).map_err(|err| err.to_string())?;
        let value = HeaderValue::from_bytes(&raw).map_err(|err| err.to_string())?;
        headers.append(name, value);
    }

    Ok((
        RequestKey::new(method, &url),
        FetchResponse::new(status, headers, body),
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::header;
    use tempfile::TempDir;

    use super::*;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse(&format!("https://folio.test{path}")).expect("url"))
    }

    fn page(body: &'static str) -> FetchResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        FetchResponse::new(StatusCode::OK, headers, body)
    }

    #[test]
    fn missing_snapshot_loads_empty_storage() {
        let dir = TempDir::new().expect("tempdir");
        let storage = load(dir.path(), None).expect("load");
        assert!(storage.keys().is_empty());
        assert!(read(dir.path()).expect("read").is_none());
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(snapshot_path(dir.path()), b"{not json").expect("write");
        let err = load(dir.path(), None).expect_err("corrupt snapshot");
        assert!(matches!(err, PersistError::Decode { .. }));
    }

    #[test]
    fn entries_over_quota_are_skipped_on_load() {
        let dir = TempDir::new().expect("tempdir");
        let storage = CacheStorage::default();
        let ns = storage.open("runtime");
        ns.put(key("/a.css"), page("aaaaaaaaaa")).expect("put");
        ns.put(key("/b.css"), page("bbbbbbbbbb")).expect("put");
        save(&storage, dir.path()).expect("save");

        let one_entry = ns.match_request(&key("/a.css")).expect("entry").byte_size();
        let restored = load(dir.path(), Some(one_entry)).expect("load");
        let runtime = restored.get("runtime").expect("runtime");
        assert_eq!(runtime.len(), 1);
        assert!(runtime.contains(&key("/a.css")));
    }

    #[test]
    fn snapshot_summary_matches_live_namespace() {
        let dir = TempDir::new().expect("tempdir");
        let storage = CacheStorage::default();
        let ns = storage.open("precache-v1.0.1");
        ns.put(key("/index.html"), page("<html></html>")).expect("put");
        save(&storage, dir.path()).expect("save");

        let snapshot = read(dir.path()).expect("read").expect("snapshot");
        let summary = snapshot.namespaces[0].summary();
        assert_eq!(summary.name, "precache-v1.0.1");
        assert_eq!(summary.entries, 1);
        assert_eq!(summary.bytes, ns.bytes());
    }

    #[test]
    fn opaque_header_values_survive_a_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let storage = CacheStorage::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/webp"));
        let opaque = HeaderValue::from_bytes(b"attachment; filename=\"caf\xe9.webp\"")
            .expect("obs-text is a valid header value");
        headers.insert(header::CONTENT_DISPOSITION, opaque.clone());
        storage
            .open("images-v1")
            .put(key("/cafe.webp"), FetchResponse::new(StatusCode::OK, headers, "img"))
            .expect("put");
        save(&storage, dir.path()).expect("save");

        let restored = load(dir.path(), None).expect("load");
        let entry = restored
            .get("images-v1")
            .and_then(|ns| ns.match_request(&key("/cafe.webp")))
            .expect("entry restored");
        assert_eq!(entry.headers().get(header::CONTENT_DISPOSITION), Some(&opaque));
        assert_eq!(entry.headers().len(), 2);
        assert_eq!(
            restored.get("images-v1").expect("ns").bytes(),
            read(dir.path()).expect("read").expect("snapshot").namespaces[0]
                .summary()
                .bytes
        );
    }

    #[test]
    fn older_snapshot_format_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(snapshot_path(dir.path()), br#"{"format":1,"namespaces":[]}"#).expect("write");
        let err = read(dir.path()).expect_err("format 1");
        assert!(matches!(err, PersistError::UnsupportedFormat { found: 1 }));
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let dir = TempDir::new().expect("tempdir");
        let storage = CacheStorage::default();
        storage.open("runtime").put(key("/a.css"), page("a")).expect("put");
        assert_eq!(save(&storage, dir.path()).expect("first save"), 1);

        storage.open("runtime").put(key("/b.css"), page("b")).expect("put");
        assert_eq!(save(&storage, dir.path()).expect("second save"), 2);

        let leftovers = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name() != SNAPSHOT_FILE)
            .count();
        assert_eq!(leftovers, 0);
    }
}

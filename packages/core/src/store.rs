//! On-disk account state store.
//!
//! `StateStore` keeps one JSON document mapping each account to its
//! last-seen post id. Every update is a full read-modify-write of that
//! document, written to a temp file and renamed over the original so a
//! crash never leaves a half-written file behind.
//!
//! Updates within one process are serialised by an async mutex, so the
//! store can be shared as `Arc<StateStore>` between concurrent account
//! tasks without losing entries.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::StateStoreError;
use crate::types::{Account, AccountState, PostId};

/// Default state file name, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = "state.json";

/// Persisted entry for a single account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub last_seen_post_id: PostId,
    pub last_checked_at: DateTime<Utc>,
}

/// The whole state document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub accounts: BTreeMap<Account, StateEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// JSON-file backed store of [`AccountState`].
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored state for `account`. `None` means never processed.
    pub async fn load(&self, account: &Account) -> Result<Option<AccountState>, StateStoreError> {
        let doc = self.read_document().await?;

        Ok(doc.accounts.get(account).map(|entry| AccountState {
            account: account.clone(),
            last_seen_post_id: entry.last_seen_post_id.clone(),
            last_checked_at: entry.last_checked_at,
        }))
    }

    /// Record `last_seen` for `account`, preserving every other entry.
    ///
    /// A stored id that is newer than `last_seen` is kept; only the check
    /// timestamp moves in that case.
    pub async fn save(
        &self,
        account: &Account,
        last_seen: &PostId,
        at: DateTime<Utc>,
    ) -> Result<(), StateStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document_for_update().await?;

        let last_seen_post_id = match doc.accounts.get(account) {
            Some(existing) if existing.last_seen_post_id.is_newer_than(last_seen) => {
                tracing::warn!(
                    "@{}: refusing to move last seen id back from {} to {}",
                    account,
                    existing.last_seen_post_id,
                    last_seen
                );
                existing.last_seen_post_id.clone()
            }
            _ => last_seen.clone(),
        };

        doc.accounts.insert(
            account.clone(),
            StateEntry {
                last_seen_post_id,
                last_checked_at: at,
            },
        );
        doc.updated_at = Some(at);

        self.write_document(&doc).await
    }

    /// Refresh `last_checked_at` for an existing entry. Returns `false` when
    /// the account has no entry yet.
    pub async fn touch(&self, account: &Account, at: DateTime<Utc>) -> Result<bool, StateStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document_for_update().await?;

        let Some(entry) = doc.accounts.get_mut(account) else {
            return Ok(false);
        };
        entry.last_checked_at = at;
        doc.updated_at = Some(at);

        self.write_document(&doc).await?;
        Ok(true)
    }

    /// Read the full document. A missing file is an empty document.
    pub async fn read_document(&self) -> Result<StateDocument, StateStoreError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StateDocument::default()),
            Err(source) => {
                return Err(StateStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(StateDocument::default());
        }

        serde_json::from_slice(&raw).map_err(|source| StateStoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Like [`read_document`](Self::read_document), but a corrupt file is
    /// moved aside so the relay can make progress again.
    async fn read_document_for_update(&self) -> Result<StateDocument, StateStoreError> {
        match self.read_document().await {
            Err(StateStoreError::Corrupt { path, source }) => {
                let aside = sibling_path(&path, "corrupt");
                tracing::error!(
                    "State file {} is corrupt ({}); moving it to {} and starting fresh",
                    path.display(),
                    source,
                    aside.display()
                );
                fs::rename(&path, &aside)
                    .await
                    .map_err(|source| StateStoreError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Ok(StateDocument::default())
            }
            other => other,
        }
    }

    async fn write_document(&self, doc: &StateDocument) -> Result<(), StateStoreError> {
        let json = serde_json::to_vec_pretty(doc)?;
        let tmp = sibling_path(&self.path, "tmp");
        let io_err = |source| StateStoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        fs::write(&tmp, &json).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

/// `state.json` -> `state.json.<suffix>`
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn account(handle: &str) -> Account {
        Account::parse(handle).unwrap()
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        (dir, store)
    }

    // ---- load ----

    #[tokio::test]
    async fn load_on_missing_file_returns_none() {
        let (_dir, store) = temp_store();
        assert!(store.load(&account("example")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_on_corrupt_file_is_an_error() {
        let (_dir, store) = temp_store();
        std::fs::write(store.path(), b"{ not json").unwrap();

        let err = store.load(&account("example")).await.unwrap_err();
        assert!(matches!(err, StateStoreError::Corrupt { .. }));
    }

    // ---- save ----

    #[tokio::test]
    async fn save_then_load_round_trips_entry() {
        let (_dir, store) = temp_store();
        let example = account("example");

        store.save(&example, &PostId::new("103"), at(0)).await.unwrap();

        let state = store.load(&example).await.unwrap().unwrap();
        assert_eq!(state.last_seen_post_id, PostId::new("103"));
        assert_eq!(state.last_checked_at, at(0));
    }

    #[tokio::test]
    async fn save_preserves_other_accounts() {
        let (_dir, store) = temp_store();
        store.save(&account("alice"), &PostId::new("10"), at(0)).await.unwrap();
        store.save(&account("bob"), &PostId::new("20"), at(1)).await.unwrap();
        store.save(&account("alice"), &PostId::new("11"), at(2)).await.unwrap();

        let doc = store.read_document().await.unwrap();
        assert_eq!(doc.accounts.len(), 2);
        assert_eq!(doc.accounts[&account("bob")].last_seen_post_id, PostId::new("20"));
        assert_eq!(doc.accounts[&account("alice")].last_seen_post_id, PostId::new("11"));
        assert_eq!(doc.updated_at, Some(at(2)));
    }

    #[tokio::test]
    async fn save_never_moves_last_seen_backwards() {
        let (_dir, store) = temp_store();
        let example = account("example");
        store.save(&example, &PostId::new("200"), at(0)).await.unwrap();

        store.save(&example, &PostId::new("150"), at(5)).await.unwrap();

        let state = store.load(&example).await.unwrap().unwrap();
        assert_eq!(state.last_seen_post_id, PostId::new("200"));
        assert_eq!(state.last_checked_at, at(5));
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file_behind() {
        let (dir, store) = temp_store();
        store.save(&account("example"), &PostId::new("1"), at(0)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["state.json".to_string()]);
    }

    #[tokio::test]
    async fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/deeper/state.json"));

        store.save(&account("example"), &PostId::new("1"), at(0)).await.unwrap();

        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn save_over_corrupt_file_moves_it_aside() {
        let (dir, store) = temp_store();
        std::fs::write(store.path(), b"garbage").unwrap();

        store.save(&account("example"), &PostId::new("9"), at(0)).await.unwrap();

        assert!(dir.path().join("state.json.corrupt").exists());
        let state = store.load(&account("example")).await.unwrap().unwrap();
        assert_eq!(state.last_seen_post_id, PostId::new("9"));
    }

    #[tokio::test]
    async fn concurrent_saves_keep_every_account() {
        let (_dir, store) = temp_store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let acct = account(&format!("user{i}"));
                store.save(&acct, &PostId::new(i.to_string()), at(i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.read_document().await.unwrap().accounts.len(), 16);
    }

    // ---- touch ----

    #[tokio::test]
    async fn touch_updates_only_check_time() {
        let (_dir, store) = temp_store();
        let example = account("example");
        store.save(&example, &PostId::new("42"), at(0)).await.unwrap();

        assert!(store.touch(&example, at(10)).await.unwrap());

        let state = store.load(&example).await.unwrap().unwrap();
        assert_eq!(state.last_seen_post_id, PostId::new("42"));
        assert_eq!(state.last_checked_at, at(10));
    }

    #[tokio::test]
    async fn touch_on_unknown_account_creates_nothing() {
        let (_dir, store) = temp_store();

        assert!(!store.touch(&account("ghost"), at(0)).await.unwrap());
        assert!(!store.path().exists());
    }

    // ---- layout ----

    #[tokio::test]
    async fn document_layout_is_keyed_by_handle() {
        let (_dir, store) = temp_store();
        store.save(&account("example"), &PostId::new("103"), at(0)).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["accounts"]["example"]["last_seen_post_id"], "103");
        assert_eq!(raw["updated_at"], "2026-10-18T08:00:00Z");
    }
}

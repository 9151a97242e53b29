//! Document store backing users, items and runtime periods.
//!
//! Collections live in memory behind a single `RwLock`. When opened with a
//! snapshot path, every mutation is applied to a draft copy, the draft is
//! written to disk atomically, and only then swapped in. A failed write leaves
//! the in-memory state untouched.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Item, NewUser, RuntimePeriod, User};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate {0}")]
    Duplicate(String),
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("unsupported snapshot version {found} (expected at most {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence collaborator of the runtime ledger.
#[async_trait]
pub trait RuntimePeriodStore: Send + Sync {
    async fn find_open(&self) -> StoreResult<Vec<RuntimePeriod>>;
    /// Closes every open period at `at`, returning how many were closed.
    async fn close_all_open(&self, at: DateTime<Utc>) -> StoreResult<usize>;
    async fn create(&self, start: DateTime<Utc>) -> StoreResult<RuntimePeriod>;
    /// Returns `false` when the period is unknown or already closed.
    async fn close_one(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;
    /// Periods overlapping `[from, to]`, oldest first. A missing bound is unbounded.
    async fn find_overlapping(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<RuntimePeriod>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_items(&self, user_id: Uuid) -> StoreResult<Vec<Item>>;
    async fn insert_item(&self, user_id: Uuid, text: String) -> StoreResult<Item>;
    /// Removes the item only if it belongs to `user_id`.
    async fn delete_item(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<bool>;
}

#[derive(Debug, Clone, Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    items: HashMap<Uuid, Item>,
    runtime_periods: HashMap<Uuid, RuntimePeriod>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    users: Vec<User>,
    items: Vec<Item>,
    runtime_periods: Vec<RuntimePeriod>,
}

impl From<&Collections> for Snapshot {
    fn from(collections: &Collections) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            users: collections.users.values().cloned().collect(),
            items: collections.items.values().cloned().collect(),
            runtime_periods: collections.runtime_periods.values().cloned().collect(),
        }
    }
}

impl From<Snapshot> for Collections {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            users: snapshot.users.into_iter().map(|u| (u.id, u)).collect(),
            items: snapshot.items.into_iter().map(|i| (i.id, i)).collect(),
            runtime_periods: snapshot
                .runtime_periods
                .into_iter()
                .map(|p| (p.id, p))
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    collections: RwLock<Collections>,
    snapshot_path: Option<PathBuf>,
}

impl DocumentStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a store persisted at `path`. A missing file yields an empty store.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let collections = match tokio::fs::read(&path).await {
            Ok(bytes) => decode_snapshot(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Collections::default(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            collections: RwLock::new(collections),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    async fn read<T>(&self, f: impl FnOnce(&Collections) -> T) -> T {
        f(&*self.collections.read().await)
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Collections) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.collections.write().await;

        let Some(path) = self.snapshot_path.clone() else {
            return f(&mut *guard);
        };

        let mut draft = guard.clone();
        let output = f(&mut draft)?;

        let bytes = rmp_serde::to_vec_named(&Snapshot::from(&draft))?;
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))??;

        *guard = draft;
        Ok(output)
    }
}

fn decode_snapshot(bytes: &[u8]) -> StoreResult<Collections> {
    let snapshot: Snapshot = rmp_serde::from_slice(bytes)?;
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: snapshot.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    Ok(snapshot.into())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn sorted_by<T, K: Ord>(mut values: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    values.sort_by_key(key);
    values
}

#[async_trait]
impl RuntimePeriodStore for DocumentStore {
    async fn find_open(&self) -> StoreResult<Vec<RuntimePeriod>> {
        let open = self
            .read(|c| {
                c.runtime_periods
                    .values()
                    .filter(|period| period.is_open())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        Ok(sorted_by(open, |p| p.start_time))
    }

    async fn close_all_open(&self, at: DateTime<Utc>) -> StoreResult<usize> {
        self.mutate(|c| {
            let mut closed = 0;
            for period in c.runtime_periods.values_mut().filter(|p| p.is_open()) {
                period.end_time = Some(at.max(period.start_time));
                period.updated_at = at;
                closed += 1;
            }
            Ok(closed)
        })
        .await
    }

    async fn create(&self, start: DateTime<Utc>) -> StoreResult<RuntimePeriod> {
        let period = RuntimePeriod {
            id: Uuid::new_v4(),
            start_time: start,
            end_time: None,
            created_at: start,
            updated_at: start,
        };

        self.mutate(|c| {
            c.runtime_periods.insert(period.id, period.clone());
            Ok(period)
        })
        .await
    }

    async fn close_one(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let is_open = self
            .read(|c| c.runtime_periods.get(&id).is_some_and(|p| p.is_open()))
            .await;
        if !is_open {
            return Ok(false);
        }

        self.mutate(|c| {
            let Some(period) = c.runtime_periods.get_mut(&id).filter(|p| p.is_open()) else {
                return Ok(false);
            };
            period.end_time = Some(at.max(period.start_time));
            period.updated_at = at;
            Ok(true)
        })
        .await
    }

    async fn find_overlapping(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<RuntimePeriod>> {
        let matching = self
            .read(|c| {
                c.runtime_periods
                    .values()
                    .filter(|period| period.overlaps(from, to))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        Ok(sorted_by(matching, |p| p.start_time))
    }
}

#[async_trait]
impl UserStore for DocumentStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let now = Utc::now();
        self.mutate(|c| {
            if c.users.values().any(|u| u.username == user.username) {
                return Err(StoreError::Duplicate(format!("username '{}'", user.username)));
            }

            let user = User {
                id: Uuid::new_v4(),
                username: user.username,
                password_hash: user.password_hash,
                name: user.name,
                created_at: now,
                updated_at: now,
            };
            c.users.insert(user.id, user.clone());
            Ok(user)
        })
        .await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read(|c| c.users.values().find(|u| u.username == username).cloned())
            .await)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.read(|c| c.users.get(&id).cloned()).await)
    }
}

#[async_trait]
impl ItemStore for DocumentStore {
    async fn list_items(&self, user_id: Uuid) -> StoreResult<Vec<Item>> {
        let items = self
            .read(|c| {
                c.items
                    .values()
                    .filter(|item| item.user_id == user_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        Ok(sorted_by(items, |i| (i.created_at, i.id)))
    }

    async fn insert_item(&self, user_id: Uuid, text: String) -> StoreResult<Item> {
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            user_id,
            text,
            created_at: now,
            updated_at: now,
        };

        self.mutate(|c| {
            c.items.insert(item.id, item.clone());
            Ok(item)
        })
        .await
    }

    async fn delete_item(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<bool> {
        let owned = self
            .read(|c| c.items.get(&item_id).is_some_and(|i| i.user_id == user_id))
            .await;
        if !owned {
            return Ok(false);
        }

        self.mutate(|c| {
            let owned = c.items.get(&item_id).is_some_and(|i| i.user_id == user_id);
            if owned {
                c.items.remove(&item_id);
            }
            Ok(owned)
        })
        .await
    }
}

//! Identity store: users, couples and pairing codes behind one lock.
//!
//! # Concurrency
//!
//! All state lives in a single [`StoreState`] guarded by a mutex. Every
//! mutation runs as a transaction:
//!
//! ```text
//! lock ─► reload if stale ─► clone state into a draft ─► mutate draft ─► swap in ─► write snapshot ─► unlock
//!                                                              │
//!                                                              └─ error: draft dropped, nothing applied
//! ```
//!
//! File-backed stores also hold an exclusive advisory lock on
//! `<snapshot>.lock` from before the draft is taken until the snapshot is
//! written, and reload the snapshot first if another process moved its
//! `revision`. Separate processes sharing one file are serialized the same
//! way as threads sharing one `Store`.
//!
//! Compound mutations (a couple's two linked user updates, consuming a
//! pairing code) therefore either apply completely or not at all, and two
//! snapshot writes can never interleave. Reads clone what they need under
//! the same lock, so they never observe a half-applied change.
//!
//! If the snapshot write fails the in-memory change is kept (it is written
//! with the next successful mutation, unless another process writes first)
//! and the caller gets
//! [`PairingError::Persistence`].

pub mod model;
pub mod snapshot;

use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{PairingError, PairingResult};
pub use model::{Couple, PairCode, PartnerSummary, User, UserUpdate};
use snapshot::{Snapshot, StoredPairCode};

/// In-memory entity maps.
#[derive(Clone, Debug, Default)]
pub struct StoreState {
    users: HashMap<String, User>,
    pair_codes: HashMap<String, PairCode>,
    couples: HashMap<String, Couple>,
}

impl StoreState {
    fn from_snapshot(snapshot: Snapshot, loaded_at: DateTime<Utc>) -> Self {
        let users = snapshot
            .users
            .into_iter()
            .map(|user| (user.id.clone(), user))
            .collect();

        let pair_codes = snapshot
            .pair_codes
            .into_iter()
            .map(|entry| match entry {
                StoredPairCode::Timed(code, user_id, issued_at) => {
                    (code, PairCode { user_id, issued_at })
                }
                StoredPairCode::Legacy(code, user_id) => (
                    code,
                    PairCode {
                        user_id,
                        issued_at: loaded_at,
                    },
                ),
            })
            .collect();

        let couples = snapshot
            .couples
            .into_iter()
            .map(|couple| (couple.id.clone(), couple))
            .collect();

        Self {
            users,
            pair_codes,
            couples,
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut pair_codes: Vec<StoredPairCode> = self
            .pair_codes
            .iter()
            .map(|(code, entry)| {
                StoredPairCode::Timed(code.clone(), entry.user_id.clone(), entry.issued_at)
            })
            .collect();
        pair_codes.sort_by(|a, b| code_of(a).cmp(code_of(b)));

        let mut couples: Vec<Couple> = self.couples.values().cloned().collect();
        couples.sort_by(|a, b| a.id.cmp(&b.id));

        Snapshot {
            users,
            pair_codes,
            couples,
            revision: 0,
        }
    }

    /// Look up a user.
    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    /// Insert a new, unpaired user. Ids are never reused.
    pub fn insert_user(&mut self, user: User) -> PairingResult<()> {
        if user.is_paired() {
            return Err(PairingError::Validation(
                "new users cannot carry a partner; pair them instead".to_string(),
            ));
        }
        if self.users.contains_key(&user.id) {
            return Err(PairingError::Validation(format!(
                "user id already exists: {}",
                user.id
            )));
        }
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Merge `update` into the user, returning the updated record.
    pub fn update_user(&mut self, id: &str, update: UserUpdate) -> Option<User> {
        let user = self.users.get_mut(id)?;
        update.apply(user);
        Some(user.clone())
    }

    /// Commit a symmetric partnership between two existing, unpaired users.
    pub fn link_couple(
        &mut self,
        user1_id: &str,
        user2_id: &str,
        now: DateTime<Utc>,
    ) -> PairingResult<Couple> {
        if user1_id == user2_id {
            return Err(PairingError::Validation(
                "a user cannot be paired with themselves".to_string(),
            ));
        }

        for id in [user1_id, user2_id] {
            let user = self.user(id).ok_or_else(|| PairingError::user_not_found(id))?;
            if user.is_paired() {
                return Err(PairingError::AlreadyPaired(id.to_string()));
            }
        }

        let couple = Couple::new(user1_id, user2_id, now);
        self.update_user(user1_id, UserUpdate::partner(user2_id));
        self.update_user(user2_id, UserUpdate::partner(user1_id));
        self.couples.insert(couple.id.clone(), couple.clone());
        Ok(couple)
    }

    /// Look up a couple by id.
    pub fn couple(&self, id: &str) -> Option<&Couple> {
        self.couples.get(id)
    }

    /// Resolve a pairing code.
    pub fn pair_code(&self, code: &str) -> Option<&PairCode> {
        self.pair_codes.get(code)
    }

    /// Register a code, replacing any mapping it had.
    pub fn insert_pair_code(&mut self, code: String, entry: PairCode) {
        self.pair_codes.insert(code, entry);
    }

    /// Consume a code.
    pub fn remove_pair_code(&mut self, code: &str) -> Option<PairCode> {
        self.pair_codes.remove(code)
    }

    /// Whether `user_id` holds an unexpired code.
    pub fn has_live_code_for(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> bool {
        self.pair_codes
            .values()
            .any(|entry| entry.user_id == user_id && !entry.is_expired(now, ttl))
    }

    /// Drop every code issued by `user_id`. Returns how many were removed.
    pub fn revoke_codes_for(&mut self, user_id: &str) -> usize {
        let before = self.pair_codes.len();
        self.pair_codes.retain(|_, entry| entry.user_id != user_id);
        before - self.pair_codes.len()
    }

    /// Drop codes that outlived `ttl`. Returns how many were removed.
    pub fn purge_expired_codes(&mut self, now: DateTime<Utc>, ttl: Option<Duration>) -> usize {
        let before = self.pair_codes.len();
        self.pair_codes.retain(|_, entry| !entry.is_expired(now, ttl));
        before - self.pair_codes.len()
    }
}

fn code_of(entry: &StoredPairCode) -> &str {
    match entry {
        StoredPairCode::Timed(code, ..) | StoredPairCode::Legacy(code, _) => code,
    }
}

/// Counts of each entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of users.
    pub users: usize,
    /// Number of outstanding pairing codes.
    pub pair_codes: usize,
    /// Number of couples.
    pub couples: usize,
}

/// Process-wide store, sole mutator of all entities.
#[derive(Debug)]
pub struct Store {
    inner: Mutex<Inner>,
    backing: Option<Backing>,
}

/// State plus the snapshot revision it was last synced with.
#[derive(Debug, Default)]
struct Inner {
    state: StoreState,
    /// `None` until a snapshot has been read or written.
    disk_revision: Option<u64>,
}

/// Snapshot file and the lock file that serializes writers across processes.
#[derive(Debug)]
struct Backing {
    path: PathBuf,
    lock_path: PathBuf,
}

impl Backing {
    fn new(path: PathBuf) -> Self {
        let mut lock_path = path.as_os_str().to_owned();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
        }
    }

    fn lock_file(&self) -> PairingResult<RwLock<File>> {
        let persistence = |e: std::io::Error| {
            PairingError::Persistence(format!(
                "Failed to open lock file {}: {e}",
                self.lock_path.display()
            ))
        };
        if let Some(dir) = self.lock_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(persistence)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(persistence)?;
        Ok(RwLock::new(file))
    }

    /// Pick up writes made by other processes since `inner` last synced.
    ///
    /// A missing file leaves memory untouched, as does a file at the revision
    /// this process last saw (memory may be ahead of it after a failed write).
    fn refresh(&self, inner: &mut Inner) -> PairingResult<()> {
        let Some(snapshot) = snapshot::load(&self.path)? else {
            return Ok(());
        };
        if inner.disk_revision == Some(snapshot.revision) {
            return Ok(());
        }
        let revision = snapshot.revision;
        inner.state = StoreState::from_snapshot(snapshot, Utc::now());
        inner.disk_revision = Some(revision);
        log::debug!(
            "[Store] Reloaded snapshot revision {revision} from {}",
            self.path.display()
        );
        Ok(())
    }

    fn persist(&self, inner: &mut Inner) -> PairingResult<()> {
        let revision = inner.disk_revision.map_or(1, |r| r + 1);
        let mut snapshot = inner.state.to_snapshot();
        snapshot.revision = revision;
        snapshot::write(&self.path, &snapshot).inspect_err(|e| {
            log::error!("[Store] Snapshot write failed, keeping in-memory state: {e}");
        })?;
        inner.disk_revision = Some(revision);
        Ok(())
    }
}

impl Store {
    /// Open the store backed by the snapshot at `path`.
    ///
    /// A missing file means an empty store; an unreadable one is an error.
    /// Several stores (in one process or many) may share a path: every
    /// mutation holds an exclusive lock on `<path>.lock` and reloads the
    /// snapshot first if another writer changed it.
    pub fn open(path: impl Into<PathBuf>) -> PairingResult<Self> {
        let backing = Backing::new(path.into());
        let mut inner = Inner::default();
        {
            let file_lock = backing.lock_file()?;
            let _shared = file_lock.read().map_err(|e| lock_error(&backing, e))?;
            backing.refresh(&mut inner)?;
        }

        match inner.disk_revision {
            Some(revision) => log::info!(
                "[Store] Loaded {} users, {} pair codes, {} couples from {} (revision {revision})",
                inner.state.users.len(),
                inner.state.pair_codes.len(),
                inner.state.couples.len(),
                backing.path.display()
            ),
            None => log::info!(
                "[Store] No snapshot at {}, starting empty",
                backing.path.display()
            ),
        }

        Ok(Self {
            inner: Mutex::new(inner),
            backing: Some(backing),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            backing: None,
        }
    }

    // Drafts are only swapped in whole, so a poisoned guard still holds a
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a read-only closure against the current state.
    ///
    /// File-backed stores first pick up changes other processes committed.
    /// If the snapshot cannot be read, the closure sees the last known state.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        let mut inner = self.lock();
        if let Some(backing) = &self.backing {
            let synced = backing.lock_file().and_then(|file_lock| {
                let _shared = file_lock.read().map_err(|e| lock_error(backing, e))?;
                backing.refresh(&mut inner)
            });
            if let Err(e) = synced {
                log::warn!("[Store] Serving last known state: {e}");
            }
        }
        f(&inner.state)
    }

    /// Run a mutation atomically and persist the result.
    ///
    /// `f` works on a draft copy of the latest committed state. On `Err` the
    /// draft is discarded and the store is unchanged. File-backed stores hold
    /// the exclusive file lock from reload through write.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> PairingResult<T>,
    ) -> PairingResult<T> {
        let mut inner = self.lock();
        let Some(backing) = &self.backing else {
            let mut draft = inner.state.clone();
            let output = f(&mut draft)?;
            inner.state = draft;
            return Ok(output);
        };

        let mut file_lock = backing.lock_file()?;
        let _exclusive = file_lock.write().map_err(|e| lock_error(backing, e))?;
        backing.refresh(&mut inner)?;

        let mut draft = inner.state.clone();
        let output = f(&mut draft)?;
        inner.state = draft;
        backing.persist(&mut inner)?;
        Ok(output)
    }

    /// Create and persist a user.
    pub fn create_user(&self, id: &str, name: &str) -> PairingResult<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PairingError::Validation("name is required".to_string()));
        }
        if id.trim().is_empty() {
            return Err(PairingError::Validation("user id is required".to_string()));
        }

        let user = User::new(id, name, Utc::now());
        self.transaction(|state| state.insert_user(user.clone()))?;
        log::info!("[Store] Created user {}", short_id(id));
        Ok(user)
    }

    /// Look up a user.
    pub fn get_user(&self, id: &str) -> Option<User> {
        self.read(|state| state.user(id).cloned())
    }

    /// Merge `update` into an existing user. `Ok(None)` if `id` is unknown.
    pub fn update_user(&self, id: &str, update: UserUpdate) -> PairingResult<Option<User>> {
        self.transaction(|state| Ok(state.update_user(id, update)))
    }

    /// Pair two users, updating both partner references in one step.
    pub fn create_couple(&self, user1_id: &str, user2_id: &str) -> PairingResult<Couple> {
        let couple = self.transaction(|state| state.link_couple(user1_id, user2_id, Utc::now()))?;
        log::info!(
            "[Store] Created couple {} + {}",
            short_id(user1_id),
            short_id(user2_id)
        );
        Ok(couple)
    }

    /// Look up a couple by id.
    pub fn get_couple(&self, id: &str) -> Option<Couple> {
        self.read(|state| state.couple(id).cloned())
    }

    /// Resolve a pairing code to its issuing user id, ignoring expiry.
    pub fn user_by_pair_code(&self, code: &str) -> Option<String> {
        self.read(|state| state.pair_code(code).map(|entry| entry.user_id.clone()))
    }

    /// Entity counts.
    pub fn stats(&self) -> StoreStats {
        self.read(|state| StoreStats {
            users: state.users.len(),
            pair_codes: state.pair_codes.len(),
            couples: state.couples.len(),
        })
    }
}

fn lock_error(backing: &Backing, e: std::io::Error) -> PairingError {
    PairingError::Persistence(format!(
        "Failed to lock {}: {e}",
        backing.lock_path.display()
    ))
}

/// First 8 chars of an id, for logs.
pub(crate) fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

//! Registration requests sent to the bot with `@bot register ...`.
//!
//! A record moves through three states: unprocessed, processed + rejected,
//! processed + approved. A new request for a rejected user puts the record
//! back in the review queue; approved records are never touched again.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::actions::BotActions;
use crate::clock::Clock;
use crate::error_utils::{parse_json_with_context, serialize_to_json_with_context};
use crate::events::TweetPayload;
use crate::filename_utils::{is_registration_filename, registration_filename, sanitized_file_path};

pub const SUCCESS_REGISTER_MESSAGE: &str = "Done 😎";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub user_id: String,
    pub user_name: String,
    pub user_screen_name: String,
    /// Tweet that triggered the (latest) request
    pub tweet_id: String,
    pub description: String,
    pub protected: bool,
    pub verified: bool,
    pub processed: bool,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationRecord {
    pub fn status_label(&self) -> &'static str {
        match (self.processed, self.approved) {
            (false, _) => "pending",
            (true, false) => "rejected",
            (true, true) => "approved",
        }
    }
}

/// Fields to overwrite on an existing record; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationUpdate {
    pub user_name: Option<String>,
    pub user_screen_name: Option<String>,
    pub tweet_id: Option<String>,
    pub description: Option<String>,
    pub protected: Option<bool>,
    pub verified: Option<bool>,
    pub processed: Option<bool>,
    pub approved: Option<bool>,
}

impl RegistrationUpdate {
    fn apply(self, record: &mut RegistrationRecord, now: DateTime<Utc>) {
        fn set<T>(field: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *field = value;
            }
        }

        set(&mut record.user_name, self.user_name);
        set(&mut record.user_screen_name, self.user_screen_name);
        set(&mut record.tweet_id, self.tweet_id);
        set(&mut record.description, self.description);
        set(&mut record.protected, self.protected);
        set(&mut record.verified, self.verified);
        set(&mut record.processed, self.processed);
        set(&mut record.approved, self.approved);
        record.updated_at = now;
    }
}

/// Persistence for registration records, keyed by user id
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert a new record. Returns `false` and writes nothing when the user
    /// id already exists.
    async fn create(&self, record: &RegistrationRecord) -> Result<bool>;

    async fn find_one(&self, user_id: &str) -> Result<Option<RegistrationRecord>>;

    /// Apply `update` to the record of `user_id`, returning the new record
    async fn update_one(
        &self,
        user_id: &str,
        update: RegistrationUpdate,
    ) -> Result<Option<RegistrationRecord>>;

    /// All records, oldest first
    async fn list(&self) -> Result<Vec<RegistrationRecord>>;
}

/// One pretty-printed JSON file per user in a data directory
pub struct JsonRegistrationStore {
    data_dir: PathBuf,
}

impl JsonRegistrationStore {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        sanitized_file_path(&self.data_dir, &registration_filename(user_id))
    }

    async fn load(path: &Path) -> Result<RegistrationRecord> {
        let json = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read registration file {}", path.display()))?;
        parse_json_with_context(&json, "registration")
    }

    async fn save(&self, record: &RegistrationRecord) -> Result<()> {
        let path = self.path_for(&record.user_id);
        let json = serialize_to_json_with_context(record, "registration")?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write registration file {}", path.display()))?;
        debug!("Saved registration to {path}", path = path.display());
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for JsonRegistrationStore {
    async fn create(&self, record: &RegistrationRecord) -> Result<bool> {
        let path = self.path_for(&record.user_id);
        let json = serialize_to_json_with_context(record, "registration")?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to create registration file {}", path.display())
                });
            }
        };
        file.write_all(json.as_bytes())
            .await
            .with_context(|| format!("Failed to write registration file {}", path.display()))?;
        file.flush().await?;

        debug!("Created registration {path}", path = path.display());
        Ok(true)
    }

    async fn find_one(&self, user_id: &str) -> Result<Option<RegistrationRecord>> {
        let path = self.path_for(user_id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Self::load(&path).await.map(Some)
    }

    async fn update_one(
        &self,
        user_id: &str,
        update: RegistrationUpdate,
    ) -> Result<Option<RegistrationRecord>> {
        let Some(mut record) = self.find_one(user_id).await? else {
            return Ok(None);
        };
        update.apply(&mut record, Utc::now());
        self.save(&record).await?;
        Ok(Some(record))
    }

    async fn list(&self) -> Result<Vec<RegistrationRecord>> {
        let mut entries = fs::read_dir(&self.data_dir)
            .await
            .context("Failed to read data directory")?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let path = entry.path();
            let is_record = path
                .file_name()
                .is_some_and(|name| is_registration_filename(&name.to_string_lossy()));
            if !is_record {
                continue;
            }

            match Self::load(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping {path}: {e:#}", path = path.display()),
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

/// In-process store, used by tests and ephemeral runs
#[derive(Default)]
pub struct MemoryRegistrationStore {
    records: RwLock<HashMap<String, RegistrationRecord>>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn create(&self, record: &RegistrationRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.user_id) {
            return Ok(false);
        }
        records.insert(record.user_id.clone(), record.clone());
        Ok(true)
    }

    async fn find_one(&self, user_id: &str) -> Result<Option<RegistrationRecord>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn update_one(
        &self,
        user_id: &str,
        update: RegistrationUpdate,
    ) -> Result<Option<RegistrationRecord>> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(user_id).map(|record| {
            update.apply(record, Utc::now());
            record.clone()
        }))
    }

    async fn list(&self) -> Result<Vec<RegistrationRecord>> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created,
    /// A rejected record was refreshed and put back in the review queue
    Requeued,
    /// Pending or approved record left as is
    Unchanged,
}

#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    actions: BotActions,
    clock: Arc<dyn Clock>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn RegistrationStore>, actions: BotActions, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            actions,
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_millis()).unwrap_or_else(Utc::now)
    }

    /// Handle a register command from `payload`.
    ///
    /// An empty `description` falls back to the author's profile description.
    pub async fn submit(&self, payload: &TweetPayload, description: &str) -> Result<RegistrationOutcome> {
        let author = &payload.author;
        if author.id.is_empty() {
            bail!("Registration tweet {} has no author id", payload.id);
        }

        let description = if description.trim().is_empty() {
            author.description.clone().unwrap_or_default()
        } else {
            description.trim().to_string()
        };

        let Some(existing) = self.store.find_one(&author.id).await? else {
            let now = self.now();
            let record = RegistrationRecord {
                user_id: author.id.clone(),
                user_name: author.name.clone(),
                user_screen_name: author.screen_name.clone(),
                tweet_id: payload.id.clone(),
                description,
                protected: author.protected,
                verified: author.verified,
                processed: false,
                approved: false,
                created_at: now,
                updated_at: now,
            };
            if !self.store.create(&record).await? {
                debug!(
                    "Registration of @{screen_name} created concurrently, not replying twice",
                    screen_name = author.screen_name
                );
                return Ok(RegistrationOutcome::Unchanged);
            }
            info!("New registration from @{screen_name}", screen_name = author.screen_name);

            self.actions
                .reply(&payload.id, &author.screen_name, SUCCESS_REGISTER_MESSAGE)
                .await?;
            return Ok(RegistrationOutcome::Created);
        };

        if existing.processed && !existing.approved {
            let update = RegistrationUpdate {
                user_name: Some(author.name.clone()),
                user_screen_name: Some(author.screen_name.clone()),
                tweet_id: Some(payload.id.clone()),
                description: Some(description),
                protected: Some(author.protected),
                verified: Some(author.verified),
                processed: Some(false),
                approved: Some(false),
            };
            self.store.update_one(&author.id, update).await?;
            info!(
                "Registration of @{screen_name} queued for review again",
                screen_name = author.screen_name
            );
            return Ok(RegistrationOutcome::Requeued);
        }

        debug!(
            "Registration of @{screen_name} is {status}, leaving it unchanged",
            screen_name = author.screen_name,
            status = existing.status_label()
        );
        Ok(RegistrationOutcome::Unchanged)
    }
}

/// Operator decision on a registration. Returns `None` for unknown users.
pub async fn review(
    store: &dyn RegistrationStore,
    user_id: &str,
    approved: bool,
) -> Result<Option<RegistrationRecord>> {
    let update = RegistrationUpdate {
        processed: Some(true),
        approved: Some(approved),
        ..Default::default()
    };
    let record = store.update_one(user_id, update).await?;
    if let Some(record) = &record {
        info!(
            "Registration of @{screen_name} marked {status}",
            screen_name = record.user_screen_name,
            status = record.status_label()
        );
    }
    Ok(record)
}

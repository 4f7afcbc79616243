use super::types::*;
use crate::{
    Error, Result,
    schema::{SchemaStrictness, check_pairing_schema},
};
use chrono::{Local, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const BACKUP_MARKER: &str = "_backup_";
const LOCK_SUFFIX: &str = ".lock";
const READ_ATTEMPTS: usize = 50;
const RETRY_DELAY: Duration = Duration::from_millis(20);
const LOCK_POLL: Duration = Duration::from_millis(25);
const DESCRIPTION_PREVIEW: usize = 40;

/// Filesystem store of pairings, one directory per pairing:
///
/// ```text
/// <base>/<name>/schema.json
/// <base>/<name>/prompt.txt
/// <base>/<name>/meta.json
/// <base>/<name>_backup_<YYYYMMDD_HHMMSS>/...
/// ```
///
/// Writers stage all three files in a hidden sibling directory and rename it
/// into place, so the artifact set changes in a single step. Readers never
/// lock; they detect a swap by reading `meta.json` before and after the other
/// artifacts.
pub struct PairingStore {
    base_dir: PathBuf,
    lock_timeout: Duration,
}

#[derive(Debug, Default)]
struct Artifacts {
    schema: Option<Vec<u8>>,
    prompt: Option<Vec<u8>>,
    meta: Option<Vec<u8>>,
}

/// Exclusive write access to one pairing name, released on drop.
struct WriteLock {
    path: PathBuf,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

impl PairingStore {
    /// Resolves the base directory, creating it if needed.
    pub async fn open(base_dir: impl Into<PathBuf>, lock_timeout: Duration) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        info!("Pairing store opened at {}", base_dir.display());
        Ok(Self {
            base_dir,
            lock_timeout,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.base_dir.join(sanitize_name(name)?))
    }

    /// A pairing exists when its directory holds at least one entry.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        has_entries(&self.path(name)?).await
    }

    pub async fn save(
        &self,
        name: &str,
        schema: &Value,
        prompt: &str,
        info: PairingInfo,
        overwrite: bool,
    ) -> Result<PairingRef> {
        let name = sanitize_name(name)?;
        check_pairing_schema(schema, SchemaStrictness::Standard)
            .map_err(|problems| Error::InvalidSchema(problems.join("; ")))?;

        fs::create_dir_all(&self.base_dir).await?;
        let _lock = self.acquire_lock(&name).await?;

        let target = self.base_dir.join(&name);
        let existing = has_entries(&target).await?;
        if existing && !overwrite {
            return Err(Error::AlreadyExists { name });
        }

        let now = Utc::now();
        let created = if existing {
            read_optional(&target.join(META_FILE))
                .await?
                .and_then(|bytes| serde_json::from_slice::<PairingMeta>(&bytes).ok())
                .map(|meta| meta.created)
                .unwrap_or(now)
        } else {
            now
        };
        let meta = PairingMeta {
            name: name.clone(),
            info,
            created,
            modified: now,
            revision: uuid::Uuid::new_v4().to_string(),
        };

        let staging = self
            .base_dir
            .join(format!(".{}.staging-{}", name, uuid::Uuid::new_v4()));
        if let Err(e) = write_artifacts(&staging, schema, prompt, &meta).await {
            remove_staging(&staging).await;
            return Err(e);
        }

        let backup = if existing {
            let backup = self.next_backup_path(&name).await?;
            if let Err(e) = fs::rename(&target, &backup).await {
                remove_staging(&staging).await;
                return Err(e.into());
            }
            debug!("Moved previous version of '{}' to {}", name, backup.display());
            Some(backup)
        } else {
            if fs::try_exists(&target).await? {
                // empty leftover directory
                fs::remove_dir(&target).await?;
            }
            None
        };

        if let Err(e) = fs::rename(&staging, &target).await {
            if let Some(ref backup) = backup {
                if let Err(restore) = fs::rename(backup, &target).await {
                    warn!(
                        "Failed to restore '{}' from {}: {}",
                        name,
                        backup.display(),
                        restore
                    );
                }
            }
            remove_staging(&staging).await;
            return Err(e.into());
        }

        info!(
            "Saved pairing '{}' (revision {}){}",
            name,
            meta.revision,
            if backup.is_some() { ", previous version backed up" } else { "" }
        );

        Ok(PairingRef {
            name,
            path: target,
            backup,
        })
    }

    pub async fn load(&self, name: &str) -> Result<Pairing> {
        let name = sanitize_name(name)?;
        let dir = self.base_dir.join(&name);

        for _ in 0..READ_ATTEMPTS {
            let Some(artifacts) = read_consistent(&dir).await? else {
                return Err(Error::StoreBusy { name });
            };
            if !artifacts.is_empty() {
                return artifacts.into_pairing(&name);
            }
            // a swap may have completed since the read
            let writing = self.write_in_progress(&name).await?;
            if !writing && !has_entries(&dir).await? {
                return Err(Error::NotFound { name });
            }
            debug!("Pairing '{}' is being written, waiting", name);
            tokio::time::sleep(RETRY_DELAY).await;
        }

        if has_entries(&dir).await? {
            Err(Error::StoreBusy { name })
        } else {
            Err(Error::NotFound { name })
        }
    }

    /// Every pairing with the status of each artifact. Backups, staging
    /// directories and lock files are skipped, but a name whose directory is
    /// mid-swap is still reported once the new version lands.
    pub async fn list(&self) -> Result<Vec<PairingListing>> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(locked) = file_name
                .strip_prefix('.')
                .and_then(|rest| rest.strip_suffix(LOCK_SUFFIX))
            {
                if !locked.is_empty() && !locked.contains(BACKUP_MARKER) {
                    names.insert(locked.to_string());
                }
                continue;
            }
            if file_name.starts_with('.') || file_name.contains(BACKUP_MARKER) {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                names.insert(file_name);
            }
        }

        let mut listings = Vec::with_capacity(names.len());
        for name in names {
            if let Some(listing) = self.inspect_pairing(&name).await? {
                listings.push(listing);
            }
        }
        debug!("Listed {} pairings", listings.len());
        Ok(listings)
    }

    /// Artifact status of one pairing, waiting out an in-flight swap. `None`
    /// when the name has nothing on disk and no live writer.
    async fn inspect_pairing(&self, name: &str) -> Result<Option<PairingListing>> {
        let dir = self.base_dir.join(name);
        for _ in 0..READ_ATTEMPTS {
            let artifacts = read_consistent(&dir).await?.unwrap_or_default();
            if !artifacts.is_empty() {
                return Ok(Some(artifacts.inspect(name)));
            }
            if !self.write_in_progress(name).await? {
                // a swap may have completed since the read
                let artifacts = read_consistent(&dir).await?.unwrap_or_default();
                if !artifacts.is_empty() || fs::try_exists(&dir).await? {
                    return Ok(Some(artifacts.inspect(name)));
                }
                if !self.write_in_progress(name).await? {
                    return Ok(None);
                }
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
        warn!("Pairing '{}' kept changing while listing", name);
        Ok(Some(Artifacts::default().inspect(name)))
    }

    /// Backup directories of a pairing, oldest first.
    pub async fn backups(&self, name: &str) -> Result<Vec<PathBuf>> {
        let name = sanitize_name(name)?;
        let prefix = format!("{}{}", name, BACKUP_MARKER);

        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(stamp) = file_name
                .strip_prefix(&prefix)
                .filter(|s| s.starts_with(|c: char| c.is_ascii_digit()))
            else {
                continue;
            };
            if entry.file_type().await?.is_dir() {
                backups.push((backup_order(stamp), entry.path()));
            }
        }
        backups.sort();
        Ok(backups.into_iter().map(|(_, path)| path).collect())
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!(".{}{}", name, LOCK_SUFFIX))
    }

    /// A writer holds the name's lock. Locks older than the lock timeout are
    /// left over from a crashed process and do not count.
    async fn write_in_progress(&self, name: &str) -> Result<bool> {
        let metadata = match fs::metadata(self.lock_path(name)).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.elapsed().ok());
        match age {
            Some(age) if age >= self.lock_timeout => {
                debug!("Ignoring stale lock for '{}' ({:?} old)", name, age);
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    async fn acquire_lock(&self, name: &str) -> Result<WriteLock> {
        let path = self.lock_path(name);
        let deadline = Instant::now() + self.lock_timeout;

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(WriteLock { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        warn!(
                            "Timed out waiting for {}; remove it if no other jig process is running",
                            path.display()
                        );
                        return Err(Error::StoreBusy {
                            name: name.to_string(),
                        });
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// `<name>_backup_<YYYYMMDD_HHMMSS>`, suffixed `_1`, `_2`, ... when taken.
    async fn next_backup_path(&self, name: &str) -> Result<PathBuf> {
        let stem = format!(
            "{}{}{}",
            name,
            BACKUP_MARKER,
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let mut candidate = self.base_dir.join(&stem);
        let mut suffix = 1;
        while fs::try_exists(&candidate).await? {
            candidate = self.base_dir.join(format!("{}_{}", stem, suffix));
            suffix += 1;
        }
        Ok(candidate)
    }
}

impl Artifacts {
    fn is_empty(&self) -> bool {
        self.schema.is_none() && self.prompt.is_none() && self.meta.is_none()
    }

    fn into_pairing(self, name: &str) -> Result<Pairing> {
        let schema = self
            .schema
            .ok_or_else(|| Error::corrupt(name, SCHEMA_FILE, "missing"))?;
        let schema = parse_schema(&schema).map_err(|e| Error::corrupt(name, SCHEMA_FILE, e))?;

        let prompt = self
            .prompt
            .ok_or_else(|| Error::corrupt(name, PROMPT_FILE, "missing"))?;
        let prompt = String::from_utf8(prompt)
            .map_err(|e| Error::corrupt(name, PROMPT_FILE, e.to_string()))?;

        let meta = self
            .meta
            .ok_or_else(|| Error::corrupt(name, META_FILE, "missing"))?;
        let meta: PairingMeta = serde_json::from_slice(&meta)
            .map_err(|e| Error::corrupt(name, META_FILE, e.to_string()))?;

        Ok(Pairing {
            name: name.to_string(),
            schema,
            prompt,
            meta,
        })
    }

    fn inspect(self, name: &str) -> PairingListing {
        let schema = match self.schema {
            None => ArtifactStatus::Missing,
            Some(ref bytes) if parse_schema(bytes).is_ok() => ArtifactStatus::Valid,
            Some(_) => ArtifactStatus::Invalid,
        };
        let prompt = match self.prompt {
            None => ArtifactStatus::Missing,
            Some(ref bytes) if std::str::from_utf8(bytes).is_ok() => ArtifactStatus::Valid,
            Some(_) => ArtifactStatus::Invalid,
        };
        let parsed_meta = self
            .meta
            .as_ref()
            .map(|bytes| serde_json::from_slice::<PairingMeta>(bytes));
        let (meta, description) = match parsed_meta {
            None => (ArtifactStatus::Missing, String::new()),
            Some(Ok(meta)) => (
                ArtifactStatus::Valid,
                meta.info
                    .description
                    .chars()
                    .take(DESCRIPTION_PREVIEW)
                    .collect(),
            ),
            Some(Err(_)) => (ArtifactStatus::Invalid, String::new()),
        };

        PairingListing {
            name: name.to_string(),
            schema,
            prompt,
            meta,
            description,
        }
    }
}

/// Pairing names become directory names: lowercase word characters, with
/// runs of whitespace and hyphens collapsed to `_`.
pub fn sanitize_name(name: &str) -> Result<String> {
    let mut safe = String::new();
    let mut separator = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() || c == '_' {
            if separator {
                safe.push('_');
                separator = false;
            }
            safe.extend(c.to_lowercase());
        } else if c == '-' || c.is_whitespace() {
            separator = true;
        }
    }
    if separator {
        safe.push('_');
    }

    if safe.is_empty() || safe.chars().all(|c| c == '_') {
        return Err(Error::InvalidName(format!(
            "'{}' contains no usable characters",
            name
        )));
    }
    if safe.contains(BACKUP_MARKER) {
        return Err(Error::InvalidName(format!(
            "'{}' collides with the backup naming scheme",
            name
        )));
    }
    Ok(safe)
}

/// Orders `YYYYMMDD_HHMMSS[_n]` stamps by time, then numeric suffix.
fn backup_order(stamp: &str) -> (String, u32) {
    const STAMP_LEN: usize = "YYYYMMDD_HHMMSS".len();
    match stamp.get(..STAMP_LEN) {
        Some(time) => {
            let suffix = stamp[STAMP_LEN..]
                .trim_start_matches('_')
                .parse()
                .unwrap_or(0);
            (time.to_string(), suffix)
        }
        None => (stamp.to_string(), 0),
    }
}

fn parse_schema(bytes: &[u8]) -> std::result::Result<Value, String> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    check_pairing_schema(&value, SchemaStrictness::Standard).map_err(|p| p.join("; "))?;
    Ok(value)
}

async fn has_entries(dir: &Path) -> Result<bool> {
    match fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_some()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Reads the three artifacts, bracketed by two reads of `meta.json`. Returns
/// `None` when every attempt overlapped a swap.
async fn read_consistent(dir: &Path) -> Result<Option<Artifacts>> {
    for attempt in 1..=READ_ATTEMPTS {
        let meta_before = read_optional(&dir.join(META_FILE)).await?;
        let schema = read_optional(&dir.join(SCHEMA_FILE)).await?;
        let prompt = read_optional(&dir.join(PROMPT_FILE)).await?;
        let meta_after = read_optional(&dir.join(META_FILE)).await?;

        if meta_before == meta_after {
            return Ok(Some(Artifacts {
                schema,
                prompt,
                meta: meta_after,
            }));
        }
        debug!(
            "{} changed while reading (attempt {}), retrying",
            dir.display(),
            attempt
        );
        tokio::time::sleep(RETRY_DELAY).await;
    }
    Ok(None)
}

async fn write_artifacts(
    dir: &Path,
    schema: &Value,
    prompt: &str,
    meta: &PairingMeta,
) -> Result<()> {
    fs::create_dir(dir).await?;
    write_synced(
        &dir.join(SCHEMA_FILE),
        serde_json::to_string_pretty(schema)?.as_bytes(),
    )
    .await?;
    write_synced(&dir.join(PROMPT_FILE), prompt.as_bytes()).await?;
    write_synced(
        &dir.join(META_FILE),
        serde_json::to_string_pretty(meta)?.as_bytes(),
    )
    .await?;
    Ok(())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

async fn remove_staging(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove staging directory {}: {}", dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_store() -> (TempDir, PairingStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = PairingStore::open(temp_dir.path().join("pairings"), Duration::from_millis(200))
            .await
            .unwrap();
        (temp_dir, store)
    }

    fn sample_schema() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {"summary": {"type": "string"}},
            "required": ["summary"]
        })
    }

    #[rstest]
    #[case("meeting", "meeting")]
    #[case("Meeting Notes", "meeting_notes")]
    #[case("lab-results  v2", "lab_results_v2")]
    #[case("  invoices!  ", "invoices")]
    #[case("a -!- b", "a_b")]
    #[case("-lead", "_lead")]
    #[case("Café", "café")]
    #[case("../etc", "etc")]
    fn test_sanitize_name(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_name(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("!!!")]
    #[case(" - ")]
    #[case("x_backup_20240101_000000")]
    fn test_sanitize_name_rejects(#[case] input: &str) {
        assert!(matches!(sanitize_name(input), Err(Error::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_open_creates_base_dir() {
        let (temp_dir, store) = create_test_store().await;
        assert!(temp_dir.path().join("pairings").is_dir());
        assert_eq!(store.base_dir(), temp_dir.path().join("pairings"));
    }

    #[tokio::test]
    async fn test_save_writes_three_files() {
        let (_temp_dir, store) = create_test_store().await;
        let saved = store
            .save(
                "summary",
                &sample_schema(),
                "Summarize.",
                PairingInfo::new("One-line summaries"),
                false,
            )
            .await
            .unwrap();

        assert_eq!(saved.name, "summary");
        assert!(saved.backup.is_none());
        let schema_text = std::fs::read_to_string(saved.path.join(SCHEMA_FILE)).unwrap();
        assert_eq!(
            schema_text,
            serde_json::to_string_pretty(&sample_schema()).unwrap()
        );
        assert_eq!(
            std::fs::read_to_string(saved.path.join(PROMPT_FILE)).unwrap(),
            "Summarize."
        );

        let meta: PairingMeta =
            serde_json::from_str(&std::fs::read_to_string(saved.path.join(META_FILE)).unwrap())
                .unwrap();
        assert_eq!(meta.name, "summary");
        assert_eq!(meta.info.description, "One-line summaries");
        assert_eq!(meta.created, meta.modified);

        // no staging directories or lock files left behind
        let leftovers: Vec<_> = std::fs::read_dir(store.base_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "leftovers: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_schema() {
        let (_temp_dir, store) = create_test_store().await;
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["b"]
        });

        let result = store
            .save("broken", &schema, "prompt", PairingInfo::default(), false)
            .await;
        assert!(matches!(result, Err(Error::InvalidSchema(_))));
        assert!(!store.exists("broken").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_created_timestamp() {
        let (_temp_dir, store) = create_test_store().await;
        store
            .save("notes", &sample_schema(), "v1", PairingInfo::default(), false)
            .await
            .unwrap();
        let first = store.load("notes").await.unwrap();

        store
            .save("notes", &sample_schema(), "v2", PairingInfo::default(), true)
            .await
            .unwrap();
        let second = store.load("notes").await.unwrap();

        assert_eq!(second.prompt, "v2");
        assert_eq!(second.meta.created, first.meta.created);
        assert!(second.meta.modified >= first.meta.modified);
        assert_ne!(second.meta.revision, first.meta.revision);
    }

    #[tokio::test]
    async fn test_backup_names_never_collide() {
        let (_temp_dir, store) = create_test_store().await;
        let first = store.next_backup_path("notes").await.unwrap();
        std::fs::create_dir(&first).unwrap();
        let second = store.next_backup_path("notes").await.unwrap();

        assert_ne!(first, second);
        let first_name = first.file_name().unwrap().to_string_lossy().into_owned();
        let second_name = second.file_name().unwrap().to_string_lossy().into_owned();
        assert!(first_name.starts_with("notes_backup_"));
        // notes_backup_ + YYYYMMDD_HHMMSS
        assert_eq!(first_name.len(), "notes_backup_".len() + 15);
        assert!(second_name.starts_with(&first_name) || second_name > first_name);
    }

    #[test]
    fn test_backup_order_uses_numeric_suffix() {
        let mut stamps = vec![
            "20261019_101500_10",
            "20261019_101500_2",
            "20261019_101500",
            "20261018_235959",
        ];
        stamps.sort_by_key(|s| backup_order(s));
        assert_eq!(
            stamps,
            vec![
                "20261018_235959",
                "20261019_101500",
                "20261019_101500_2",
                "20261019_101500_10",
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_lock_makes_writers_busy() {
        let (_temp_dir, store) = create_test_store().await;
        std::fs::write(store.lock_path("notes"), b"").unwrap();

        let result = store
            .save("notes", &sample_schema(), "v1", PairingInfo::default(), false)
            .await;
        assert!(matches!(result, Err(Error::StoreBusy { .. })));
    }

    #[tokio::test]
    async fn test_lock_released_after_failed_save() {
        let (_temp_dir, store) = create_test_store().await;
        store
            .save("notes", &sample_schema(), "v1", PairingInfo::default(), false)
            .await
            .unwrap();
        let result = store
            .save("notes", &sample_schema(), "v2", PairingInfo::default(), false)
            .await;
        assert!(matches!(result, Err(Error::AlreadyExists { .. })));
        assert!(!store.lock_path("notes").exists());
    }

    #[tokio::test]
    async fn test_empty_directory_is_not_a_pairing() {
        let (_temp_dir, store) = create_test_store().await;
        std::fs::create_dir(store.base_dir().join("placeholder")).unwrap();

        assert!(!store.exists("placeholder").await.unwrap());
        assert!(matches!(
            store.load("placeholder").await,
            Err(Error::NotFound { .. })
        ));

        // an empty leftover directory does not block a fresh save
        store
            .save(
                "placeholder",
                &sample_schema(),
                "now real",
                PairingInfo::default(),
                false,
            )
            .await
            .unwrap();
        assert_eq!(store.load("placeholder").await.unwrap().prompt, "now real");
    }

    #[tokio::test]
    async fn test_leftover_lock_without_directory_is_not_found() {
        let (_temp_dir, store) = create_test_store().await;
        std::fs::write(store.lock_path("ghost"), b"").unwrap();

        // fresh lock: waits for the writer, then gives up with NotFound
        assert!(matches!(
            store.load("ghost").await,
            Err(Error::NotFound { .. })
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!store.write_in_progress("ghost").await.unwrap());
        assert!(matches!(
            store.load("ghost").await,
            Err(Error::NotFound { .. })
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_reports_pairing_while_directory_is_swapped_out() {
        let (_temp_dir, store) = create_test_store().await;
        store
            .save("notes", &sample_schema(), "v1", PairingInfo::default(), false)
            .await
            .unwrap();

        // freeze the store mid-swap: lock held, directory moved aside
        let lock = store.acquire_lock("notes").await.unwrap();
        let aside = store.base_dir().join("notes_backup_20261019_000000");
        std::fs::rename(store.base_dir().join("notes"), &aside).unwrap();

        let restore = {
            let target = store.base_dir().join("notes");
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                std::fs::rename(&aside, &target).unwrap();
                drop(lock);
            }
        };
        let (listings, ()) = tokio::join!(store.list(), restore);

        let listings = listings.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].name, "notes");
        assert_eq!(listings[0].schema, ArtifactStatus::Valid);
        assert_eq!(listings[0].prompt, ArtifactStatus::Valid);
        assert_eq!(listings[0].meta, ArtifactStatus::Valid);
    }
}

//! Device credential generation and the persisted key store
//!
//! Keys handed out by [`IdentityKeyStore::generate`] stay *reserved* until
//! the device's registration is confirmed. Only confirmed entries are ever
//! written to disk, so a reservation dropped after a conflict never leaks.

use crate::error::{DeployError, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Random bytes per key (256 bits)
pub const KEY_BYTES: usize = 32;

/// On-disk shape: device id -> [primary, secondary]
type PersistedKeys = BTreeMap<String, (String, String)>;

/// Primary and secondary symmetric key of one device
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub primary: String,
    pub secondary: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").finish_non_exhaustive()
    }
}

pub struct IdentityKeyStore {
    rng: Box<dyn RngCore + Send + Sync>,
    /// Every key currently reserved or confirmed in this run
    issued: HashSet<String>,
    pending: HashMap<String, KeyPair>,
    entries: BTreeMap<String, KeyPair>,
}

impl Default for IdentityKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityKeyStore {
    pub fn new() -> Self {
        Self::with_rng(Box::new(OsRng))
    }

    pub fn with_rng(rng: Box<dyn RngCore + Send + Sync>) -> Self {
        Self {
            rng,
            issued: HashSet::new(),
            pending: HashMap::new(),
            entries: BTreeMap::new(),
        }
    }

    /// Reserve a fresh key pair for `device_id`.
    ///
    /// Both keys are distinct from every other key issued in this run; a
    /// colliding draw is discarded and redrawn.
    pub fn generate(&mut self, device_id: &str) -> KeyPair {
        if let Some(stale) = self.pending.remove(device_id) {
            self.release(&stale);
        }
        let primary = self.draw_unique();
        let secondary = self.draw_unique();
        let pair = KeyPair { primary, secondary };
        self.pending.insert(device_id.to_string(), pair.clone());
        pair
    }

    /// Promote the reservation of `device_id` to a confirmed entry
    pub fn confirm(&mut self, device_id: &str) -> bool {
        let Some(pair) = self.pending.remove(device_id) else {
            return false;
        };
        if let Some(previous) = self.entries.insert(device_id.to_string(), pair) {
            self.release(&previous);
        }
        true
    }

    /// Drop the reservation of `device_id` and release its keys.
    ///
    /// Entries already confirmed earlier in the run are left alone.
    pub fn remove(&mut self, device_id: &str) -> Option<KeyPair> {
        let pair = self.pending.remove(device_id)?;
        self.release(&pair);
        Some(pair)
    }

    /// Confirmed keys of `device_id`
    pub fn get(&self, device_id: &str) -> Option<&KeyPair> {
        self.entries.get(device_id)
    }

    pub fn is_reserved(&self, device_id: &str) -> bool {
        self.pending.contains_key(device_id)
    }

    /// Number of confirmed entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` is reserved or confirmed in this run
    pub fn is_issued(&self, key: &str) -> bool {
        self.issued.contains(key)
    }

    /// Merge the confirmed entries into the store at `path`.
    ///
    /// Entries on disk for devices not confirmed in this run are kept as they
    /// are. Without confirmed entries nothing is read or written. Returns
    /// whether the file was written.
    pub async fn merge_and_persist(&self, path: &Path) -> Result<bool> {
        if self.entries.is_empty() {
            tracing::debug!("No new device keys; leaving {} untouched", path.display());
            return Ok(false);
        }

        let mut merged: PersistedKeys = match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => PersistedKeys::new(),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| DeployError::json(path, e))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedKeys::new(),
            Err(e) => return Err(DeployError::io(path, e)),
        };

        for (device_id, pair) in &self.entries {
            merged.insert(
                device_id.clone(),
                (pair.primary.clone(), pair.secondary.clone()),
            );
        }

        let content =
            serde_json::to_string_pretty(&merged).map_err(|e| DeployError::json(path, e))?;

        let mut tmp_path = path.as_os_str().to_owned();
        tmp_path.push(".tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| DeployError::io(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| DeployError::io(path, e))?;

        tracing::debug!(
            "Persisted {} device key pair(s) to {}",
            self.entries.len(),
            path.display()
        );
        Ok(true)
    }

    fn draw_unique(&mut self) -> String {
        loop {
            let mut bytes = [0u8; KEY_BYTES];
            self.rng.fill_bytes(&mut bytes);
            let key = STANDARD.encode(bytes);
            if self.issued.insert(key.clone()) {
                return key;
            }
            tracing::debug!("Discarding colliding key draw");
        }
    }

    fn release(&mut self, pair: &KeyPair) {
        self.issued.remove(&pair.primary);
        self.issued.remove(&pair.secondary);
    }
}

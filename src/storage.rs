//! Point d'accès unique au stockage persistant.
//!
//! Toutes les écritures passent d'abord par le stockage externe, puis
//! mettent à jour le cache. Les collections sont relues et réécrites en
//! entier à chaque modification: deux modifications concurrentes de la
//! même collection peuvent s'écraser.

use chrono::Duration;
use log::{debug, error, info};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, io, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cache::{Cache, Clock, SystemClock};
use crate::models::{Appointment, AppSettings, Notification, Record, RegisteredUser};
use crate::store::KeyValueStore;

/// Les clés connues du stockage
pub mod keys {
    pub const USER: &str = "@MedicalApp:user";
    pub const TOKEN: &str = "@MedicalApp:token";
    pub const APPOINTMENTS: &str = "@MedicalApp:appointments";
    pub const NOTIFICATIONS: &str = "@MedicalApp:notifications";
    pub const REGISTERED_USERS: &str = "@MedicalApp:registeredUsers";
    pub const APP_SETTINGS: &str = "@MedicalApp:settings";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Erreur d'accès au stockage pour {key}: {source}")]
    Io { key: String, source: io::Error },

    #[error("Impossible de sérialiser {key}: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("Donnée illisible pour {key}: {source}")]
    Deserialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("Modification invalide: {0}")]
    InvalidPatch(String),

    #[error("Sauvegarde invalide: {0}")]
    InvalidBackup(#[source] serde_json::Error),
}

/// Statistiques d'occupation du stockage et du cache
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub cache_size: usize,
    pub total_keys: usize,
    pub last_access: BTreeMap<String, chrono::DateTime<chrono::Utc>>,
}

pub struct StorageService {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    cache: Mutex<Cache>,
}

fn io_error(key: &str, source: io::Error) -> StorageError {
    error!("Storage I/O failed for {key}: {source}");
    StorageError::Io {
        key: key.to_owned(),
        source,
    }
}

fn deserialize_error(key: &str, source: serde_json::Error) -> StorageError {
    error!("Could not read {key}: {source}");
    StorageError::Deserialize {
        key: key.to_owned(),
        source,
    }
}

/// Fusion superficielle d'un objet JSON dans un enregistrement
fn merge_patch<T: Record>(record: &T, patch: &Map<String, Value>) -> Result<T, StorageError> {
    let mut merged = match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return Err(StorageError::InvalidPatch("record is not an object".into())),
        Err(e) => return Err(StorageError::InvalidPatch(e.to_string())),
    };
    merged.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
    serde_json::from_value(Value::Object(merged))
        .map_err(|e| StorageError::InvalidPatch(e.to_string()))
}

impl StorageService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            cache: Mutex::new(Cache::new()),
        }
    }

    /// Écrit une valeur dans le stockage, puis dans le cache.
    ///
    /// Avec `expiry_minutes`, l'entrée du cache expire après ce délai; la
    /// valeur persistée, elle, n'expire jamais.
    pub async fn set_item<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expiry_minutes: Option<u32>,
    ) -> Result<(), StorageError> {
        let data = serde_json::to_value(value).map_err(|source| {
            error!("Could not serialize {key}: {source}");
            StorageError::Serialize {
                key: key.to_owned(),
                source,
            }
        })?;

        self.store
            .set(key, data.to_string())
            .await
            .map_err(|e| io_error(key, e))?;

        let ttl = expiry_minutes.map(|minutes| Duration::minutes(i64::from(minutes)));
        self.cache
            .lock()
            .await
            .insert(key, data, self.clock.now(), ttl);
        Ok(())
    }

    /// Lit une valeur, depuis le cache si possible.
    ///
    /// Renvoie `None` si la clé n'existe pas ou si le stockage ne répond
    /// pas (l'échec est journalisé). Une valeur illisible est une erreur,
    /// pas une absence.
    pub async fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let cached = self.cache.lock().await.get(key, self.clock.now());
        if let Some(data) = cached {
            debug!("Cache hit for {key}");
            return serde_json::from_value(data)
                .map(Some)
                .map_err(|e| deserialize_error(key, e));
        }

        let stored = match self.store.get(key).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Ok(None),
            Err(e) => {
                error!("Storage read failed for {key}, using default: {e}");
                return Ok(None);
            }
        };

        let data: Value = serde_json::from_str(&stored).map_err(|e| deserialize_error(key, e))?;
        let value = serde_json::from_value(data.clone()).map_err(|e| deserialize_error(key, e))?;
        self.cache
            .lock()
            .await
            .insert(key, data, self.clock.now(), None);
        Ok(Some(value))
    }

    pub async fn get_item_or<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, StorageError> {
        Ok(self.get_item(key).await?.unwrap_or(default))
    }

    pub async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.store.remove(key).await.map_err(|e| io_error(key, e))?;
        self.cache.lock().await.remove(key);
        Ok(())
    }

    /// Efface tout le stockage et tout le cache
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        self.store.clear().await.map_err(|e| io_error("*", e))?;
        self.cache.lock().await.clear();
        info!("Storage cleared");
        Ok(())
    }

    /// Vide le cache sans toucher au stockage
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    /// Libère le service et son cache
    pub fn dispose(self) {
        self.cache.into_inner().dispose();
    }

    pub async fn storage_info(&self) -> Result<StorageInfo, StorageError> {
        let total_keys = self
            .store
            .list_keys()
            .await
            .map_err(|e| io_error("*", e))?
            .len();
        let cache = self.cache.lock().await;
        Ok(StorageInfo {
            cache_size: cache.len(),
            total_keys,
            last_access: cache.last_access(),
        })
    }

    async fn collection<T: Record>(&self, key: &str) -> Result<Vec<T>, StorageError> {
        self.get_item_or(key, Vec::new()).await
    }

    async fn push_record<T: Record>(&self, key: &str, record: T) -> Result<(), StorageError> {
        let mut records: Vec<T> = self.collection(key).await?;
        records.push(record);
        self.set_item(key, &records, None).await
    }

    /// Remplace l'enregistrement `id` par sa fusion avec `patch`.
    /// Sans correspondance, la collection reste inchangée.
    async fn patch_record<T: Record>(
        &self,
        key: &str,
        id: &str,
        patch: &Value,
    ) -> Result<(), StorageError> {
        let Value::Object(patch) = patch else {
            return Err(StorageError::InvalidPatch(format!(
                "expected a JSON object, got {patch}"
            )));
        };

        let mut records: Vec<T> = self.collection(key).await?;
        let Some(position) = records.iter().position(|r| r.record_id() == id) else {
            debug!("No record {id} in {key}, nothing to update");
            return Ok(());
        };
        let merged = merge_patch(&records[position], patch)?;
        records[position] = merged;
        self.set_item(key, &records, None).await
    }

    async fn remove_record<T: Record>(&self, key: &str, id: &str) -> Result<(), StorageError> {
        let mut records: Vec<T> = self.collection(key).await?;
        records.retain(|r| r.record_id() != id);
        self.set_item(key, &records, None).await
    }

    pub async fn appointments(&self) -> Result<Vec<Appointment>, StorageError> {
        self.collection(keys::APPOINTMENTS).await
    }

    pub async fn save_appointments(&self, appointments: &[Appointment]) -> Result<(), StorageError> {
        self.set_item(keys::APPOINTMENTS, appointments, None).await
    }

    pub async fn add_appointment(&self, appointment: Appointment) -> Result<(), StorageError> {
        self.push_record(keys::APPOINTMENTS, appointment).await
    }

    pub async fn update_appointment(&self, id: &str, patch: &Value) -> Result<(), StorageError> {
        self.patch_record::<Appointment>(keys::APPOINTMENTS, id, patch)
            .await
    }

    pub async fn delete_appointment(&self, id: &str) -> Result<(), StorageError> {
        self.remove_record::<Appointment>(keys::APPOINTMENTS, id)
            .await
    }

    pub async fn registered_users(&self) -> Result<Vec<RegisteredUser>, StorageError> {
        self.collection(keys::REGISTERED_USERS).await
    }

    pub async fn save_registered_users(&self, users: &[RegisteredUser]) -> Result<(), StorageError> {
        self.set_item(keys::REGISTERED_USERS, users, None).await
    }

    pub async fn add_user(&self, user: RegisteredUser) -> Result<(), StorageError> {
        self.push_record(keys::REGISTERED_USERS, user).await
    }

    pub async fn update_user(&self, id: &str, patch: &Value) -> Result<(), StorageError> {
        self.patch_record::<RegisteredUser>(keys::REGISTERED_USERS, id, patch)
            .await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), StorageError> {
        self.remove_record::<RegisteredUser>(keys::REGISTERED_USERS, id)
            .await
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>, StorageError> {
        self.collection(keys::NOTIFICATIONS).await
    }

    pub async fn save_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<(), StorageError> {
        self.set_item(keys::NOTIFICATIONS, notifications, None)
            .await
    }

    pub async fn add_notification(&self, notification: Notification) -> Result<(), StorageError> {
        self.push_record(keys::NOTIFICATIONS, notification).await
    }

    pub async fn update_notification(&self, id: &str, patch: &Value) -> Result<(), StorageError> {
        self.patch_record::<Notification>(keys::NOTIFICATIONS, id, patch)
            .await
    }

    pub async fn delete_notification(&self, id: &str) -> Result<(), StorageError> {
        self.remove_record::<Notification>(keys::NOTIFICATIONS, id)
            .await
    }

    pub async fn app_settings(&self) -> Result<AppSettings, StorageError> {
        self.get_item_or(keys::APP_SETTINGS, AppSettings::default())
            .await
    }

    /// Fusionne `patch` dans les préférences courantes
    pub async fn update_app_settings(&self, patch: &Value) -> Result<AppSettings, StorageError> {
        let Value::Object(patch) = patch else {
            return Err(StorageError::InvalidPatch(format!(
                "expected a JSON object, got {patch}"
            )));
        };

        let current = serde_json::to_value(self.app_settings().await?)
            .map_err(|e| StorageError::InvalidPatch(e.to_string()))?;
        let mut merged = match current {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        merged.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
        let settings: AppSettings = serde_json::from_value(Value::Object(merged))
            .map_err(|e| StorageError::InvalidPatch(e.to_string()))?;

        self.set_item(keys::APP_SETTINGS, &settings, None).await?;
        Ok(settings)
    }
}

//! Sauvegarde et restauration des collections de l'application

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::models::{Appointment, Notification, RegisteredUser};
use crate::storage::{keys, StorageError, StorageService};

/// `null` se lit comme la valeur par défaut
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Le contenu d'une sauvegarde. Les champs absents ou `null` valent une
/// collection vide.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupData {
    #[serde(deserialize_with = "null_as_default")]
    pub appointments: Vec<Appointment>,
    #[serde(deserialize_with = "null_as_default")]
    pub notifications: Vec<Notification>,
    #[serde(deserialize_with = "null_as_default")]
    pub registered_users: Vec<RegisteredUser>,
    #[serde(deserialize_with = "null_as_default")]
    pub settings: Map<String, Value>,
}

/// Enveloppe horodatée d'une sauvegarde
#[derive(Debug, Serialize, Deserialize)]
pub struct Backup {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BackupData>,
}

impl StorageService {
    /// Photographie les quatre collections connues en un seul document JSON
    pub async fn create_backup(&self) -> Result<String, StorageError> {
        let data = BackupData {
            appointments: self.appointments().await?,
            notifications: self.notifications().await?,
            registered_users: self.registered_users().await?,
            settings: self.get_item_or(keys::APP_SETTINGS, Map::new()).await?,
        };
        let timestamp = Utc::now();
        let backup = Backup {
            timestamp: Some(timestamp),
            data: Some(data),
        };

        let blob = serde_json::to_string(&backup).map_err(|source| StorageError::Serialize {
            key: "backup".to_owned(),
            source,
        })?;
        info!("Backup created at {timestamp}");
        Ok(blob)
    }

    /// Remplace chaque collection par celle de la sauvegarde.
    ///
    /// Une sauvegarde sans `data` ne restaure rien.
    pub async fn restore_from_backup(&self, blob: &str) -> Result<(), StorageError> {
        let backup: Backup = serde_json::from_str(blob).map_err(StorageError::InvalidBackup)?;
        let taken_at = backup
            .timestamp
            .map_or_else(|| "an unknown date".to_owned(), |t| t.to_rfc3339());

        let Some(data) = backup.data else {
            warn!("Backup from {taken_at} has no data, nothing restored");
            return Ok(());
        };

        self.save_appointments(&data.appointments).await?;
        self.save_notifications(&data.notifications).await?;
        self.save_registered_users(&data.registered_users).await?;
        self.set_item(keys::APP_SETTINGS, &data.settings, None)
            .await?;

        info!("Backup from {taken_at} restored");
        Ok(())
    }
}

//! Modèle de données

use derive_more::Display;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::password_utils::PWHash;

/// Un enregistrement persisté dans une collection, identifié par son `id`.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn record_id(&self) -> &str;
}

/// Un identifiant unique d'utilisateur.
#[derive(
    Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Display, Default,
)]
#[serde(transparent)]
pub struct UserID(String);

impl UserID {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserID {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Un identifiant unique de rendez-vous
#[derive(
    Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Display, Default,
)]
#[serde(transparent)]
pub struct AppointmentID(String);

impl AppointmentID {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AppointmentID {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// État d'un rendez-vous.
///
/// Les valeurs inconnues sont conservées telles quelles dans `Other`:
/// elles comptent dans les totaux mais dans aucune catégorie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Other(String),
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Other(other) => other,
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AppointmentStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "pending" => AppointmentStatus::Pending,
            "confirmed" => AppointmentStatus::Confirmed,
            "cancelled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Other(status),
        }
    }
}

impl From<AppointmentStatus> for String {
    fn from(status: AppointmentStatus) -> Self {
        match status {
            AppointmentStatus::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

/// Un rendez-vous entre un patient et un médecin.
///
/// La date est stockée en texte `JJ/MM/AAAA`, l'heure est le libellé du créneau.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[display("{date} {time} ({specialty}, {status})")]
pub struct Appointment {
    pub id: AppointmentID,
    pub patient_id: UserID,
    #[serde(default)]
    pub patient_name: String,
    pub doctor_id: UserID,
    #[serde(default)]
    pub doctor_name: String,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub specialty: String,
    pub status: AppointmentStatus,
}

impl Record for Appointment {
    fn record_id(&self) -> &str {
        self.id.as_str()
    }
}

/// Role d'un utilisateur, avec les données propres à chaque rôle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Role {
    #[display("admin")]
    Admin,
    #[display("doctor")]
    Doctor { specialty: String },
    #[display("patient")]
    Patient,
}

/// Les données publiques d'un utilisateur: identité commune et rôle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[display("{name} <{email}>")]
pub struct User {
    pub id: UserID,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub image: String,
    #[serde(flatten)]
    pub role: Role,
}

impl User {
    pub fn is_doctor(&self) -> bool {
        matches!(self.role, Role::Doctor { .. })
    }

    pub fn specialty(&self) -> Option<&str> {
        match &self.role {
            Role::Doctor { specialty } => Some(specialty),
            Role::Admin | Role::Patient => None,
        }
    }
}

/// Un utilisateur enregistré, tel que stocké.
///
/// Le mot de passe haché ne doit jamais sortir du stockage: utiliser
/// `RegisteredUser::public` pour exposer l'utilisateur.
#[derive(Debug, Clone, Serialize, Deserialize, Display)]
#[display("{user}")]
pub struct RegisteredUser {
    #[serde(flatten)]
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<PWHash>,
}

impl RegisteredUser {
    pub fn public(&self) -> User {
        self.user.clone()
    }
}

impl Record for RegisteredUser {
    fn record_id(&self) -> &str {
        self.user.id.as_str()
    }
}

/// Une notification adressée à un utilisateur.
///
/// Les champs inconnus sont conservés tels quels dans `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[display("{title}: {message}")]
pub struct Notification {
    pub id: String,
    pub user_id: UserID,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Notification {
    fn record_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Display)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    #[display("light")]
    Light,
    #[display("dark")]
    Dark,
}

/// Les préférences de l'application. Chaque option absente prend sa valeur par défaut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub theme: Theme,
    pub notifications: bool,
    pub language: String,
    pub auto_backup: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            notifications: true,
            language: "pt-BR".to_owned(),
            auto_backup: true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_status_is_preserved() {
        let status: AppointmentStatus = serde_json::from_value(json!("rescheduled")).unwrap();
        assert_eq!(status, AppointmentStatus::Other("rescheduled".to_owned()));
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("rescheduled"));

        let status: AppointmentStatus = serde_json::from_value(json!("confirmed")).unwrap();
        assert_eq!(status, AppointmentStatus::Confirmed);
    }

    #[test]
    fn test_user_role_is_a_flat_tag() {
        let raw = json!({
            "id": "1",
            "name": "Dr. João Silva",
            "email": "joao@example.com",
            "role": "doctor",
            "specialty": "Cardiologia",
        });

        let user: RegisteredUser = serde_json::from_value(raw).unwrap();
        assert_eq!(user.user.specialty(), Some("Cardiologia"));
        assert!(user.password.is_none());

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["role"], "doctor");
        assert_eq!(back["specialty"], "Cardiologia");
        assert!(back.get("password").is_none());
    }

    #[test]
    fn test_patient_has_no_payload() {
        let raw = json!({ "id": "p1", "name": "Ana", "email": "ana@example.com", "role": "patient" });
        let user: User = serde_json::from_value(raw).unwrap();
        assert_eq!(user.role, Role::Patient);
        assert_eq!(user.specialty(), None);
    }

    #[test]
    fn test_settings_fill_missing_options() {
        let settings: AppSettings = serde_json::from_value(json!({ "theme": "dark" })).unwrap();
        assert_eq!(settings.theme, Theme::Dark);
        assert!(settings.notifications);
        assert_eq!(settings.language, "pt-BR");
        assert!(settings.auto_backup);
    }

    #[test]
    fn test_notification_keeps_extra_fields() {
        let raw = json!({ "id": "n1", "userId": "u1", "message": "hi", "appointmentId": "a1" });
        let notification: Notification = serde_json::from_value(raw).unwrap();
        assert!(!notification.read);
        assert_eq!(notification.extra["appointmentId"], "a1");
        assert_eq!(serde_json::to_value(&notification).unwrap()["appointmentId"], "a1");
    }
}

//! Comptes utilisateurs: inscription, connexion et session courante.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::models::{RegisteredUser, Role, User, UserID};
use crate::storage::{keys, StorageError, StorageService};
use crate::utils::input_validation::{password_validation, Email, MIN_PASSWORD_LEN};
use crate::utils::password_utils::{hash, verify, HashError};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Email invalide")]
    InvalidEmail,

    #[error("Le nom ne peut pas être vide")]
    EmptyName,

    #[error("Utilisateur inconnu: {0}")]
    UnknownUser(String),

    #[error("Le mot de passe doit contenir au moins {} caractères et différer de l'email", MIN_PASSWORD_LEN)]
    WeakPassword,

    #[error("Email déjà utilisé")]
    EmailTaken,

    #[error("Email ou mot de passe invalide")]
    InvalidCredentials,

    #[error("Impossible de hacher le mot de passe: {0}")]
    Hashing(HashError),
}

/// La session ouverte: l'utilisateur connecté et son jeton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

pub struct AccountService<'a> {
    storage: &'a StorageService,
}

impl<'a> AccountService<'a> {
    pub fn new(storage: &'a StorageService) -> Self {
        Self { storage }
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<RegisteredUser>, AccountError> {
        Ok(self
            .storage
            .registered_users()
            .await?
            .into_iter()
            .find(|u| u.user.email == email.as_ref()))
    }

    async fn create(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AccountError> {
        let email = Email::try_from(email).map_err(|_| AccountError::InvalidEmail)?;
        if !password_validation(password, email.as_ref()) {
            return Err(AccountError::WeakPassword);
        }
        if self.find_by_email(&email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let user = User {
            id: UserID::new(),
            name: name.trim().to_owned(),
            email: email.to_string(),
            image: String::new(),
            role,
        };
        let registered = RegisteredUser {
            user: user.clone(),
            password: Some(hash(password).map_err(AccountError::Hashing)?),
        };
        self.storage.add_user(registered).await?;

        info!("Compte {} créé pour {}", user.role, user.email);
        Ok(user)
    }

    async fn open_session(&self, user: User) -> Result<Session, AccountError> {
        let session = Session {
            token: format!("{}-token-{}", user.role, uuid::Uuid::new_v4()),
            user,
        };
        self.storage.set_item(keys::USER, &session.user, None).await?;
        self.storage.set_item(keys::TOKEN, &session.token, None).await?;
        Ok(session)
    }

    /// Inscrit un nouveau patient et ouvre sa session
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, AccountError> {
        let user = self.create(name, email, password, Role::Patient).await?;
        self.open_session(user).await
    }

    /// Crée un compte médecin, sans ouvrir de session
    pub async fn register_doctor(
        &self,
        name: &str,
        email: &str,
        password: &str,
        specialty: &str,
    ) -> Result<User, AccountError> {
        let role = Role::Doctor {
            specialty: specialty.trim().to_owned(),
        };
        self.create(name, email, password, role).await
    }

    /// Crée le compte administrateur s'il n'existe pas encore
    pub async fn ensure_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AccountError> {
        let exists = self
            .storage
            .registered_users()
            .await?
            .iter()
            .any(|u| u.user.role == Role::Admin);
        if !exists {
            self.create(name, email, password, Role::Admin).await?;
        }
        Ok(())
    }

    /// Vérifie les identifiants et ouvre la session
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AccountError> {
        let user = match Email::try_from(email) {
            Ok(email) => self.find_by_email(&email).await?,
            Err(_) => None,
        };

        let stored_hash = user.as_ref().and_then(|u| u.password.as_ref());
        if !verify(password, stored_hash) {
            warn!("Échec de connexion pour {email}");
            return Err(AccountError::InvalidCredentials);
        }

        let user = user.ok_or(AccountError::InvalidCredentials)?;
        self.open_session(user.public()).await
    }

    /// Modifie le nom, l'email et, pour un médecin, la spécialité.
    ///
    /// Le compte enregistré et la session sont mis à jour tous les deux.
    pub async fn update_profile(
        &self,
        user: &User,
        name: &str,
        email: &str,
        specialty: Option<&str>,
    ) -> Result<User, AccountError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AccountError::EmptyName);
        }
        let email = Email::try_from(email).map_err(|_| AccountError::InvalidEmail)?;

        let users = self.storage.registered_users().await?;
        if users
            .iter()
            .any(|u| u.user.email == email.as_ref() && u.user.id != user.id)
        {
            return Err(AccountError::EmailTaken);
        }
        let Some(stored) = users.iter().find(|u| u.user.id == user.id) else {
            return Err(AccountError::UnknownUser(user.id.to_string()));
        };

        let mut updated = stored.public();
        updated.name = name.to_owned();
        updated.email = email.to_string();
        let specialty = specialty.map(str::trim).filter(|s| !s.is_empty());
        if let (Role::Doctor { specialty: current }, Some(specialty)) = (&mut updated.role, specialty) {
            *current = specialty.to_owned();
        }

        let mut patch = json!({ "name": updated.name, "email": updated.email });
        if let Some(specialty) = updated.specialty() {
            patch["specialty"] = json!(specialty);
        }
        self.storage.update_user(user.id.as_str(), &patch).await?;
        self.storage.set_item(keys::USER, &updated, None).await?;

        info!("Profil de {} mis à jour", updated.id);
        Ok(updated)
    }

    /// Ferme la session
    pub async fn sign_out(&self) -> Result<(), AccountError> {
        self.storage.remove_item(keys::USER).await?;
        self.storage.remove_item(keys::TOKEN).await?;
        Ok(())
    }

    pub async fn current_user(&self) -> Result<Option<User>, AccountError> {
        Ok(self.storage.get_item(keys::USER).await?)
    }

    /// Les médecins enregistrés, pour la prise de rendez-vous
    pub async fn doctors(&self) -> Result<Vec<User>, AccountError> {
        Ok(self
            .storage
            .registered_users()
            .await?
            .iter()
            .map(RegisteredUser::public)
            .filter(User::is_doctor)
            .collect())
    }
}

//! Hachage et vérification des mots de passe des comptes enregistrés

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHashString, PasswordVerifier, SaltString},
    Argon2, PasswordHasher,
};
use derive_more::derive::Display;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use argon2::password_hash::Error as HashError;

static DEFAULT_HASHER: Lazy<Argon2<'static>> = Lazy::new(Argon2::default);

/// Le hash d'un mot de passe vide, vérifié quand le compte n'existe pas
/// pour que la durée de la vérification ne trahisse pas les emails connus.
static EMPTY_HASH: Lazy<Option<PWHash>> = Lazy::new(|| hash("").ok());

/// Un mot de passe haché, sérialisé au format PHC
#[derive(Clone, Debug, Display)]
pub struct PWHash(PasswordHashString);

impl Serialize for PWHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PWHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let hash = PasswordHashString::from_str(&s)
            .map_err(|_| <D::Error as serde::de::Error>::custom("Invalid PHC string"))?;
        Ok(PWHash(hash))
    }
}

/// Calcule un haché a partir d'un mot de passe en clair, avec un sel aléatoire
pub fn hash(password: &str) -> Result<PWHash, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = DEFAULT_HASHER
        .hash_password(password.as_bytes(), &salt)?
        .serialize();

    Ok(PWHash(hash))
}

/// Vérifie si le mot de passe correspond au hash stocké.
///
/// Sans hash (compte inconnu ou sans mot de passe), le mot de passe est
/// tout de même testé contre un faux hash, et la réponse est toujours non.
pub fn verify(password: &str, maybe_hash: Option<&PWHash>) -> bool {
    let Some(hash) = maybe_hash.or(EMPTY_HASH.as_ref()) else {
        return false;
    };

    let matches = DEFAULT_HASHER
        .verify_password(password.as_bytes(), &hash.0.password_hash())
        .is_ok();

    matches && maybe_hash.is_some()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hashed = hash("123456").unwrap();
        assert!(verify("123456", Some(&hashed)));
        assert!(!verify("654321", Some(&hashed)));
    }

    #[test]
    fn test_missing_hash_never_verifies() {
        assert!(!verify("", None), "Empty password accepted for an unknown account");
        assert!(!verify("123456", None));
    }

    #[test]
    fn test_hash_survives_serialization() {
        let hashed = hash("secret-pw").unwrap();
        let text = serde_json::to_string(&hashed).unwrap();
        let back: PWHash = serde_json::from_str(&text).unwrap();
        assert!(verify("secret-pw", Some(&back)));
    }

    #[test]
    fn test_rejects_non_phc_string() {
        assert!(serde_json::from_str::<PWHash>("\"plaintext\"").is_err());
    }
}

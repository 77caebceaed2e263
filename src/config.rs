//! Configuration lue dans l'environnement (et dans un éventuel fichier `.env`)

use log::LevelFilter;
use std::{path::PathBuf, str::FromStr};
use thiserror::Error;

const DATA_FILE: &str = "medagenda.json";
const LOG_FILE: &str = "./medagenda.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Niveau de log inconnu: {0}")]
    InvalidLogLevel(String),
}

/// Le compte administrateur créé au premier démarrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_file: PathBuf,
    pub log_file: PathBuf,
    pub log_level: LevelFilter,
    pub admin: Option<AdminSeed>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_level = match lookup("MEDAGENDA_LOG_LEVEL") {
            Some(level) => {
                LevelFilter::from_str(&level).map_err(|_| ConfigError::InvalidLogLevel(level))?
            }
            None => LevelFilter::Info,
        };

        let admin = match (
            lookup("MEDAGENDA_ADMIN_EMAIL"),
            lookup("MEDAGENDA_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            _ => None,
        };

        Ok(Self {
            data_file: lookup("MEDAGENDA_DATA_FILE")
                .unwrap_or_else(|| DATA_FILE.to_owned())
                .into(),
            log_file: lookup("MEDAGENDA_LOG_FILE")
                .unwrap_or_else(|| LOG_FILE.to_owned())
                .into(),
            log_level,
            admin,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| vars.get(name).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.data_file, PathBuf::from("medagenda.json"));
        assert_eq!(config.log_file, PathBuf::from("./medagenda.log"));
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.admin, None);
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            ("MEDAGENDA_DATA_FILE", "/tmp/agenda.json"),
            ("MEDAGENDA_LOG_LEVEL", "debug"),
            ("MEDAGENDA_ADMIN_EMAIL", "admin@example.com"),
            ("MEDAGENDA_ADMIN_PASSWORD", "123456"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.data_file, PathBuf::from("/tmp/agenda.json"));
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(
            config.admin,
            Some(AdminSeed {
                email: "admin@example.com".to_owned(),
                password: "123456".to_owned(),
            })
        );
    }

    #[test]
    fn test_admin_needs_both_variables() {
        let vars = HashMap::from([("MEDAGENDA_ADMIN_EMAIL", "admin@example.com")]);
        assert_eq!(Config::from_lookup(lookup(&vars)).unwrap().admin, None);
    }

    #[test]
    fn test_invalid_log_level() {
        let vars = HashMap::from([("MEDAGENDA_LOG_LEVEL", "loud")]);
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::InvalidLogLevel(level)) if level == "loud"
        ));
    }
}

//! Stockage clé-valeur externe: chaînes de caractères indexées par clé.
//!
//! `MemoryStore` garde tout en mémoire, `FileStore` sauvegarde le tout dans
//! un document JSON après chaque modification.

use async_trait::async_trait;
use log::info;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, ErrorKind::NotFound},
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;

/// Capacités attendues du stockage persistant sous-jacent.
///
/// Toutes les opérations peuvent échouer avec une erreur d'IO générique.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> io::Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> io::Result<()>;
    async fn remove(&self, key: &str) -> io::Result<()>;
    async fn clear(&self) -> io::Result<()>;
    async fn list_keys(&self) -> io::Result<Vec<String>>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> io::Result<()> {
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> io::Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn list_keys(&self) -> io::Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// Un stockage persistant dans un fichier JSON unique.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: PathBuf) -> Result<Self, io::Error> {
        match File::open(&path) {
            Ok(f) => {
                let entries: BTreeMap<String, String> = serde_json::from_reader(f)?;
                info!("Loaded {} keys from {}", entries.len(), path.display());
                Ok(Self {
                    path,
                    entries: RwLock::new(entries),
                })
            }

            // Fichier non existant, on le crée
            Err(not_found) if not_found.kind() == NotFound => {
                info!("Store file not found, creating new empty store");
                let entries = BTreeMap::new();
                // On vérifie la sauvegarde immédiatement pour diminuer le risque de perte de données
                std::fs::write(&path, Self::encode(&entries)?)?;
                Ok(Self {
                    path,
                    entries: RwLock::new(entries),
                })
            }

            Err(other) => Err(other),
        }
    }

    fn encode(entries: &BTreeMap<String, String>) -> Result<Vec<u8>, io::Error> {
        Ok(serde_json::to_vec_pretty(entries)?)
    }

    /// Réécrit le document entier. Appelé sous le verrou d'écriture, pour que
    /// les sauvegardes se succèdent dans l'ordre des modifications.
    async fn save(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), io::Error> {
        tokio::fs::write(path, Self::encode(entries)?).await
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> io::Result<()> {
        let mut entries = self.entries.write().await;
        let previous = entries.insert(key.to_owned(), value);
        if let Err(e) = Self::save(&self.path, &entries).await {
            // Le fichier fait foi: on annule la modification en mémoire
            match previous {
                Some(previous) => entries.insert(key.to_owned(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(previous) = entries.remove(key) {
            if let Err(e) = Self::save(&self.path, &entries).await {
                entries.insert(key.to_owned(), previous);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn clear(&self) -> io::Result<()> {
        let mut entries = self.entries.write().await;
        Self::save(&self.path, &BTreeMap::new()).await?;
        entries.clear();
        Ok(())
    }

    async fn list_keys(&self) -> io::Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

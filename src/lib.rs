//! Prise de rendez-vous médicaux sur un stockage clé-valeur local.

pub mod accounts;
pub mod backup;
pub mod booking;
pub mod cache;
pub mod config;
pub mod models;
pub mod statistics;
pub mod storage;
pub mod store;
pub mod utils;

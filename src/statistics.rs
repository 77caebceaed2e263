//! Statistiques calculées sur les rendez-vous.
//!
//! Rien n'est persisté: chaque appel relit la collection courante.

use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::models::{Appointment, AppointmentStatus, UserID};
use crate::storage::{StorageError, StorageService};

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Impossible de charger les données: {0}")]
    Storage(#[from] StorageError),
}

/// Périmètre d'un calcul de statistiques
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Doctor(UserID),
    Patient(UserID),
}

impl Scope {
    fn includes(&self, appointment: &Appointment) -> bool {
        match self {
            Scope::All => true,
            Scope::Doctor(doctor) => &appointment.doctor_id == doctor,
            Scope::Patient(patient) => &appointment.patient_id == patient,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusPercentages {
    pub confirmed: f64,
    pub pending: f64,
    pub cancelled: f64,
}

/// Un instantané des statistiques.
///
/// Les champs à `None` ne sont pas calculés pour ce périmètre, ce qui
/// n'est pas la même chose que zéro.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_appointments: usize,
    pub confirmed_appointments: usize,
    pub pending_appointments: usize,
    pub cancelled_appointments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_patients: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_doctors: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialties: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointments_by_month: Option<BTreeMap<String, usize>>,
    pub status_percentages: StatusPercentages,
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// `JJ/MM/AAAA` devient `MM/AAAA`
fn month_key(date: &str) -> Option<String> {
    let parts: Vec<&str> = date.split('/').collect();
    match parts.as_slice() {
        [day, month, year] if [day, month, year].iter().all(|p| !p.trim().is_empty()) => {
            Some(format!("{}/{}", month.trim(), year.trim()))
        }
        _ => None,
    }
}

fn histogram<'a>(labels: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label.to_owned()).or_insert(0) += 1;
    }
    counts
}

fn distinct<'a>(ids: impl Iterator<Item = &'a UserID>) -> usize {
    ids.collect::<BTreeSet<_>>().len()
}

/// Calcule les statistiques du périmètre sur une collection déjà chargée
pub fn summarize(appointments: &[Appointment], scope: &Scope) -> Statistics {
    let selected: Vec<&Appointment> = appointments.iter().filter(|a| scope.includes(a)).collect();

    let count = |status: AppointmentStatus| selected.iter().filter(|a| a.status == status).count();
    let total = selected.len();
    let confirmed = count(AppointmentStatus::Confirmed);
    let pending = count(AppointmentStatus::Pending);
    let cancelled = count(AppointmentStatus::Cancelled);

    let patients = || distinct(selected.iter().map(|a| &a.patient_id));
    let doctors = || distinct(selected.iter().map(|a| &a.doctor_id));
    let specialties = || histogram(selected.iter().map(|a| a.specialty.as_str()));

    let (total_patients, total_doctors, specialties, appointments_by_month) = match scope {
        Scope::All => {
            let months = selected.iter().filter_map(|a| {
                let key = month_key(&a.date);
                if key.is_none() {
                    warn!("Invalid date {:?} in appointment {}, skipped", a.date, a.id);
                }
                key
            });
            let mut by_month = BTreeMap::new();
            for month in months {
                *by_month.entry(month).or_insert(0) += 1;
            }
            (Some(patients()), Some(doctors()), Some(specialties()), Some(by_month))
        }
        Scope::Doctor(_) => (Some(patients()), None, None, None),
        Scope::Patient(_) => (None, Some(doctors()), Some(specialties()), None),
    };

    Statistics {
        total_appointments: total,
        confirmed_appointments: confirmed,
        pending_appointments: pending,
        cancelled_appointments: cancelled,
        total_patients,
        total_doctors,
        specialties,
        appointments_by_month,
        status_percentages: StatusPercentages {
            confirmed: percentage(confirmed, total),
            pending: percentage(pending, total),
            cancelled: percentage(cancelled, total),
        },
    }
}

/// Calcul des statistiques à partir du stockage. Ne fait jamais d'écriture.
pub struct StatisticsService<'a> {
    storage: &'a StorageService,
}

impl<'a> StatisticsService<'a> {
    pub fn new(storage: &'a StorageService) -> Self {
        Self { storage }
    }

    pub async fn compute(&self, scope: &Scope) -> Result<Statistics, AggregationError> {
        let appointments = self.storage.appointments().await?;
        if *scope == Scope::All {
            let users = self.storage.registered_users().await?;
            debug!(
                "Computing statistics over {} appointments, {} registered users",
                appointments.len(),
                users.len()
            );
        }
        Ok(summarize(&appointments, scope))
    }

    pub async fn general(&self) -> Result<Statistics, AggregationError> {
        self.compute(&Scope::All).await
    }

    pub async fn for_doctor(&self, doctor: &UserID) -> Result<Statistics, AggregationError> {
        self.compute(&Scope::Doctor(doctor.clone())).await
    }

    pub async fn for_patient(&self, patient: &UserID) -> Result<Statistics, AggregationError> {
        self.compute(&Scope::Patient(patient.clone())).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::test::{appointment, memory_service, FlakyStore};
    use crate::storage::StorageService;
    use crate::store::{KeyValueStore, MemoryStore};
    use std::sync::{atomic::Ordering, Arc};

    fn sample() -> Vec<Appointment> {
        vec![
            appointment("a1", "p1", "d1", "pending"),
            appointment("a2", "p2", "d1", "pending"),
            appointment("a3", "p1", "d2", "confirmed"),
            appointment("a4", "p3", "d2", "cancelled"),
        ]
    }

    fn assert_percentages_sum(stats: &Statistics) {
        let p = stats.status_percentages;
        let sum = p.confirmed + p.pending + p.cancelled;
        assert!((sum - 100.0).abs() < 1e-9, "Percentages sum to {sum}, expected 100");
    }

    #[test]
    fn test_status_counts_and_percentages() {
        let stats = summarize(&sample(), &Scope::All);

        assert_eq!(stats.total_appointments, 4);
        assert_eq!(stats.pending_appointments, 2);
        assert_eq!(stats.confirmed_appointments, 1);
        assert_eq!(stats.cancelled_appointments, 1);
        assert_eq!(stats.status_percentages.pending, 50.0);
        assert_eq!(stats.status_percentages.confirmed, 25.0);
        assert_eq!(stats.status_percentages.cancelled, 25.0);
        assert_percentages_sum(&stats);
    }

    #[test]
    fn test_empty_collection_has_zero_percentages() {
        for scope in [Scope::All, Scope::Doctor("d1".into()), Scope::Patient("p1".into())] {
            let stats = summarize(&[], &scope);
            assert_eq!(stats.total_appointments, 0);
            assert_eq!(stats.status_percentages, StatusPercentages::default());
        }
    }

    #[test]
    fn test_unknown_status_counts_in_total_only() {
        let mut appointments = sample();
        appointments.push(appointment("a5", "p1", "d1", "no-show"));
        let stats = summarize(&appointments, &Scope::All);

        assert_eq!(stats.total_appointments, 5);
        assert_eq!(
            stats.pending_appointments + stats.confirmed_appointments + stats.cancelled_appointments,
            4
        );
        assert_eq!(stats.status_percentages.pending, 40.0);
    }

    #[test]
    fn test_global_scope_computes_everything() {
        let mut appointments = sample();
        appointments[2].specialty = "Ortopedia".to_owned();
        appointments[3].date = "02/04/2024".to_owned();
        let stats = summarize(&appointments, &Scope::All);

        assert_eq!(stats.total_patients, Some(3));
        assert_eq!(stats.total_doctors, Some(2));
        let specialties = stats.specialties.unwrap();
        assert_eq!(specialties["Cardiologia"], 3);
        assert_eq!(specialties["Ortopedia"], 1);
        let months = stats.appointments_by_month.unwrap();
        assert_eq!(months["03/2024"], 3);
        assert_eq!(months["04/2024"], 1);
    }

    #[test]
    fn test_invalid_date_is_skipped() {
        let mut appointments = sample();
        appointments[0].date = "invalid".to_owned();
        appointments[1].date = "15//2024".to_owned();
        let stats = summarize(&appointments, &Scope::All);

        assert_eq!(stats.total_appointments, 4, "Invalid dates still count in the total");
        let months = stats.appointments_by_month.unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months["03/2024"], 2);
    }

    #[test]
    fn test_month_key() {
        assert_eq!(month_key("15/03/2024").as_deref(), Some("03/2024"));
        assert_eq!(month_key("invalid"), None);
        assert_eq!(month_key("15/03"), None);
        assert_eq!(month_key("15/03/2024/1"), None);
    }

    #[test]
    fn test_doctor_scope() {
        let stats = summarize(&sample(), &Scope::Doctor("d1".into()));

        assert_eq!(stats.total_appointments, 2);
        assert_eq!(stats.pending_appointments, 2);
        assert_eq!(stats.status_percentages.pending, 100.0);
        assert_eq!(stats.total_patients, Some(2));
        assert_eq!(stats.total_doctors, None);
        assert_eq!(stats.specialties, None);
        assert_eq!(stats.appointments_by_month, None);
    }

    #[test]
    fn test_patient_scope() {
        let stats = summarize(&sample(), &Scope::Patient("p1".into()));

        assert_eq!(stats.total_appointments, 2);
        assert_eq!(stats.total_doctors, Some(2));
        assert_eq!(stats.total_patients, None);
        assert_eq!(stats.specialties.as_ref().unwrap()["Cardiologia"], 2);
        assert_eq!(stats.appointments_by_month, None);
        assert_percentages_sum(&stats);
    }

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let stats = summarize(&sample(), &Scope::Doctor("d1".into()));
        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["totalAppointments"], 2);
        assert_eq!(json["totalPatients"], 2);
        assert!(json.get("totalDoctors").is_none());
        assert!(json.get("appointmentsByMonth").is_none());
    }

    #[tokio::test]
    async fn test_service_reads_current_collection() {
        let storage = memory_service();
        for appointment in sample() {
            storage.add_appointment(appointment).await.unwrap();
        }
        let statistics = StatisticsService::new(&storage);

        assert_eq!(statistics.general().await.unwrap().total_appointments, 4);
        assert_eq!(statistics.for_doctor(&"d2".into()).await.unwrap().total_appointments, 2);
        assert_eq!(statistics.for_patient(&"p3".into()).await.unwrap().cancelled_appointments, 1);

        storage.delete_appointment("a4").await.unwrap();
        assert_eq!(statistics.general().await.unwrap().total_appointments, 3);
    }

    #[tokio::test]
    async fn test_unreachable_store_yields_empty_statistics() {
        let store = Arc::new(FlakyStore::default());
        store.failing.store(true, Ordering::SeqCst);
        let storage = StorageService::new(store);

        let stats = StatisticsService::new(&storage).general().await.unwrap();
        assert_eq!(stats.total_appointments, 0);
        assert_eq!(stats.status_percentages, StatusPercentages::default());
    }

    #[tokio::test]
    async fn test_unreadable_collection_is_propagated() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(crate::storage::keys::APPOINTMENTS, "{broken".to_owned())
            .await
            .unwrap();
        let storage = StorageService::new(store);

        let result = StatisticsService::new(&storage).general().await;
        assert!(matches!(
            result,
            Err(AggregationError::Storage(StorageError::Deserialize { .. }))
        ));
    }
}

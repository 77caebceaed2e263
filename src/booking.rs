//! Prise de rendez-vous et notifications associées

use chrono::Utc;
use log::info;
use serde_json::{json, Map};
use thiserror::Error;

use crate::models::{Appointment, AppointmentID, AppointmentStatus, Notification, User, UserID};
use crate::storage::{StorageError, StorageService};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Rendez-vous inexistant: {0}")]
    NotFound(String),

    #[error("{0} n'est pas médecin")]
    NotADoctor(String),
}

/// Les créneaux d'une journée: de 09:00 à 17:30, toutes les 30 minutes
pub fn time_slots() -> Vec<String> {
    (9..18)
        .flat_map(|hour| [format!("{hour:02}:00"), format!("{hour:02}:30")])
        .collect()
}

pub struct BookingService<'a> {
    storage: &'a StorageService,
}

impl<'a> BookingService<'a> {
    pub fn new(storage: &'a StorageService) -> Self {
        Self { storage }
    }

    async fn notify(
        &self,
        user_id: &UserID,
        title: &str,
        message: String,
        appointment: &AppointmentID,
    ) -> Result<(), StorageError> {
        let mut extra = Map::new();
        extra.insert("appointmentId".to_owned(), json!(appointment));
        self.storage
            .add_notification(Notification {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.clone(),
                title: title.to_owned(),
                message,
                read: false,
                created_at: Utc::now().to_rfc3339(),
                extra,
            })
            .await
    }

    /// Crée un rendez-vous en attente et prévient le médecin
    pub async fn book(
        &self,
        patient: &User,
        doctor: &User,
        date: &str,
        time: &str,
    ) -> Result<Appointment, BookingError> {
        let specialty = doctor
            .specialty()
            .ok_or_else(|| BookingError::NotADoctor(doctor.name.clone()))?;

        let appointment = Appointment {
            id: AppointmentID::new(),
            patient_id: patient.id.clone(),
            patient_name: patient.name.clone(),
            doctor_id: doctor.id.clone(),
            doctor_name: doctor.name.clone(),
            date: date.trim().to_owned(),
            time: time.to_owned(),
            specialty: specialty.to_owned(),
            status: AppointmentStatus::Pending,
        };
        self.storage.add_appointment(appointment.clone()).await?;

        self.notify(
            &doctor.id,
            "Nova consulta agendada",
            format!(
                "{} agendou uma consulta para {} às {}",
                patient.name, appointment.date, appointment.time
            ),
            &appointment.id,
        )
        .await?;

        info!("Rendez-vous {} créé", appointment.id);
        Ok(appointment)
    }

    async fn set_status(
        &self,
        id: &str,
        status: AppointmentStatus,
    ) -> Result<Appointment, BookingError> {
        let appointments = self.storage.appointments().await?;
        let Some(appointment) = appointments.into_iter().find(|a| a.id.as_str() == id) else {
            return Err(BookingError::NotFound(id.to_owned()));
        };

        self.storage
            .update_appointment(id, &json!({ "status": status }))
            .await?;

        let (title, verb) = match status {
            AppointmentStatus::Confirmed => ("Consulta confirmada", "confirmada"),
            _ => ("Consulta cancelada", "cancelada"),
        };
        self.notify(
            &appointment.patient_id,
            title,
            format!(
                "Sua consulta de {} às {} foi {verb}",
                appointment.date, appointment.time
            ),
            &appointment.id,
        )
        .await?;

        info!("Rendez-vous {id}: {status}");
        Ok(Appointment {
            status,
            ..appointment
        })
    }

    pub async fn confirm(&self, id: &str) -> Result<Appointment, BookingError> {
        self.set_status(id, AppointmentStatus::Confirmed).await
    }

    pub async fn cancel(&self, id: &str) -> Result<Appointment, BookingError> {
        self.set_status(id, AppointmentStatus::Cancelled).await
    }

    pub async fn appointments_of(&self, user: &User) -> Result<Vec<Appointment>, BookingError> {
        Ok(self
            .storage
            .appointments()
            .await?
            .into_iter()
            .filter(|a| a.patient_id == user.id || a.doctor_id == user.id)
            .collect())
    }

    pub async fn notifications_of(&self, user: &UserID) -> Result<Vec<Notification>, BookingError> {
        Ok(self
            .storage
            .notifications()
            .await?
            .into_iter()
            .filter(|n| &n.user_id == user)
            .collect())
    }

    pub async fn unread_count(&self, user: &UserID) -> Result<usize, BookingError> {
        Ok(self
            .notifications_of(user)
            .await?
            .iter()
            .filter(|n| !n.read)
            .count())
    }

    pub async fn mark_as_read(&self, notification: &str) -> Result<(), BookingError> {
        self.storage
            .update_notification(notification, &json!({ "read": true }))
            .await?;
        Ok(())
    }
}

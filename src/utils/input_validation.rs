use derive_more::derive::Display;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

// Regex for email addresses: one '@', no whitespace, a dotted domain
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Failed to compile email regex")
});

pub const MIN_PASSWORD_LEN: usize = 6;

const APPOINTMENT_STATUSES: [&str; 3] = ["pending", "confirmed", "cancelled"];
const USER_ROLES: [&str; 3] = ["admin", "doctor", "patient"];

#[derive(Debug, Clone, Copy, Display, Error)]
pub struct InvalidInput;

/// Wrapper type for an email address that has been validated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct Email(String);

impl TryFrom<&str> for Email {
    type Error = InvalidInput;

    fn try_from(email: &str) -> Result<Self, Self::Error> {
        let email = email.trim();
        if EMAIL_REGEX.is_match(email) {
            Ok(Self(email.to_owned()))
        } else {
            Err(InvalidInput)
        }
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Checks that a password is long enough and is not the email itself
pub fn password_validation(password: &str, email: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN && !password.eq_ignore_ascii_case(email)
}

fn has_str(record: &Value, field: &str) -> bool {
    record.get(field).is_some_and(Value::is_string)
}

fn has_one_of(record: &Value, field: &str, allowed: &[&str]) -> bool {
    record
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|value| allowed.contains(&value))
}

/// Structural check of a raw appointment record.
///
/// Advisory only: the storage layer never calls it.
pub fn validate_appointment(appointment: &Value) -> bool {
    appointment.is_object()
        && ["id", "patientId", "doctorId", "date", "time"]
            .iter()
            .all(|field| has_str(appointment, field))
        && has_one_of(appointment, "status", &APPOINTMENT_STATUSES)
}

/// Structural check of a raw user record
pub fn validate_user(user: &Value) -> bool {
    user.is_object()
        && ["id", "name", "email"]
            .iter()
            .all(|field| has_str(user, field))
        && has_one_of(user, "role", &USER_ROLES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod email_wrapper_tests {
        use super::*;

        #[test]
        fn test_valid_email() {
            let valid_cases = vec!["joao@example.com", "maria.santos@clinic.com.br", " admin@example.com "];

            for email in valid_cases {
                assert!(Email::try_from(email).is_ok(), "Valid email {} was rejected !", email);
            }
        }

        #[test]
        fn test_invalid_email() {
            let invalid_cases = vec!["", "joao", "joao@", "@example.com", "jo ao@example.com", "a@b"];

            for email in invalid_cases {
                assert!(Email::try_from(email).is_err(), "Invalid email {} was approved !", email);
            }
        }

        #[test]
        fn test_email_is_trimmed() {
            let email = Email::try_from("  ana@example.com").unwrap();
            assert_eq!(email.as_ref(), "ana@example.com");
        }
    }

    mod password_tests {
        use super::*;

        #[test]
        fn test_password_length_boundaries() {
            assert!(!password_validation("12345", "ana@example.com"));
            assert!(password_validation("123456", "ana@example.com"));
        }

        #[test]
        fn test_password_equal_to_email() {
            assert!(!password_validation("Ana@Example.com", "ana@example.com"),
                    "Password identical to email was accepted");
        }
    }

    mod record_validation_tests {
        use super::*;

        fn appointment() -> Value {
            json!({
                "id": "a1",
                "patientId": "p1",
                "doctorId": "1",
                "date": "15/03/2024",
                "time": "09:30",
                "specialty": "Cardiologia",
                "status": "pending",
            })
        }

        #[test]
        fn test_valid_appointment() {
            assert!(validate_appointment(&appointment()));
        }

        #[test]
        fn test_appointment_with_unknown_status() {
            let mut record = appointment();
            record["status"] = json!("rescheduled");
            assert!(!validate_appointment(&record));
        }

        #[test]
        fn test_appointment_with_missing_or_mistyped_field() {
            for field in ["id", "patientId", "doctorId", "date", "time"] {
                let mut record = appointment();
                record[field] = json!(42);
                assert!(!validate_appointment(&record), "Appointment with numeric {} was accepted", field);

                let mut record = appointment();
                record.as_object_mut().unwrap().remove(field);
                assert!(!validate_appointment(&record), "Appointment without {} was accepted", field);
            }
        }

        #[test]
        fn test_non_object_records() {
            assert!(!validate_appointment(&json!(null)));
            assert!(!validate_user(&json!(["id", "name"])));
        }

        #[test]
        fn test_user_validation() {
            let user = json!({ "id": "1", "name": "Ana", "email": "ana@example.com", "role": "patient" });
            assert!(validate_user(&user));

            let mut bad_role = user.clone();
            bad_role["role"] = json!("nurse");
            assert!(!validate_user(&bad_role));

            let mut no_email = user;
            no_email.as_object_mut().unwrap().remove("email");
            assert!(!validate_user(&no_email));
        }
    }
}

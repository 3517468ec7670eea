// src/auth/validators.rs

use super::models::RegisterRequest;
use crate::common::validation::is_plausible_email;
use crate::common::{ValidationResult, Validator};

const MAX_EMAIL_LEN: usize = 254;
const MAX_NAME_LEN: usize = 255;
// Bounds PBKDF2 input cost per request
const MAX_PASSWORD_LEN: usize = 1024;

/// Field checks shared by every path that creates a password account.
pub fn validate_new_account(
    email: Option<&str>,
    password: Option<&str>,
    name: Option<&str>,
) -> ValidationResult {
    let mut result = ValidationResult::new();

    result.require("email", email);
    if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
        if email.len() > MAX_EMAIL_LEN {
            result.add_error("email", "Email must be at most 254 characters");
        } else if !is_plausible_email(email) {
            result.add_error("email", "is not a valid address");
        }
    }

    result.require_non_empty("password", password);
    if password.map_or(false, |p| p.len() > MAX_PASSWORD_LEN) {
        result.add_error("password", "Password must be at most 1024 characters");
    }

    if name.map_or(false, |n| n.trim().len() > MAX_NAME_LEN) {
        result.add_error("name", "Name must be less than 255 characters");
    }

    result
}

pub struct RegistrationValidator;

impl Validator<RegisterRequest> for RegistrationValidator {
    fn validate(&self, data: &RegisterRequest) -> ValidationResult {
        validate_new_account(
            data.email.as_deref(),
            data.password.as_deref(),
            data.name.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: Option<&str>, password: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: email.map(str::to_string),
            password: password.map(str::to_string),
            name: None,
        }
    }

    #[test]
    fn test_valid_registration() {
        let result = RegistrationValidator.validate(&request(Some("a@x.com"), Some("pw")));
        assert!(result.is_valid);
    }

    #[test]
    fn test_missing_and_malformed_fields() {
        let result = RegistrationValidator.validate(&request(None, None));
        assert_eq!(result.errors.len(), 2);

        let result = RegistrationValidator.validate(&request(Some("nope"), Some("pw")));
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].field, "email");

        let result = RegistrationValidator.validate(&request(Some("a@x.com"), Some("")));
        assert_eq!(result.errors[0].field, "password");

        let long = "x".repeat(MAX_PASSWORD_LEN + 1);
        let result = RegistrationValidator.validate(&request(Some("a@x.com"), Some(&long)));
        assert_eq!(result.errors[0].field, "password");
    }
}

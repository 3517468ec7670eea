// src/admin/validators.rs

use super::models::CreateAdminRequest;
use crate::auth::validators::validate_new_account;
use crate::common::{ValidationResult, Validator};

pub struct CreateAdminValidator;

impl Validator<CreateAdminRequest> for CreateAdminValidator {
    fn validate(&self, data: &CreateAdminRequest) -> ValidationResult {
        validate_new_account(
            data.email.as_deref(),
            data.password.as_deref(),
            data.name.as_deref(),
        )
    }
}

use common::{AuditStamp, CustomerId};
use serde::{Deserialize, Serialize};

use crate::{BillingError, Result};

/// A borrower. Immutable once created apart from its audit stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

/// Onboarding request for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
}

impl NewCustomer {
    /// Rejects blank required fields and trims surrounding whitespace.
    pub fn normalized(self) -> Result<Self> {
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        let email = self.email.trim().to_lowercase();
        let phone_number = self.phone_number.trim().to_string();

        if first_name.is_empty() {
            return Err(BillingError::InvalidInput("first_name is required".into()));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(BillingError::InvalidInput("email is invalid".into()));
        }
        if phone_number.is_empty() {
            return Err(BillingError::InvalidInput("phone_number is required".into()));
        }

        Ok(Self {
            first_name,
            last_name,
            email,
            phone_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str) -> NewCustomer {
        NewCustomer {
            first_name: " Ada ".into(),
            last_name: "Lovelace".into(),
            email: email.into(),
            phone_number: "+62 811 000".into(),
        }
    }

    #[test]
    fn normalizes_fields() {
        let customer = request(" Ada@Example.com ").normalized().unwrap();
        assert_eq!(customer.first_name, "Ada");
        assert_eq!(customer.email, "ada@example.com");
    }

    #[test]
    fn rejects_bad_email() {
        let err = request("not-an-email").normalized().unwrap_err();
        assert!(matches!(err, BillingError::InvalidInput(_)));
    }
}

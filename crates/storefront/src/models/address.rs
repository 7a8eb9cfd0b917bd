//! Shipping addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rygstore_core::{AddressId, UserId};

/// A buyer's saved shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub full_name: String,
    pub phone_number: String,
    pub pincode: String,
    pub area: String,
    pub city: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl Address {
    /// Copy of the delivery fields, stored on the order at creation time.
    #[must_use]
    pub fn snapshot(&self) -> AddressSnapshot {
        AddressSnapshot {
            full_name: self.full_name.clone(),
            phone_number: self.phone_number.clone(),
            pincode: self.pincode.clone(),
            area: self.area.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
        }
    }
}

/// Delivery fields of an address as they were when an order was placed.
///
/// Later edits to the saved address do not change existing orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSnapshot {
    pub full_name: String,
    pub phone_number: String,
    pub pincode: String,
    pub area: String,
    pub city: String,
    pub state: String,
}

/// A field of a new address is blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("address field '{0}' must not be empty")]
pub struct AddressValidationError(pub &'static str);

/// Input for saving a new address.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAddress {
    pub full_name: String,
    pub phone_number: String,
    pub pincode: String,
    pub area: String,
    pub city: String,
    pub state: String,
}

impl NewAddress {
    /// Trim every field and reject blanks.
    ///
    /// # Errors
    ///
    /// Returns `AddressValidationError` naming the first empty field.
    pub fn normalized(self) -> Result<Self, AddressValidationError> {
        fn field(value: String, name: &'static str) -> Result<String, AddressValidationError> {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AddressValidationError(name));
            }
            Ok(trimmed.to_string())
        }

        Ok(Self {
            full_name: field(self.full_name, "fullName")?,
            phone_number: field(self.phone_number, "phoneNumber")?,
            pincode: field(self.pincode, "pincode")?,
            area: field(self.area, "area")?,
            city: field(self.city, "city")?,
            state: field(self.state, "state")?,
        })
    }
}

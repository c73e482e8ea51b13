//! Directory entries used to address notifications.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a notification is being written for; drives the wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Customer,
    Admin,
    Staff,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Customer => "customer",
            Audience::Admin => "admin",
            Audience::Staff => "staff",
        }
    }
}

/// A notifiable person: customer, admin or staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
}

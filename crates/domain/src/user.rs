//! Minimal user record.
//!
//! Profiles and credentials are managed by the auth service; the workflow
//! only needs enough to seed the initial admin account.

use chrono::{DateTime, Utc};
use common::{Role, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            email: email.into().trim().to_ascii_lowercase(),
            role,
            created_at: Utc::now(),
        }
    }
}

//! Startup initialisation steps.

use common::Role;
use domain::User;
use store::{Store, StoreError};

/// Makes sure an admin account exists for `email`.
///
/// Looks the email up first and only inserts when it is missing, so running
/// this on every start is harmless. Losing an insert race to another
/// instance is treated as success.
pub async fn ensure_admin<S: Store>(store: &S, name: &str, email: &str) -> store::Result<User> {
    if let Some(existing) = store.find_user_by_email(email).await? {
        if existing.role != Role::Admin {
            tracing::warn!(email = %existing.email, "bootstrap email belongs to a non-admin user");
        }
        return Ok(existing);
    }

    let admin = User::new(name, email, Role::Admin);
    match store.insert_user(&admin).await {
        Ok(()) => {
            tracing::info!(email = %admin.email, "admin account created");
            Ok(admin)
        }
        Err(StoreError::DuplicateKey(_)) => store
            .find_user_by_email(&admin.email)
            .await?
            .ok_or_else(|| StoreError::Aborted(format!("admin {} vanished after insert race", admin.email))),
        Err(e) => Err(e),
    }
}

use crate::entities::Role;
use crate::services::credential_store::{AuthError, CredentialStore};
use tracing::{info, warn};

/// Seeds the admin account when the user table is empty.
///
/// Nothing is created unless an admin password is configured.
pub async fn seed_admin(
    credentials: &CredentialStore,
    identifier: &str,
    password: Option<&str>,
) -> anyhow::Result<()> {
    if credentials.count().await? > 0 {
        return Ok(());
    }

    let Some(password) = password else {
        warn!("⚠️  No users exist and ADMIN_PASSWORD is not set; skipping admin seed");
        return Ok(());
    };

    info!("🌱 Seeding admin account '{}'...", identifier);
    match credentials
        .create_user(identifier, password, Role::Admin)
        .await
    {
        Ok(user) => {
            info!("✅ Admin account created (id {})", user.id);
            Ok(())
        }
        Err(AuthError::DuplicateIdentifier) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

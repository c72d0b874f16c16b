use crate::config::Config;
use crate::db::{NewIdentity, Store};
use crate::models::user::{Role, is_valid_email, is_valid_password, normalize_email};
use crate::services::passwords::generate_temp_password;

/// Creates an administrator, or promotes the account if the email already exists.
pub async fn cmd_create_admin(
    config: &Config,
    email: &str,
    full_name: Option<&str>,
    password: Option<&str>,
) -> anyhow::Result<()> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        anyhow::bail!("Invalid email address: {email}");
    }

    let store = Store::from_config(config).await?;

    if let Some(existing) = store.get_identity_by_email(&email).await? {
        store.set_role(&existing.id, Role::Admin).await?;
        println!("✓ Promoted {} to admin (ID: {})", existing.email, existing.id);
        return Ok(());
    }

    let security = &config.security;
    let generated = password
        .is_none()
        .then(|| generate_temp_password(security.temp_password_length));
    let password = password.or(generated.as_deref()).unwrap_or_default();

    if !is_valid_password(
        password,
        security.min_password_length,
        security.max_password_length,
    ) {
        anyhow::bail!(
            "Password must be between {} and {} characters",
            security.min_password_length,
            security.max_password_length
        );
    }

    let identity = store
        .create_identity(NewIdentity {
            email: &email,
            password,
            full_name,
            role: Role::Admin,
            email_confirmed: true,
            must_change_password: generated.is_some(),
            temp_password: generated.as_deref(),
            created_by: None,
        })
        .await?;

    println!("✓ Created admin {} (ID: {})", identity.email, identity.id);
    if let Some(temp) = generated {
        println!("  Temporary password: {temp}");
        println!("  It must be changed at first sign-in.");
    }

    Ok(())
}

pub async fn cmd_list_users(config: &Config) -> anyhow::Result<()> {
    let store = Store::from_config(config).await?;
    let profiles = store.list_profiles().await?;

    if profiles.is_empty() {
        println!("No accounts yet.");
        println!();
        println!("Create one with: fintrack create-admin <email>");
        return Ok(());
    }

    println!("Accounts ({} total)", profiles.len());
    println!("{:-<70}", "");

    for profile in profiles {
        let role = store.get_role(&profile.user_id).await?.unwrap_or_default();
        let last_login = store.last_login_for(&profile.user_id).await?;
        let status = if profile.is_active { "active" } else { "inactive" };

        println!(
            "{} [{}] {}",
            profile.email,
            role,
            profile.full_name.as_deref().unwrap_or("")
        );
        println!(
            "  ID: {} | Status: {} | Last login: {}",
            profile.user_id,
            status,
            last_login.as_deref().unwrap_or("never")
        );
    }

    Ok(())
}

use crate::config::Config;
use crate::db::Store;
use crate::services::RetentionScheduler;

pub async fn cmd_prune_logins(config: &Config, hours: Option<i64>) -> anyhow::Result<()> {
    let mut retention = config.retention.clone();
    if let Some(hours) = hours {
        if hours <= 0 {
            anyhow::bail!("Retention window must be > 0 hours");
        }
        retention.login_history_hours = hours;
    }

    let store = Store::from_config(config).await?;
    let window = retention.login_history_hours;
    let pruned = RetentionScheduler::new(store, retention).run_once().await?;

    println!("✓ Removed {pruned} login record(s) older than {window}h");
    Ok(())
}

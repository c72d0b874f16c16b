use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        // Keep the oldest pending request per email before enforcing uniqueness.
        conn.execute_unprepared(
            "DELETE FROM access_requests WHERE status = 'pending' AND id NOT IN \
             (SELECT MIN(id) FROM access_requests WHERE status = 'pending' GROUP BY email)",
        )
        .await?;

        conn.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_access_requests_pending_email \
             ON access_requests(email) WHERE status = 'pending'",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_access_requests_pending_email")
            .await?;

        Ok(())
    }
}

use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        // Identities first: every other user-owned table references it.
        manager
            .create_table(
                schema
                    .create_table_from_entity(Identities)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Profiles)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(UserRoles)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(AccessTokens)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(LoginHistory)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(AccessRequests)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Income)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Expenses)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Savings)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Savings).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Income).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AccessRequests).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LoginHistory).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AccessTokens).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserRoles).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Profiles).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Identities).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

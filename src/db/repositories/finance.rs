use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Select, Set, TransactionTrait,
};

use crate::entities::{expenses, income, prelude::*, savings};
use crate::models::finance::{
    DateRange, EntryUpdate, ExpenseEntry, FinanceKind, FinancialData, IncomeEntry, LedgerEntry, NewEntries,
    NewExpense, NewIncome, NewSaving, SavingEntry,
};

impl From<income::Model> for IncomeEntry {
    fn from(m: income::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            date: m.date,
            amount: m.amount,
            source: m.source,
            created_at: m.created_at,
        }
    }
}

impl From<expenses::Model> for ExpenseEntry {
    fn from(m: expenses::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            date: m.date,
            amount: m.amount,
            expense_details: m.expense_details,
            payment_mode: m.payment_mode,
            created_at: m.created_at,
        }
    }
}

impl From<savings::Model> for SavingEntry {
    fn from(m: savings::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            date: m.date,
            amount: m.amount,
            details: m.details,
            created_at: m.created_at,
        }
    }
}

/// Every query here is scoped to a single owner.
pub struct FinanceRepository {
    conn: DatabaseConnection,
}

impl FinanceRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add_income(&self, user_id: &str, entry: &NewIncome) -> Result<i64> {
        insert_income(&self.conn, user_id, entry).await
    }

    pub async fn add_expense(&self, user_id: &str, entry: &NewExpense) -> Result<i64> {
        insert_expense(&self.conn, user_id, entry).await
    }

    pub async fn add_saving(&self, user_id: &str, entry: &NewSaving) -> Result<i64> {
        insert_saving(&self.conn, user_id, entry).await
    }

    /// Stores every row or none of them.
    pub async fn insert_all(&self, user_id: &str, entries: &NewEntries) -> Result<u64> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to start import transaction")?;

        for entry in &entries.income {
            insert_income(&txn, user_id, entry).await?;
        }
        for entry in &entries.expenses {
            insert_expense(&txn, user_id, entry).await?;
        }
        for entry in &entries.savings {
            insert_saving(&txn, user_id, entry).await?;
        }

        txn.commit()
            .await
            .context("Failed to commit import transaction")?;

        Ok(entries.len() as u64)
    }

    /// Replaces the fields of one of the owner's rows and returns it as stored.
    /// Returns `None` when the row does not exist or belongs to someone else.
    pub async fn update(
        &self,
        user_id: &str,
        id: i64,
        update: &EntryUpdate,
    ) -> Result<Option<LedgerEntry>> {
        let stored = match update {
            EntryUpdate::Income(entry) => {
                let Some(row) = Income::find_by_id(id)
                    .filter(income::Column::UserId.eq(user_id))
                    .one(&self.conn)
                    .await?
                else {
                    return Ok(None);
                };

                let mut model: income::ActiveModel = row.into();
                model.date = Set(entry.date.clone());
                model.amount = Set(entry.amount);
                model.source = Set(entry.source.clone());

                let row = model
                    .update(&self.conn)
                    .await
                    .context("Failed to update income")?;
                LedgerEntry::Income(row.into())
            }
            EntryUpdate::Expense(entry) => {
                let Some(row) = Expenses::find_by_id(id)
                    .filter(expenses::Column::UserId.eq(user_id))
                    .one(&self.conn)
                    .await?
                else {
                    return Ok(None);
                };

                let mut model: expenses::ActiveModel = row.into();
                model.date = Set(entry.date.clone());
                model.amount = Set(entry.amount);
                model.expense_details = Set(entry.expense_details.clone());
                model.payment_mode = Set(entry.payment_mode.clone());

                let row = model
                    .update(&self.conn)
                    .await
                    .context("Failed to update expense")?;
                LedgerEntry::Expense(row.into())
            }
            EntryUpdate::Saving(entry) => {
                let Some(row) = Savings::find_by_id(id)
                    .filter(savings::Column::UserId.eq(user_id))
                    .one(&self.conn)
                    .await?
                else {
                    return Ok(None);
                };

                let mut model: savings::ActiveModel = row.into();
                model.date = Set(entry.date.clone());
                model.amount = Set(entry.amount);
                model.details = Set(entry.details.clone());

                let row = model
                    .update(&self.conn)
                    .await
                    .context("Failed to update saving")?;
                LedgerEntry::Saving(row.into())
            }
        };

        Ok(Some(stored))
    }

    pub async fn list_income(&self, user_id: &str, range: &DateRange) -> Result<Vec<IncomeEntry>> {
        let query = within(
            Income::find().filter(income::Column::UserId.eq(user_id)),
            income::Column::Date,
            range,
        );

        let rows = query
            .order_by_desc(income::Column::Date)
            .order_by_desc(income::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list income")?;

        Ok(rows.into_iter().map(IncomeEntry::from).collect())
    }

    /// `search` matches anywhere in the expense details.
    pub async fn list_expenses(
        &self,
        user_id: &str,
        range: &DateRange,
        search: Option<&str>,
    ) -> Result<Vec<ExpenseEntry>> {
        let mut query = within(
            Expenses::find().filter(expenses::Column::UserId.eq(user_id)),
            expenses::Column::Date,
            range,
        );

        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(expenses::Column::ExpenseDetails.contains(term));
        }

        let rows = query
            .order_by_desc(expenses::Column::Date)
            .order_by_desc(expenses::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list expenses")?;

        Ok(rows.into_iter().map(ExpenseEntry::from).collect())
    }

    pub async fn list_savings(&self, user_id: &str, range: &DateRange) -> Result<Vec<SavingEntry>> {
        let query = within(
            Savings::find().filter(savings::Column::UserId.eq(user_id)),
            savings::Column::Date,
            range,
        );

        let rows = query
            .order_by_desc(savings::Column::Date)
            .order_by_desc(savings::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list savings")?;

        Ok(rows.into_iter().map(SavingEntry::from).collect())
    }

    pub async fn all_for(&self, user_id: &str, range: &DateRange) -> Result<FinancialData> {
        let (income, expenses, savings) = futures::try_join!(
            self.list_income(user_id, range),
            self.list_expenses(user_id, range, None),
            self.list_savings(user_id, range),
        )?;

        Ok(FinancialData {
            income,
            expenses,
            savings,
        })
    }

    /// Deletes one of the owner's rows. Rows owned by someone else are left alone.
    pub async fn delete(&self, user_id: &str, kind: FinanceKind, id: i64) -> Result<bool> {
        let affected = match kind {
            FinanceKind::Income => {
                Income::delete_many()
                    .filter(income::Column::Id.eq(id))
                    .filter(income::Column::UserId.eq(user_id))
                    .exec(&self.conn)
                    .await?
                    .rows_affected
            }
            FinanceKind::Expenses => {
                Expenses::delete_many()
                    .filter(expenses::Column::Id.eq(id))
                    .filter(expenses::Column::UserId.eq(user_id))
                    .exec(&self.conn)
                    .await?
                    .rows_affected
            }
            FinanceKind::Savings => {
                Savings::delete_many()
                    .filter(savings::Column::Id.eq(id))
                    .filter(savings::Column::UserId.eq(user_id))
                    .exec(&self.conn)
                    .await?
                    .rows_affected
            }
        };

        Ok(affected > 0)
    }

    /// Empties one of the owner's ledgers.
    pub async fn clear(&self, user_id: &str, kind: FinanceKind) -> Result<u64> {
        clear_kind(&self.conn, user_id, kind).await
    }

    /// Empties all three of the owner's ledgers together.
    pub async fn clear_all(&self, user_id: &str) -> Result<u64> {
        let txn = self.conn.begin().await?;

        let mut deleted = 0;
        for kind in [
            FinanceKind::Income,
            FinanceKind::Expenses,
            FinanceKind::Savings,
        ] {
            deleted += clear_kind(&txn, user_id, kind).await?;
        }

        txn.commit().await?;
        Ok(deleted)
    }
}

async fn insert_income<C: ConnectionTrait>(conn: &C, user_id: &str, entry: &NewIncome) -> Result<i64> {
    let model = income::ActiveModel {
        user_id: Set(user_id.to_string()),
        date: Set(entry.date.clone()),
        amount: Set(entry.amount),
        source: Set(entry.source.clone()),
        created_at: Set(crate::db::now_timestamp()),
        ..Default::default()
    };

    let result = Income::insert(model)
        .exec(conn)
        .await
        .context("Failed to insert income")?;
    Ok(result.last_insert_id)
}

async fn insert_expense<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    entry: &NewExpense,
) -> Result<i64> {
    let model = expenses::ActiveModel {
        user_id: Set(user_id.to_string()),
        date: Set(entry.date.clone()),
        amount: Set(entry.amount),
        expense_details: Set(entry.expense_details.clone()),
        payment_mode: Set(entry.payment_mode.clone()),
        created_at: Set(crate::db::now_timestamp()),
        ..Default::default()
    };

    let result = Expenses::insert(model)
        .exec(conn)
        .await
        .context("Failed to insert expense")?;
    Ok(result.last_insert_id)
}

async fn insert_saving<C: ConnectionTrait>(conn: &C, user_id: &str, entry: &NewSaving) -> Result<i64> {
    let model = savings::ActiveModel {
        user_id: Set(user_id.to_string()),
        date: Set(entry.date.clone()),
        amount: Set(entry.amount),
        details: Set(entry.details.clone()),
        created_at: Set(crate::db::now_timestamp()),
        ..Default::default()
    };

    let result = Savings::insert(model)
        .exec(conn)
        .await
        .context("Failed to insert saving")?;
    Ok(result.last_insert_id)
}

async fn clear_kind<C: ConnectionTrait>(conn: &C, user_id: &str, kind: FinanceKind) -> Result<u64> {
    let result = match kind {
        FinanceKind::Income => {
            Income::delete_many()
                .filter(income::Column::UserId.eq(user_id))
                .exec(conn)
                .await?
        }
        FinanceKind::Expenses => {
            Expenses::delete_many()
                .filter(expenses::Column::UserId.eq(user_id))
                .exec(conn)
                .await?
        }
        FinanceKind::Savings => {
            Savings::delete_many()
                .filter(savings::Column::UserId.eq(user_id))
                .exec(conn)
                .await?
        }
    };

    Ok(result.rows_affected)
}

fn within<E, C>(query: Select<E>, column: C, range: &DateRange) -> Select<E>
where
    E: EntityTrait,
    C: ColumnTrait,
{
    let mut query = query;
    if let Some(from) = &range.from {
        query = query.filter(column.gte(from.as_str()));
    }
    if let Some(to) = &range.to {
        query = query.filter(column.lte(to.as_str()));
    }
    query
}

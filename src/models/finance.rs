use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Largest amount a single ledger row may carry.
pub const MAX_AMOUNT: f64 = 10_000_000.0;

/// How far back an entry date may reach.
pub const MAX_DATE_AGE_MONTHS: u32 = 100 * 12;

/// Rejects amounts that are not positive, too large, or finer than cents.
///
/// # Errors
///
/// Returns a message suitable for showing to the person who entered the value.
pub fn check_amount(amount: f64) -> Result<f64, String> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err("Amount must be greater than 0".to_string());
    }
    if amount > MAX_AMOUNT {
        return Err("Amount cannot exceed 10,000,000".to_string());
    }

    let cents = amount * 100.0;
    if (cents - cents.round()).abs() > 1e-6 {
        return Err("Amount cannot have more than 2 decimal places".to_string());
    }

    Ok(amount)
}

/// Rejects entry dates after `today` or more than a century before it.
///
/// # Errors
///
/// Returns a message suitable for showing to the person who entered the value.
pub fn check_entry_date(date: NaiveDate, today: NaiveDate) -> Result<NaiveDate, String> {
    if date > today {
        return Err("Date cannot be in the future".to_string());
    }

    let oldest = today
        .checked_sub_months(Months::new(MAX_DATE_AGE_MONTHS))
        .unwrap_or(NaiveDate::MIN);
    if date < oldest {
        return Err("Date cannot be more than 100 years ago".to_string());
    }

    Ok(date)
}

/// One of the three owner-scoped ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinanceKind {
    Income,
    Expenses,
    Savings,
}

impl FinanceKind {
    #[must_use]
    pub const fn sheet_name(self) -> &'static str {
        match self {
            Self::Income => "Income",
            Self::Expenses => "Expenses",
            Self::Savings => "Savings",
        }
    }
}

impl std::str::FromStr for FinanceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Self::Income),
            "expenses" => Ok(Self::Expenses),
            "savings" => Ok(Self::Savings),
            other => anyhow::bail!("Unknown ledger: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeEntry {
    pub id: i64,
    pub user_id: String,
    pub date: String,
    pub amount: f64,
    pub source: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseEntry {
    pub id: i64,
    pub user_id: String,
    pub date: String,
    pub amount: f64,
    pub expense_details: String,
    pub payment_mode: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingEntry {
    pub id: i64,
    pub user_id: String,
    pub date: String,
    pub amount: f64,
    pub details: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewIncome {
    pub date: String,
    pub amount: f64,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewExpense {
    pub date: String,
    pub amount: f64,
    pub expense_details: String,
    pub payment_mode: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewSaving {
    pub date: String,
    pub amount: f64,
    pub details: Option<String>,
}

/// A stored row of any ledger, serialized as the row itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LedgerEntry {
    Income(IncomeEntry),
    Expense(ExpenseEntry),
    Saving(SavingEntry),
}

/// A full replacement for an existing row of any ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryUpdate {
    Income(NewIncome),
    Expense(NewExpense),
    Saving(NewSaving),
}

impl EntryUpdate {
    /// Reads a JSON body shaped like the ledger's insert payload.
    ///
    /// # Errors
    ///
    /// Fails when the body does not match the ledger's fields.
    pub fn from_json(kind: FinanceKind, body: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            FinanceKind::Income => Self::Income(serde_json::from_value(body)?),
            FinanceKind::Expenses => Self::Expense(serde_json::from_value(body)?),
            FinanceKind::Savings => Self::Saving(serde_json::from_value(body)?),
        })
    }
}

/// Rows parsed from a workbook and ready to be stored together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEntries {
    pub income: Vec<NewIncome>,
    pub expenses: Vec<NewExpense>,
    pub savings: Vec<NewSaving>,
}

impl NewEntries {
    #[must_use]
    pub fn len(&self) -> usize {
        self.income.len() + self.expenses.len() + self.savings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Inclusive `YYYY-MM-DD` bounds; either side may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialData {
    pub income: Vec<IncomeEntry>,
    pub expenses: Vec<ExpenseEntry>,
    pub savings: Vec<SavingEntry>,
}

impl FinancialData {
    #[must_use]
    pub fn totals(&self) -> Totals {
        Totals {
            income: self.income.iter().map(|e| e.amount).sum(),
            expenses: self.expenses.iter().map(|e| e.amount).sum(),
            savings: self.savings.iter().map(|e| e.amount).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub income: f64,
    pub expenses: f64,
    pub savings: f64,
}

impl Totals {
    #[must_use]
    pub fn net_balance(&self) -> f64 {
        self.income - self.expenses - self.savings
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    /// `YYYY-MM`
    pub month: String,
    #[serde(flatten)]
    pub totals: Totals,
    pub net_balance: f64,
}

impl FinancialData {
    /// Per-month totals, oldest month first. Months without entries are omitted.
    #[must_use]
    pub fn monthly(&self) -> Vec<MonthlySummary> {
        let mut months: std::collections::BTreeMap<String, Totals> =
            std::collections::BTreeMap::new();

        let month_of = |date: &str| date.get(..7).unwrap_or(date).to_string();

        for e in &self.income {
            months.entry(month_of(&e.date)).or_default().income += e.amount;
        }
        for e in &self.expenses {
            months.entry(month_of(&e.date)).or_default().expenses += e.amount;
        }
        for e in &self.savings {
            months.entry(month_of(&e.date)).or_default().savings += e.amount;
        }

        months
            .into_iter()
            .map(|(month, totals)| MonthlySummary {
                month,
                net_balance: totals.net_balance(),
                totals,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn income(date: &str, amount: f64) -> IncomeEntry {
        IncomeEntry {
            id: 0,
            user_id: "u".to_string(),
            date: date.to_string(),
            amount,
            source: "Salary".to_string(),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_monthly_groups_by_month() {
        let data = FinancialData {
            income: vec![income("2024-01-15", 100.0), income("2024-01-20", 50.0), income("2024-02-01", 10.0)],
            expenses: vec![ExpenseEntry {
                id: 0,
                user_id: "u".to_string(),
                date: "2024-01-10".to_string(),
                amount: 30.0,
                expense_details: "Groceries".to_string(),
                payment_mode: "Cash".to_string(),
                created_at: String::new(),
            }],
            savings: vec![],
        };

        let monthly = data.monthly();
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].month, "2024-01");
        assert!((monthly[0].totals.income - 150.0).abs() < f64::EPSILON);
        assert!((monthly[0].net_balance - 120.0).abs() < f64::EPSILON);
        assert_eq!(monthly[1].month, "2024-02");
    }

    #[test]
    fn test_check_amount() {
        assert!(check_amount(0.01).is_ok());
        assert!(check_amount(250.5).is_ok());
        assert!(check_amount(MAX_AMOUNT).is_ok());

        assert_eq!(
            check_amount(0.0).unwrap_err(),
            "Amount must be greater than 0"
        );
        assert!(check_amount(-5.0).is_err());
        assert!(check_amount(f64::INFINITY).is_err());
        assert_eq!(
            check_amount(MAX_AMOUNT + 1.0).unwrap_err(),
            "Amount cannot exceed 10,000,000"
        );
        assert_eq!(
            check_amount(1.005).unwrap_err(),
            "Amount cannot have more than 2 decimal places"
        );
    }

    #[test]
    fn test_check_entry_date() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        assert!(check_entry_date(today, today).is_ok());
        assert!(check_entry_date(day(1924, 6, 15), today).is_ok());

        assert_eq!(
            check_entry_date(day(2024, 6, 16), today).unwrap_err(),
            "Date cannot be in the future"
        );
        assert_eq!(
            check_entry_date(day(1924, 6, 14), today).unwrap_err(),
            "Date cannot be more than 100 years ago"
        );
    }

    #[test]
    fn test_entry_update_follows_ledger_shape() {
        let body = serde_json::json!({
            "date": "2024-01-10",
            "amount": 12.5,
            "expense_details": "Lunch",
            "payment_mode": "Card",
        });

        let update = EntryUpdate::from_json(FinanceKind::Expenses, body.clone()).unwrap();
        assert!(matches!(update, EntryUpdate::Expense(ref e) if e.payment_mode == "Card"));

        assert!(EntryUpdate::from_json(FinanceKind::Income, body).is_err());
    }
}

use chrono::NaiveDate;

use super::ApiError;
use crate::models::finance::{
    EntryUpdate, NewExpense, NewIncome, NewSaving, check_amount, check_entry_date,
};

pub fn validate_date(date: &str) -> Result<&str, ApiError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| date)
        .map_err(|_| ApiError::validation(format!("Invalid date: {date}. Expected YYYY-MM-DD")))
}

/// A ledger date: well formed, not in the future, at most a century old.
pub fn validate_entry_date(date: &str) -> Result<&str, ApiError> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ApiError::validation(format!("Invalid date: {date}. Expected YYYY-MM-DD")))?;
    check_entry_date(parsed, chrono::Local::now().date_naive()).map_err(ApiError::validation)?;
    Ok(date)
}

pub fn validate_amount(amount: f64) -> Result<f64, ApiError> {
    check_amount(amount).map_err(ApiError::validation)
}

fn validate_text<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(trimmed)
}

pub fn validate_income(entry: &NewIncome) -> Result<(), ApiError> {
    validate_entry_date(&entry.date)?;
    validate_amount(entry.amount)?;
    validate_text("Source", &entry.source)?;
    Ok(())
}

pub fn validate_expense(entry: &NewExpense) -> Result<(), ApiError> {
    validate_entry_date(&entry.date)?;
    validate_amount(entry.amount)?;
    validate_text("Expense details", &entry.expense_details)?;
    validate_text("Payment mode", &entry.payment_mode)?;
    Ok(())
}

pub fn validate_saving(entry: &NewSaving) -> Result<(), ApiError> {
    validate_entry_date(&entry.date)?;
    validate_amount(entry.amount)?;
    Ok(())
}

pub fn validate_update(update: &EntryUpdate) -> Result<(), ApiError> {
    match update {
        EntryUpdate::Income(entry) => validate_income(entry),
        EntryUpdate::Expense(entry) => validate_expense(entry),
        EntryUpdate::Saving(entry) => validate_saving(entry),
    }
}

pub fn validate_phone(phone: &str) -> Result<&str, ApiError> {
    let trimmed = validate_text("Phone", phone)?;
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
    {
        return Err(ApiError::validation(
            "Phone can only contain digits, spaces, and + - ( )",
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_date() {
        assert!(validate_date("2024-02-29").is_ok());
        assert!(validate_date("2023-02-29").is_err());
        assert!(validate_date("15/01/2024").is_err());
    }

    #[test]
    fn test_validate_expense() {
        let mut entry = NewExpense {
            date: "2024-01-10".to_string(),
            amount: 20.0,
            expense_details: "Groceries".to_string(),
            payment_mode: "Cash".to_string(),
        };
        assert!(validate_expense(&entry).is_ok());

        entry.payment_mode = "   ".to_string();
        assert!(validate_expense(&entry).is_err());

        entry.payment_mode = "Card".to_string();
        entry.amount = f64::NAN;
        assert!(validate_expense(&entry).is_err());

        entry.amount = 0.0;
        assert!(validate_expense(&entry).is_err());

        entry.amount = 19.999;
        assert!(validate_expense(&entry).is_err());

        entry.amount = 20.0;
        entry.date = "2999-01-01".to_string();
        assert!(validate_expense(&entry).is_err());

        entry.date = "1800-01-01".to_string();
        assert!(validate_expense(&entry).is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+91 98765-43210").is_ok());
        assert!(validate_phone("").is_err());
        assert!(validate_phone("call me").is_err());
    }
}

//! Spreadsheet import and export of the three finance ledgers.

use calamine::{Data, Range, Reader, Xlsx};
use chrono::{DateTime, Duration, NaiveDate};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;
use tracing::info;

use crate::db::Store;
use crate::models::finance::{
    DateRange, FinanceKind, FinancialData, NewEntries, NewExpense, NewIncome, NewSaving,
    check_amount, check_entry_date,
};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Serial number of 9999-12-31, the last day Excel can represent.
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("Failed to read spreadsheet: {0}")]
    Parse(String),

    #[error("Failed to write spreadsheet: {0}")]
    Write(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for WorkbookError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for WorkbookError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for WorkbookError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Write(err.to_string())
    }
}

impl From<calamine::XlsxError> for WorkbookError {
    fn from(err: calamine::XlsxError) -> Self {
        Self::Parse(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: u64,
    pub skipped: u64,
    /// `"<Sheet> row <n>: <reason>"`, in sheet order.
    pub skipped_rows: Vec<String>,
}

/// Rows accepted from an uploaded workbook, not yet stored.
#[derive(Debug, Clone, Default)]
pub struct ParsedWorkbook {
    pub entries: NewEntries,
    pub skipped_rows: Vec<String>,
}

pub struct WorkbookService {
    store: Store,
}

impl WorkbookService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn export(&self, user_id: &str, range: &DateRange) -> Result<Vec<u8>, WorkbookError> {
        let data = self.store.financial_data(user_id, range).await?;

        let bytes = tokio::task::spawn_blocking(move || render_workbook(&data))
            .await
            .map_err(|e| WorkbookError::Internal(format!("Task join error: {e}")))??;

        info!(event = "workbook_exported", user_id = %user_id, bytes = bytes.len(), "Workbook exported");
        Ok(bytes)
    }

    pub async fn import(&self, user_id: &str, bytes: Vec<u8>) -> Result<ImportSummary, WorkbookError> {
        let parsed = tokio::task::spawn_blocking(move || parse_workbook(&bytes))
            .await
            .map_err(|e| WorkbookError::Internal(format!("Task join error: {e}")))??;

        let imported = self
            .store
            .insert_finance_entries(user_id, &parsed.entries)
            .await?;

        let summary = ImportSummary {
            imported,
            skipped: parsed.skipped_rows.len() as u64,
            skipped_rows: parsed.skipped_rows,
        };

        info!(
            event = "workbook_imported",
            user_id = %user_id,
            imported = summary.imported,
            skipped = summary.skipped,
            "Workbook imported"
        );
        Ok(summary)
    }
}

/// Writes the summary sheet followed by one sheet per ledger, newest entries first.
pub fn render_workbook(data: &FinancialData) -> Result<Vec<u8>, WorkbookError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let totals = data.totals();

    let summary = workbook.add_worksheet().set_name("Summary")?;
    let rows = [
        ("Total Income", totals.income),
        ("Total Expenses", totals.expenses),
        ("Total Savings", totals.savings),
        ("Net Balance", totals.net_balance()),
    ];
    for (row, (label, value)) in (0u32..).zip(rows) {
        summary.write_string_with_format(row, 0, label, &bold)?;
        summary.write_number(row, 1, value)?;
    }

    let sheet = workbook
        .add_worksheet()
        .set_name(FinanceKind::Income.sheet_name())?;
    write_header(sheet, &["Date", "Source", "Amount"], &bold)?;
    for (row, entry) in (1u32..).zip(&data.income) {
        sheet.write_string(row, 0, &entry.date)?;
        sheet.write_string(row, 1, &entry.source)?;
        sheet.write_number(row, 2, entry.amount)?;
    }

    let sheet = workbook
        .add_worksheet()
        .set_name(FinanceKind::Expenses.sheet_name())?;
    write_header(sheet, &["Date", "Details", "Payment Mode", "Amount"], &bold)?;
    for (row, entry) in (1u32..).zip(&data.expenses) {
        sheet.write_string(row, 0, &entry.date)?;
        sheet.write_string(row, 1, &entry.expense_details)?;
        sheet.write_string(row, 2, &entry.payment_mode)?;
        sheet.write_number(row, 3, entry.amount)?;
    }

    let sheet = workbook
        .add_worksheet()
        .set_name(FinanceKind::Savings.sheet_name())?;
    write_header(sheet, &["Date", "Details", "Amount"], &bold)?;
    for (row, entry) in (1u32..).zip(&data.savings) {
        sheet.write_string(row, 0, &entry.date)?;
        sheet.write_string(row, 1, entry.details.as_deref().unwrap_or_default())?;
        sheet.write_number(row, 2, entry.amount)?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// Workbook with the column layout `parse_workbook` expects and one sample row per sheet.
pub fn render_template() -> Result<Vec<u8>, WorkbookError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let sheet = workbook.add_worksheet().set_name("Instructions")?;
    let lines = [
        "Fill in the Income, Expenses and Savings sheets.",
        "Date format: YYYY-MM-DD (e.g. 2024-01-15).",
        "Amount: numbers only.",
        "Do not change the column headers.",
        "Income: date, amount, source",
        "Expenses: date, amount, expense_details, payment_mode",
        "Savings: date, amount, details",
    ];
    for (row, line) in (0u32..).zip(lines) {
        sheet.write_string(row, 0, line)?;
    }

    let sheet = workbook.add_worksheet().set_name("Income")?;
    write_header(sheet, &["date", "amount", "source"], &bold)?;
    sheet.write_string(1, 0, "2024-01-15")?;
    sheet.write_number(1, 1, 50000.0)?;
    sheet.write_string(1, 2, "Salary")?;

    let sheet = workbook.add_worksheet().set_name("Expenses")?;
    write_header(
        sheet,
        &["date", "amount", "expense_details", "payment_mode"],
        &bold,
    )?;
    sheet.write_string(1, 0, "2024-01-10")?;
    sheet.write_number(1, 1, 2000.0)?;
    sheet.write_string(1, 2, "Groceries")?;
    sheet.write_string(1, 3, "Card")?;

    let sheet = workbook.add_worksheet().set_name("Savings")?;
    write_header(sheet, &["date", "amount", "details"], &bold)?;
    sheet.write_string(1, 0, "2024-01-31")?;
    sheet.write_number(1, 1, 10000.0)?;
    sheet.write_string(1, 2, "Monthly Savings")?;

    Ok(workbook.save_to_buffer()?)
}

fn write_header(sheet: &mut Worksheet, labels: &[&str], bold: &Format) -> Result<(), WorkbookError> {
    for (col, label) in (0u16..).zip(labels) {
        sheet.write_string_with_format(0, col, *label, bold)?;
    }
    Ok(())
}

/// Reads the `Income`, `Expenses` and `Savings` sheets. Sheets that are absent are ignored;
/// rows with unusable values are reported instead of stored.
pub fn parse_workbook(bytes: &[u8]) -> Result<ParsedWorkbook, WorkbookError> {
    parse_workbook_as_of(bytes, chrono::Local::now().date_naive())
}

/// Like [`parse_workbook`], judging entry dates against `today`.
pub fn parse_workbook_as_of(
    bytes: &[u8],
    today: NaiveDate,
) -> Result<ParsedWorkbook, WorkbookError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let sheet_names = workbook.sheet_names();
    let mut parsed = ParsedWorkbook::default();

    for kind in [FinanceKind::Income, FinanceKind::Expenses, FinanceKind::Savings] {
        let name = kind.sheet_name();
        if !sheet_names.iter().any(|s| s == name) {
            continue;
        }

        let range = workbook.worksheet_range(name)?;
        parse_sheet(kind, &range, today, &mut parsed);
    }

    Ok(parsed)
}

/// Applies the ledger rules to a complete row. A row that breaks one is reported and dropped.
fn accept(
    row: &SheetRow<'_>,
    date: NaiveDate,
    amount: f64,
    today: NaiveDate,
    parsed: &mut ParsedWorkbook,
) -> Option<(String, f64)> {
    match check_entry_date(date, today).and_then(|_| check_amount(amount)) {
        Ok(amount) => Some((date.format("%Y-%m-%d").to_string(), amount)),
        Err(reason) => {
            parsed
                .skipped_rows
                .push(format!("{} row {}: {reason}", row.kind.sheet_name(), row.number));
            None
        }
    }
}

fn parse_row(row: &SheetRow<'_>, today: NaiveDate, parsed: &mut ParsedWorkbook) {
    let kind = row.kind;
    let date = row.get("date").and_then(cell_to_date);
    let amount = row.get("amount").and_then(cell_to_amount);
    let mut missing = Vec::new();
    if date.is_none() {
        missing.push("date");
    }
    if amount.is_none() {
        missing.push("amount");
    }

    match kind {
        FinanceKind::Income => {
            let source = row.get("source").and_then(cell_to_text);
            if source.is_none() {
                missing.push("source");
            }
            if let (Some(date), Some(amount), Some(source)) = (date, amount, source) {
                if let Some((date, amount)) = accept(row, date, amount, today, parsed) {
                    parsed.entries.income.push(NewIncome {
                        date,
                        amount,
                        source,
                    });
                }
                return;
            }
        }
        FinanceKind::Expenses => {
            let details = row
                .get("expense_details")
                .or_else(|| row.get("details"))
                .and_then(cell_to_text);
            let payment_mode = row.get("payment_mode").and_then(cell_to_text);
            if details.is_none() {
                missing.push("expense_details");
            }
            if payment_mode.is_none() {
                missing.push("payment_mode");
            }
            if let (Some(date), Some(amount), Some(expense_details), Some(payment_mode)) =
                (date, amount, details, payment_mode)
            {
                if let Some((date, amount)) = accept(row, date, amount, today, parsed) {
                    parsed.entries.expenses.push(NewExpense {
                        date,
                        amount,
                        expense_details,
                        payment_mode,
                    });
                }
                return;
            }
        }
        FinanceKind::Savings => {
            if let (Some(date), Some(amount)) = (date, amount) {
                if let Some((date, amount)) = accept(row, date, amount, today, parsed) {
                    parsed.entries.savings.push(NewSaving {
                        date,
                        amount,
                        details: row.get("details").and_then(cell_to_text),
                    });
                }
                return;
            }
        }
    }

    parsed.skipped_rows.push(format!(
        "{} row {}: Missing {}",
        kind.sheet_name(),
        row.number,
        missing.join(", ")
    ));
}

struct SheetRow<'a> {
    kind: FinanceKind,
    /// 1-based row number as shown by spreadsheet applications.
    number: u32,
    cells: &'a [Data],
    columns: &'a HashMap<String, usize>,
}

impl SheetRow<'_> {
    fn get(&self, column: &str) -> Option<&Data> {
        self.columns
            .get(column)
            .and_then(|&idx| self.cells.get(idx))
            .filter(|cell| !matches!(cell, Data::Empty))
    }
}

/// The first row holds the headers; blank rows below it are ignored.
fn parse_sheet(
    kind: FinanceKind,
    range: &Range<Data>,
    today: NaiveDate,
    parsed: &mut ParsedWorkbook,
) {
    let first_row = range.start().map_or(0, |(row, _)| row);
    let mut rows = range.rows();

    let Some(header) = rows.next() else {
        return;
    };
    let columns: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .filter_map(|(idx, cell)| cell_to_text(cell).map(|h| (normalize_header(&h), idx)))
        .collect();

    for (offset, cells) in (2u32..).zip(rows) {
        if cells.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }

        let row = SheetRow {
            kind,
            number: first_row + offset,
            cells,
            columns: &columns,
        };
        parse_row(&row, today, parsed);
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

fn cell_to_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{f:.0}")
            } else {
                format!("{f}")
            }
        }
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_owned(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
    };

    (!text.is_empty()).then_some(text)
}

#[allow(clippy::cast_precision_loss)]
fn cell_to_amount(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

fn cell_to_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::Float(f) => excel_serial_to_date(*f),
        #[allow(clippy::cast_precision_loss)]
        Data::Int(i) => excel_serial_to_date(*i as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_date_text(s.trim()),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::try_days(serial.floor() as i64)?)
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(text, "%d/%m/%Y").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finance::{ExpenseEntry, IncomeEntry, SavingEntry};

    fn sample_data() -> FinancialData {
        FinancialData {
            income: vec![
                IncomeEntry {
                    id: 2,
                    user_id: "u".to_string(),
                    date: "2024-02-01".to_string(),
                    amount: 50000.0,
                    source: "Salary".to_string(),
                    created_at: String::new(),
                },
                IncomeEntry {
                    id: 1,
                    user_id: "u".to_string(),
                    date: "2024-01-20".to_string(),
                    amount: 5000.5,
                    source: "Freelance".to_string(),
                    created_at: String::new(),
                },
            ],
            expenses: vec![ExpenseEntry {
                id: 1,
                user_id: "u".to_string(),
                date: "2024-01-10".to_string(),
                amount: 2000.0,
                expense_details: "Bike Petrol".to_string(),
                payment_mode: "Card".to_string(),
                created_at: String::new(),
            }],
            savings: vec![SavingEntry {
                id: 1,
                user_id: "u".to_string(),
                date: "2024-01-31".to_string(),
                amount: 10000.0,
                details: None,
                created_at: String::new(),
            }],
        }
    }

    #[test]
    fn test_export_then_parse_preserves_counts_and_sums() {
        let data = sample_data();
        let bytes = render_workbook(&data).unwrap();
        let parsed = parse_workbook(&bytes).unwrap();

        assert!(parsed.skipped_rows.is_empty(), "{:?}", parsed.skipped_rows);
        let entries = &parsed.entries;
        assert_eq!(entries.income.len(), 2);
        assert_eq!(entries.expenses.len(), 1);
        assert_eq!(entries.savings.len(), 1);

        let income_sum: f64 = entries.income.iter().map(|e| e.amount).sum();
        assert!((income_sum - data.totals().income).abs() < 1e-9);
        assert_eq!(entries.income[0].date, "2024-02-01");
        assert_eq!(entries.expenses[0].expense_details, "Bike Petrol");
        assert_eq!(entries.expenses[0].payment_mode, "Card");
        assert_eq!(entries.savings[0].details, None);
    }

    #[test]
    fn test_template_parses_cleanly() {
        let parsed = parse_workbook(&render_template().unwrap()).unwrap();
        assert_eq!(parsed.entries.income.len(), 1);
        assert_eq!(parsed.entries.expenses.len(), 1);
        assert_eq!(parsed.entries.savings.len(), 1);
        assert!(parsed.skipped_rows.is_empty());
    }

    #[test]
    fn test_malformed_rows_are_reported() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Income").unwrap();
        sheet.write_string(0, 0, "date").unwrap();
        sheet.write_string(0, 1, "amount").unwrap();
        sheet.write_string(0, 2, "source").unwrap();
        sheet.write_string(1, 0, "2024-01-15").unwrap();
        sheet.write_number(1, 1, 100.0).unwrap();
        sheet.write_string(1, 2, "Salary").unwrap();
        sheet.write_string(2, 0, "not a date").unwrap();
        sheet.write_string(2, 1, "abc").unwrap();
        sheet.write_string(2, 2, "Bonus").unwrap();
        sheet.write_number(3, 0, 45306.0).unwrap();
        sheet.write_number(3, 1, 5.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let parsed = parse_workbook(&bytes).unwrap();
        assert_eq!(parsed.entries.income.len(), 1);
        assert_eq!(
            parsed.skipped_rows,
            vec![
                "Income row 3: Missing date, amount".to_string(),
                "Income row 4: Missing source".to_string(),
            ]
        );
    }

    #[test]
    fn test_huge_date_serial_is_reported_not_stored() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Savings").unwrap();
        sheet.write_string(0, 0, "date").unwrap();
        sheet.write_string(0, 1, "amount").unwrap();
        sheet.write_number(1, 0, 1e16).unwrap();
        sheet.write_number(1, 1, 10.0).unwrap();
        sheet.write_number(2, 0, f64::from(i32::MAX)).unwrap();
        sheet.write_number(2, 1, 10.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let parsed = parse_workbook(&bytes).unwrap();
        assert!(parsed.entries.is_empty());
        assert_eq!(
            parsed.skipped_rows,
            vec![
                "Savings row 2: Missing date".to_string(),
                "Savings row 3: Missing date".to_string(),
            ]
        );
    }

    #[test]
    fn test_rows_breaking_ledger_rules_are_reported() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Expenses").unwrap();
        for (col, label) in (0u16..).zip(["date", "amount", "expense_details", "payment_mode"]) {
            sheet.write_string(0, col, label).unwrap();
        }
        let rows = [
            ("2024-06-01", 12.5),
            ("2024-07-01", 12.5),
            ("1900-01-01", 12.5),
            ("2024-06-01", -3.0),
            ("2024-06-01", 20_000_000.0),
            ("2024-06-01", 1.239),
        ];
        for (row, (date, amount)) in (1u32..).zip(rows) {
            sheet.write_string(row, 0, date).unwrap();
            sheet.write_number(row, 1, amount).unwrap();
            sheet.write_string(row, 2, "Lunch").unwrap();
            sheet.write_string(row, 3, "Cash").unwrap();
        }
        let bytes = workbook.save_to_buffer().unwrap();

        let parsed = parse_workbook_as_of(&bytes, today).unwrap();
        assert_eq!(parsed.entries.expenses.len(), 1);
        assert_eq!(
            parsed.skipped_rows,
            vec![
                "Expenses row 3: Date cannot be in the future".to_string(),
                "Expenses row 4: Date cannot be more than 100 years ago".to_string(),
                "Expenses row 5: Amount must be greater than 0".to_string(),
                "Expenses row 6: Amount cannot exceed 10,000,000".to_string(),
                "Expenses row 7: Amount cannot have more than 2 decimal places".to_string(),
            ]
        );
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(cell_to_date(&Data::String("2024-01-15".to_string())), expected);
        assert_eq!(
            cell_to_date(&Data::String("2024-01-15T10:00:00Z".to_string())),
            expected
        );
        assert_eq!(cell_to_date(&Data::String("15/01/2024".to_string())), expected);
        assert_eq!(cell_to_date(&Data::Float(45306.0)), expected);
        assert_eq!(cell_to_date(&Data::String("soon".to_string())), None);

        assert_eq!(cell_to_date(&Data::Float(2_958_465.0)), NaiveDate::from_ymd_opt(9999, 12, 31));
        assert_eq!(cell_to_date(&Data::Float(2_958_466.0)), None);
        assert_eq!(cell_to_date(&Data::Float(1e16)), None);
        assert_eq!(cell_to_date(&Data::Int(i64::MAX)), None);
    }
}

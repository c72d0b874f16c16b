use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    ApiError, AppState,
    auth::AuthUser,
    validation::{
        validate_date, validate_expense, validate_income, validate_saving, validate_update,
    },
};
use crate::models::finance::{
    DateRange, EntryUpdate, ExpenseEntry, FinanceKind, IncomeEntry, LedgerEntry, MonthlySummary,
    NewExpense, NewIncome, NewSaving, SavingEntry, Totals,
};
use crate::services::{ImportSummary, workbook::XLSX_CONTENT_TYPE};

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub totals: Totals,
    pub net_balance: f64,
    pub months: Vec<MonthlySummary>,
}

fn parse_kind(kind: &str) -> Result<FinanceKind, ApiError> {
    kind.parse()
        .map_err(|_| ApiError::NotFound(format!("Unknown ledger: {kind}")))
}

fn checked_range(range: DateRange) -> Result<DateRange, ApiError> {
    if let Some(from) = range.from.as_deref() {
        validate_date(from)?;
    }
    if let Some(to) = range.to.as_deref() {
        validate_date(to)?;
    }
    Ok(range)
}

// ============================================================================
// Ledgers
// ============================================================================

/// GET /rest/v1/income
pub async fn list_income(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(range): Query<DateRange>,
) -> Result<Json<Vec<IncomeEntry>>, ApiError> {
    let range = checked_range(range)?;
    Ok(Json(state.store().list_income(&user.id, &range).await?))
}

/// POST /rest/v1/income
pub async fn add_income(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(entry): Json<NewIncome>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    validate_income(&entry)?;
    let id = state.store().add_income(&user.id, &entry).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// GET /rest/v1/expenses?from=&to=&search=
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ExpenseQuery>,
) -> Result<Json<Vec<ExpenseEntry>>, ApiError> {
    let range = checked_range(DateRange {
        from: query.from,
        to: query.to,
    })?;

    let expenses = state
        .store()
        .list_expenses(&user.id, &range, query.search.as_deref())
        .await?;
    Ok(Json(expenses))
}

/// POST /rest/v1/expenses
pub async fn add_expense(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(entry): Json<NewExpense>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    validate_expense(&entry)?;
    let id = state.store().add_expense(&user.id, &entry).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// GET /rest/v1/savings
pub async fn list_savings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(range): Query<DateRange>,
) -> Result<Json<Vec<SavingEntry>>, ApiError> {
    let range = checked_range(range)?;
    Ok(Json(state.store().list_savings(&user.id, &range).await?))
}

/// POST /rest/v1/savings
pub async fn add_saving(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(entry): Json<NewSaving>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    validate_saving(&entry)?;
    let id = state.store().add_saving(&user.id, &entry).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// PATCH /rest/v1/{kind}/{id}
/// Replaces every field of one of the caller's rows.
pub async fn update_entry(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((kind, id)): Path<(String, i64)>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<LedgerEntry>, ApiError> {
    let kind = parse_kind(&kind)?;
    let update = EntryUpdate::from_json(kind, body)
        .map_err(|e| ApiError::validation(format!("Invalid {} entry: {e}", kind.sheet_name())))?;
    validate_update(&update)?;

    state
        .store()
        .update_finance_entry(&user.id, id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(kind.sheet_name(), id))
}

/// DELETE /rest/v1/{kind}/{id}
/// Rows owned by someone else are reported as missing.
pub async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let kind = parse_kind(&kind)?;

    if !state.store().delete_finance_entry(&user.id, kind, id).await? {
        return Err(ApiError::not_found(kind.sheet_name(), id));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn clear(
    state: &AppState,
    user: &AuthUser,
    kind: FinanceKind,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state.store().clear_finance_kind(&user.id, kind).await?;
    tracing::info!(event = "ledger_cleared", user_id = %user.id, ledger = kind.sheet_name(), deleted, "Ledger cleared");
    Ok(Json(DeletedResponse { deleted }))
}

/// DELETE /rest/v1/income
pub async fn clear_income(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeletedResponse>, ApiError> {
    clear(&state, &user, FinanceKind::Income).await
}

/// DELETE /rest/v1/expenses
pub async fn clear_expenses(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeletedResponse>, ApiError> {
    clear(&state, &user, FinanceKind::Expenses).await
}

/// DELETE /rest/v1/savings
pub async fn clear_savings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeletedResponse>, ApiError> {
    clear(&state, &user, FinanceKind::Savings).await
}

/// DELETE /rest/v1/ledgers
pub async fn clear_all(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state.store().clear_finance_data(&user.id).await?;
    tracing::info!(event = "ledgers_cleared", user_id = %user.id, deleted, "All ledgers cleared");
    Ok(Json(DeletedResponse { deleted }))
}

// ============================================================================
// Reports and spreadsheets
// ============================================================================

/// GET /rest/v1/summary?year=
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<YearSummary>, ApiError> {
    let year = query.year.unwrap_or_else(|| chrono::Local::now().year());
    if !(1900..=9999).contains(&year) {
        return Err(ApiError::validation(format!("Invalid year: {year}")));
    }

    let range = DateRange {
        from: Some(format!("{year:04}-01-01")),
        to: Some(format!("{year:04}-12-31")),
    };
    let data = state.store().financial_data(&user.id, &range).await?;
    let totals = data.totals();

    Ok(Json(YearSummary {
        year,
        net_balance: totals.net_balance(),
        totals,
        months: data.monthly(),
    }))
}

/// GET /rest/v1/export?from=&to=
pub async fn export(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(range): Query<DateRange>,
) -> Result<impl IntoResponse, ApiError> {
    let range = checked_range(range)?;
    let bytes = state.workbook_service().export(&user.id, &range).await?;

    let filename = format!(
        "financial-data-{}.xlsx",
        chrono::Local::now().format("%Y-%m-%d")
    );

    Ok(xlsx_attachment(&filename, bytes))
}

/// GET /rest/v1/import/template
pub async fn import_template() -> Result<impl IntoResponse, ApiError> {
    let bytes = tokio::task::spawn_blocking(crate::services::workbook::render_template)
        .await
        .map_err(|e| ApiError::internal(format!("Template task failed: {e}")))??;

    Ok(xlsx_attachment("financial-data-template.xlsx", bytes))
}

/// POST /rest/v1/import
pub async fn import(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Json<ImportSummary>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::validation("Upload an .xlsx workbook"));
    }

    let summary = state
        .workbook_service()
        .import(&user.id, body.to_vec())
        .await?;

    Ok(Json(summary))
}

fn xlsx_attachment(filename: &str, bytes: Vec<u8>) -> impl IntoResponse + use<> {
    (
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
}

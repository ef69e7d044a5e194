//! API Routes
//!
//! HTTP endpoint definitions. Request validation (positive amount, distinct
//! accounts, matching currency) happens here; the store trusts its inputs.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::db::models::{CreateAccountParams, ListAccountsParams};
use crate::db::{Account, Store, TransferTxParams, TransferTxResult};
use crate::domain::{Amount, Currency, DomainError, OperationContext};
use crate::error::{AppError, AppResult};

// =========================================================================
// State
// =========================================================================

/// Shared router state
#[derive(Debug, Clone)]
pub struct AppState<S> {
    pub store: S,
    /// Cancelled on shutdown; every transfer runs under a child of this token
    pub shutdown: CancellationToken,
}

impl<S> AppState<S> {
    pub fn new(store: S, shutdown: CancellationToken) -> Self {
        Self { store, shutdown }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub owner: String,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct ListAccountsQuery {
    pub page_id: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub currency: String,
}

const MIN_PAGE_SIZE: i64 = 5;
const MAX_PAGE_SIZE: i64 = 50;

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router<S>() -> Router<AppState<S>>
where
    S: Store + Clone + 'static,
{
    Router::new()
        .route("/accounts", post(create_account::<S>).get(list_accounts::<S>))
        .route("/accounts/:id", get(get_account::<S>))
        .route("/transfers", post(create_transfer::<S>))
}

// =========================================================================
// Accounts
// =========================================================================

/// Open a new account with a zero balance
async fn create_account<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<CreateAccountRequest>,
) -> AppResult<(StatusCode, Json<Account>)>
where
    S: Store + Clone + 'static,
{
    let owner = request.owner.trim();
    if owner.is_empty() {
        return Err(AppError::InvalidRequest("owner must not be empty".to_string()));
    }
    let currency: Currency = request.currency.parse()?;

    let account = state
        .store
        .open_account(CreateAccountParams {
            owner: owner.to_string(),
            balance: 0,
            currency: currency.to_string(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_account<S>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Account>>
where
    S: Store + Clone + 'static,
{
    let account = state
        .store
        .find_account(id)
        .await
        .map_err(|e| AppError::from_account_lookup(id, e))?;

    Ok(Json(account))
}

async fn list_accounts<S>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListAccountsQuery>,
) -> AppResult<Json<Vec<Account>>>
where
    S: Store + Clone + 'static,
{
    if query.page_id < 1 {
        return Err(AppError::InvalidRequest("page_id must be at least 1".to_string()));
    }
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&query.page_size) {
        return Err(AppError::InvalidRequest(format!(
            "page_size must be between {} and {}",
            MIN_PAGE_SIZE, MAX_PAGE_SIZE
        )));
    }

    let accounts = state
        .store
        .find_accounts(ListAccountsParams {
            limit: query.page_size,
            offset: (query.page_id - 1) * query.page_size,
        })
        .await?;

    Ok(Json(accounts))
}

// =========================================================================
// Transfers
// =========================================================================

/// Move money between two accounts of the same currency
async fn create_transfer<S>(
    State(state): State<AppState<S>>,
    context: Option<Extension<OperationContext>>,
    Json(request): Json<TransferRequest>,
) -> AppResult<Json<TransferTxResult>>
where
    S: Store + Clone + 'static,
{
    let amount = Amount::new(request.amount).map_err(DomainError::from)?;
    let currency: Currency = request.currency.parse()?;

    if request.from_account_id == request.to_account_id {
        return Err(DomainError::SameAccountTransfer.into());
    }

    valid_account(&state.store, request.from_account_id, currency).await?;
    valid_account(&state.store, request.to_account_id, currency).await?;

    let context = context.map(|Extension(ctx)| ctx).unwrap_or_default();
    tracing::info!(
        correlation_id = ?context.correlation_id,
        client_ip = ?context.client_ip,
        from_account_id = request.from_account_id,
        to_account_id = request.to_account_id,
        amount = %amount,
        "Executing transfer"
    );

    let cancel = state.shutdown.child_token();
    let result = state
        .store
        .transfer_tx(
            &cancel,
            TransferTxParams {
                from_account_id: request.from_account_id,
                to_account_id: request.to_account_id,
                amount: amount.value(),
            },
        )
        .await?;

    Ok(Json(result))
}

/// Check the account exists and holds `currency`
async fn valid_account<S: Store>(store: &S, account_id: i64, currency: Currency) -> AppResult<Account> {
    let account = store
        .find_account(account_id)
        .await
        .map_err(|e| AppError::from_account_lookup(account_id, e))?;

    if account.currency != currency.code() {
        return Err(DomainError::CurrencyMismatch {
            account_id,
            expected: currency.to_string(),
            actual: account.currency,
        }
        .into());
    }

    Ok(account)
}

//! Inventory ledger routes.
//!
//! Mutations append to the ledger and return the affected balances; reads
//! cover balances, the raw ledger, historical stock and the kardex.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use kardex_core::inventory::{
    AdjustCommand, BalanceFilter, BalancePatch, HistoryQuery, IngestCommand, InventoryError,
    InventoryStore, MovementDetails, MovementFilter, MovementType, TransferCommand,
    UpdateStockCommand, WithdrawCommand,
};
use kardex_shared::types::{BranchId, PageRequest, ProductId};

use crate::{AppState, error::ApiError, middleware::ActorHeader};

/// Creates the inventory routes.
pub fn routes<S>() -> Router<AppState<S>>
where
    S: InventoryStore + 'static,
{
    Router::new()
        .route("/inventory/ingest", post(ingest::<S>))
        .route("/inventory/withdraw", post(withdraw::<S>))
        .route("/inventory/transfer", post(transfer::<S>))
        .route("/inventory/adjust", post(adjust::<S>))
        .route("/inventory/balances", get(list_balances::<S>))
        .route(
            "/inventory/products/{product_id}/branches/{branch_id}",
            get(get_balance::<S>).patch(update_stock::<S>),
        )
        .route(
            "/inventory/products/{product_id}/branches/{branch_id}/audit",
            get(audit_balance::<S>),
        )
        .route(
            "/inventory/branches/{branch_id}/low-stock",
            get(list_low_stock::<S>),
        )
        .route("/inventory/movements", get(list_movements::<S>))
        .route(
            "/inventory/products/{product_id}/history",
            get(historical_stock::<S>),
        )
        .route("/inventory/products/{product_id}/kardex", get(kardex::<S>))
}

/// Request body for a direct balance update.
///
/// `sale_price_override` distinguishes an absent field (keep) from an
/// explicit `null` (clear).
#[derive(Debug, Deserialize)]
pub struct UpdateStockRequest {
    /// New stock quantity.
    #[serde(default)]
    pub stock: Option<Decimal>,
    /// New alert threshold.
    #[serde(default)]
    pub stock_minimum: Option<Decimal>,
    /// Branch-specific price.
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub sale_price_override: Option<Option<Decimal>>,
    /// Metadata for the movement recorded when stock changes.
    #[serde(default)]
    pub details: MovementDetails,
}

/// Query parameters for listing balances.
#[derive(Debug, Deserialize)]
pub struct ListBalancesQuery {
    /// Restrict to one branch.
    pub branch_id: Option<BranchId>,
    /// Restrict to one product.
    pub product_id: Option<ProductId>,
    /// Case-insensitive match on product code or name.
    pub search: Option<String>,
    /// Only balances at or below their threshold.
    #[serde(default)]
    pub low_stock_only: bool,
    /// Page number, 1-based.
    pub page: Option<u32>,
    /// Page size.
    pub per_page: Option<u32>,
}

/// Query parameters for listing ledger rows.
#[derive(Debug, Deserialize)]
pub struct ListMovementsQuery {
    /// Restrict to one product.
    pub product_id: Option<ProductId>,
    /// Movements with a leg on this branch.
    pub branch_id: Option<BranchId>,
    /// Restrict to one movement kind.
    pub movement_type: Option<MovementType>,
    /// Inclusive lower bound (RFC 3339).
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound (RFC 3339).
    pub until: Option<DateTime<Utc>>,
}

/// Query parameters for history and kardex reports.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Branch to reconstruct; all branches when absent.
    pub branch_id: Option<BranchId>,
    /// First day of the period.
    pub date_from: NaiveDate,
    /// Last day of the period, inclusive.
    pub date_to: NaiveDate,
}

/// POST `/inventory/ingest` - Add stock to a branch.
async fn ingest<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    ActorHeader(actor): ActorHeader,
    Json(command): Json<IngestCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = state.inventory.ingest(&actor, command).await?;
    Ok((StatusCode::CREATED, Json(balance)))
}

/// POST `/inventory/withdraw` - Remove stock from a branch.
async fn withdraw<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    ActorHeader(actor): ActorHeader,
    Json(command): Json<WithdrawCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = state.inventory.withdraw(&actor, command).await?;
    Ok((StatusCode::CREATED, Json(balance)))
}

/// POST `/inventory/transfer` - Move stock between branches.
async fn transfer<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    ActorHeader(actor): ActorHeader,
    Json(command): Json<TransferCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.inventory.transfer(&actor, command).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST `/inventory/adjust` - Replace system stock with a physical count.
async fn adjust<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    ActorHeader(actor): ActorHeader,
    Json(command): Json<AdjustCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.inventory.adjust_to_actual(&actor, command).await?;
    let status = if outcome.movement.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

/// GET `/inventory/products/{product_id}/branches/{branch_id}` - One balance.
async fn get_balance<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    Path((product_id, branch_id)): Path<(ProductId, BranchId)>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = state
        .inventory
        .get_balance(product_id, branch_id)
        .await?
        .ok_or(InventoryError::BalanceNotFound {
            product_id,
            branch_id,
        })?;
    Ok(Json(balance))
}

/// PATCH `/inventory/products/{product_id}/branches/{branch_id}` - Direct update.
async fn update_stock<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    ActorHeader(actor): ActorHeader,
    Path((product_id, branch_id)): Path<(ProductId, BranchId)>,
    Json(payload): Json<UpdateStockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = UpdateStockCommand {
        product_id,
        branch_id,
        patch: BalancePatch {
            stock: payload.stock,
            stock_minimum: payload.stock_minimum,
            sale_price_override: payload.sale_price_override,
        },
        details: payload.details,
    };
    let outcome = state.inventory.update_stock(&actor, command).await?;
    Ok(Json(outcome))
}

/// GET `/inventory/products/{product_id}/branches/{branch_id}/audit` - Ledger drift check.
async fn audit_balance<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    Path((product_id, branch_id)): Path<(ProductId, BranchId)>,
) -> Result<impl IntoResponse, ApiError> {
    let audit = state.inventory.audit_balance(product_id, branch_id).await?;
    Ok(Json(audit))
}

/// GET `/inventory/balances` - Paginated, searchable balance listing.
async fn list_balances<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListBalancesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        query.page.unwrap_or(defaults.page),
        query.per_page.unwrap_or(defaults.per_page),
    );
    let filter = BalanceFilter {
        branch_id: query.branch_id,
        product_id: query.product_id,
        search: query.search,
        low_stock_only: query.low_stock_only,
    };

    let response = state.inventory.list_balances(&filter, &page).await?;
    debug!(
        total = response.meta.total,
        page = response.meta.page,
        "balances listed"
    );
    Ok(Json(response))
}

/// GET `/inventory/branches/{branch_id}/low-stock` - Balances at or below threshold.
async fn list_low_stock<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    Path(branch_id): Path<BranchId>,
) -> Result<impl IntoResponse, ApiError> {
    let balances = state.inventory.list_low_stock(branch_id).await?;
    Ok(Json(balances))
}

/// GET `/inventory/movements` - Raw ledger rows.
async fn list_movements<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListMovementsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = MovementFilter {
        product_id: query.product_id,
        branch_id: query.branch_id,
        movement_type: query.movement_type,
        from: query.from,
        until: query.until,
    };
    let rows = state.inventory.list_movements(&filter).await?;
    Ok(Json(rows))
}

/// GET `/inventory/products/{product_id}/history` - Opening, ingress, egress and closing.
async fn historical_stock<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    Path(product_id): Path<ProductId>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query =
        HistoryQuery::for_dates(product_id, params.branch_id, params.date_from, params.date_to)?;
    let history = state.inventory.historical_stock(&query).await?;
    Ok(Json(history))
}

/// GET `/inventory/products/{product_id}/kardex` - Movement report with running balance.
async fn kardex<S: InventoryStore + 'static>(
    State(state): State<AppState<S>>,
    Path(product_id): Path<ProductId>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query =
        HistoryQuery::for_dates(product_id, params.branch_id, params.date_from, params.date_to)?;
    let report = state.inventory.kardex(&query).await?;
    Ok(Json(report))
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use kardex_core::inventory::{BranchInfo, InventoryService, LedgerPolicy, MemoryStore, ProductInfo};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::middleware::actor::ACTOR_HEADER;

    async fn create_test_app() -> Router {
        let store = MemoryStore::new();
        store
            .put_product(ProductInfo {
                id: ProductId::new(1),
                code: "BOLT-M8".into(),
                name: "Hex Bolt M8".into(),
                sale_price: Decimal::new(250, 2),
                active: true,
            })
            .await;
        for (id, name) in [(1, "North"), (2, "South")] {
            store
                .put_branch(BranchInfo {
                    id: BranchId::new(id),
                    name: name.into(),
                    active: true,
                })
                .await;
        }
        let state = AppState::new(InventoryService::new(store, LedgerPolicy::default()));
        Router::new().merge(routes()).with_state(state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(ACTOR_HEADER, "7");
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_ingest_and_get_balance() {
        let app = create_test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/inventory/ingest",
            Some(json!({"product_id": 1, "branch_id": 1, "quantity": "10"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["stock"], "10");

        let (status, body) = send(&app, "GET", "/inventory/products/1/branches/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stock"], "10");
    }

    #[tokio::test]
    async fn test_missing_actor_header_is_bad_request() {
        let app = create_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/inventory/ingest")
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        r#"{"product_id":1,"branch_id":1,"quantity":"1"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_insufficient_stock_is_distinguishable() {
        let app = create_test_app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/inventory/withdraw",
            Some(json!({"product_id": 1, "branch_id": 1, "quantity": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "INSUFFICIENT_STOCK");
    }

    #[tokio::test]
    async fn test_unknown_balance_is_not_found() {
        let app = create_test_app().await;
        let (status, body) = send(&app, "GET", "/inventory/products/1/branches/2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "BALANCE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_transfer_and_kardex() {
        let app = create_test_app().await;
        send(
            &app,
            "POST",
            "/inventory/ingest",
            Some(json!({"product_id": 1, "branch_id": 1, "quantity": "10"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "POST",
            "/inventory/transfer",
            Some(json!({
                "product_id": 1,
                "source_branch_id": 1,
                "destination_branch_id": 2,
                "quantity": "4"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["source"]["stock"], "6");
        assert_eq!(body["destination"]["stock"], "4");
        assert_eq!(body["movement"]["movement_type"], "TRANSFER");

        let today = Utc::now().date_naive();
        let (status, body) = send(
            &app,
            "GET",
            &format!("/inventory/products/1/kardex?branch_id=2&date_from={today}&date_to={today}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"].as_array().unwrap().len(), 1);
        assert_eq!(body["summary"]["closing"]["quantity"], "4");
    }

    #[tokio::test]
    async fn test_same_branch_transfer_is_validation_error() {
        let app = create_test_app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/inventory/transfer",
            Some(json!({
                "product_id": 1,
                "source_branch_id": 1,
                "destination_branch_id": 1,
                "quantity": "1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "SAME_BRANCH_TRANSFER");
    }

    #[tokio::test]
    async fn test_patch_threshold_then_low_stock() {
        let app = create_test_app().await;
        send(
            &app,
            "POST",
            "/inventory/ingest",
            Some(json!({"product_id": 1, "branch_id": 1, "quantity": "3"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "PATCH",
            "/inventory/products/1/branches/1",
            Some(json!({"stock_minimum": "5", "sale_price_override": "2.75"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["movement"].is_null());
        assert_eq!(body["balance"]["sale_price_override"], "2.75");

        let (status, body) = send(&app, "GET", "/inventory/branches/1/low-stock", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = send(
            &app,
            "GET",
            "/inventory/balances?search=bolt&low_stock_only=true&per_page=10",
            None,
        )
        .await;
        assert_eq!(body["meta"]["total"], 1);
        assert_eq!(body["data"][0]["product_code"], "BOLT-M8");
    }

    #[tokio::test]
    async fn test_empty_patch_is_rejected() {
        let app = create_test_app().await;
        let (status, body) = send(
            &app,
            "PATCH",
            "/inventory/products/1/branches/1",
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "EMPTY_UPDATE");
    }

    #[tokio::test]
    async fn test_movements_and_audit() {
        let app = create_test_app().await;
        send(
            &app,
            "POST",
            "/inventory/ingest",
            Some(json!({
                "product_id": 1,
                "branch_id": 1,
                "quantity": "8",
                "details": {"unit_price": "1.50", "note": "supplier delivery"}
            })),
        )
        .await;
        send(
            &app,
            "POST",
            "/inventory/adjust",
            Some(json!({"product_id": 1, "branch_id": 1, "counted_stock": "7"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "GET",
            "/inventory/movements?product_id=1&movement_type=ADJUSTMENT",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["quantity"], "-1");

        let (status, body) =
            send(&app, "GET", "/inventory/products/1/branches/1/audit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["in_sync"], true);
    }

    #[tokio::test]
    async fn test_inverted_history_range_is_rejected() {
        let app = create_test_app().await;
        let (status, body) = send(
            &app,
            "GET",
            "/inventory/products/1/history?date_from=2025-02-01&date_to=2025-01-01",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_DATE_RANGE");
    }
}

//! 报表导出 HTTP 处理器
//!
//! CSV：客户列表、奖金分配明细；PDF：分润结算单、客户概要。

use axum::extract::State;
use axum::response::Response;
use crm_shared::observability::metrics;
use tracing::info;

use crate::dto::ClientListQuery;
use crate::error::Result;
use crate::export::{attachment, csv, pdf};
use crate::extract::{Path, Query};
use crate::middleware::CurrentActor;
use crate::state::AppState;

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const PDF_CONTENT_TYPE: &str = "application/pdf";

/// 导出客户列表，过滤条件与列表接口一致
///
/// GET /api/crm/exports/clients.csv
pub async fn export_clients_csv(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ClientListQuery>,
) -> Result<Response> {
    let clients = state
        .services
        .clients
        .list_for_export(&actor, query.into())
        .await?;
    let bytes = csv::clients_csv(&clients)?;

    metrics::record_export("csv");
    info!(rows = clients.len(), actor = actor.user_id, "客户列表已导出");
    Ok(attachment(bytes, CSV_CONTENT_TYPE, "clients.csv"))
}

/// GET /api/crm/exports/bonus-pools/{id}/allocations.csv
pub async fn export_allocations_csv(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(pool_id): Path<i64>,
) -> Result<Response> {
    let detail = state.services.commission.get_pool(&actor, pool_id).await?;
    let bytes = csv::allocations_csv(&detail.allocations)?;

    metrics::record_export("csv");
    Ok(attachment(
        bytes,
        CSV_CONTENT_TYPE,
        &format!("bonus-pool-{pool_id}-allocations.csv"),
    ))
}

/// GET /api/crm/exports/settlements/{id}/statement.pdf
pub async fn export_settlement_pdf(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Response> {
    let settlement = state.services.profit_share.get_settlement(&actor, id).await?;
    let client = state
        .services
        .clients
        .get(&actor, settlement.client_id)
        .await?;
    let bytes = pdf::settlement_statement(&settlement, &client)?;

    metrics::record_export("pdf");
    Ok(attachment(
        bytes,
        PDF_CONTENT_TYPE,
        &format!("settlement-{id}.pdf"),
    ))
}

/// GET /api/crm/exports/clients/{id}/summary.pdf
pub async fn export_client_summary_pdf(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(client_id): Path<i64>,
) -> Result<Response> {
    let client = state.services.clients.get(&actor, client_id).await?;
    let platforms = state
        .services
        .verification
        .list_platforms(&actor, client_id)
        .await?;
    let bytes = pdf::client_summary(&client, &platforms)?;

    metrics::record_export("pdf");
    Ok(attachment(
        bytes,
        PDF_CONTENT_TYPE,
        &format!("client-{client_id}-summary.pdf"),
    ))
}

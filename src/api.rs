//! HTTP surface of the logistic service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::ServiceError;
use crate::model::{ApplicationShadow, Assignment, LogisticPoint, ShadowStatus, Shipment};
use crate::office::ApplicationStatusEntry;
use crate::service::{LogisticService, ManualAssignment, PointDraft, ShipmentDetail, ShipmentDraft};

#[derive(Clone)]
pub struct AppState {
    pub service: LogisticService,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal(err) => {
                error!(error = %format!("{:#}", err), "request failed");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: "internal server error".to_string(),
                    }),
                )
                    .into_response();
            }
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct AssignmentsQuery {
    pub shipment_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ShadowsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusesQuery {
    #[serde(default)]
    pub ids: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub application_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/logistic/points", get(list_points).post(create_point))
        .route(
            "/logistic/shipments",
            get(list_shipments).post(create_shipment),
        )
        .route("/logistic/shipments/{id}", get(get_shipment))
        .route("/logistic/shipments/{id}/send", post(depart_shipment))
        .route("/logistic/shipments/{id}/deliver", post(deliver_shipment))
        .route(
            "/logistic/shipments/{id}/assignments",
            get(list_shipment_assignments).post(assign_manual),
        )
        .route("/logistic/assignments", get(list_assignments))
        .route(
            "/logistic/applications",
            get(list_applications).post(track_application),
        )
        .route("/logistic/applications/{id}", get(get_application))
        .route(
            "/logistic/applications/{id}/status",
            post(update_application_status),
        )
        .route("/logistic/status/applications", get(application_statuses))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_points(State(state): State<AppState>) -> ApiResult<Json<Vec<LogisticPoint>>> {
    Ok(Json(state.service.list_points().await?))
}

async fn create_point(
    State(state): State<AppState>,
    Json(draft): Json<PointDraft>,
) -> ApiResult<(StatusCode, Json<LogisticPoint>)> {
    let point = state.service.create_point(draft).await?;
    Ok((StatusCode::CREATED, Json(point)))
}

async fn list_shipments(State(state): State<AppState>) -> ApiResult<Json<Vec<Shipment>>> {
    Ok(Json(state.service.list_shipments().await?))
}

async fn create_shipment(
    State(state): State<AppState>,
    Json(draft): Json<ShipmentDraft>,
) -> ApiResult<(StatusCode, Json<ShipmentDetail>)> {
    let detail = state.service.create_shipment(draft).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn get_shipment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ShipmentDetail>> {
    Ok(Json(state.service.get_shipment(id).await?))
}

async fn depart_shipment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Shipment>> {
    Ok(Json(state.service.depart(id).await?))
}

async fn deliver_shipment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Shipment>> {
    Ok(Json(state.service.deliver(id).await?))
}

async fn list_shipment_assignments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Assignment>>> {
    Ok(Json(state.service.list_assignments(Some(id)).await?))
}

async fn assign_manual(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ManualAssignment>,
) -> ApiResult<(StatusCode, Json<Assignment>)> {
    let assignment = state.service.assign_manual(id, request).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn list_assignments(
    State(state): State<AppState>,
    Query(query): Query<AssignmentsQuery>,
) -> ApiResult<Json<Vec<Assignment>>> {
    Ok(Json(state.service.list_assignments(query.shipment_id).await?))
}

async fn list_applications(
    State(state): State<AppState>,
    Query(query): Query<ShadowsQuery>,
) -> ApiResult<Json<Vec<ApplicationShadow>>> {
    let status = query.status.as_deref().map(parse_shadow_status).transpose()?;
    Ok(Json(state.service.list_shadows(status).await?))
}

async fn track_application(
    State(state): State<AppState>,
    Json(request): Json<TrackRequest>,
) -> ApiResult<Json<ApplicationShadow>> {
    Ok(Json(
        state.service.track_application(request.application_id).await?,
    ))
}

async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApplicationShadow>> {
    Ok(Json(state.service.get_shadow(id).await?))
}

async fn update_application_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<ApplicationShadow>> {
    let status = parse_shadow_status(&request.status)?;
    Ok(Json(state.service.update_shadow_status(id, status).await?))
}

async fn application_statuses(
    State(state): State<AppState>,
    Query(query): Query<StatusesQuery>,
) -> ApiResult<Json<Vec<ApplicationStatusEntry>>> {
    let ids = parse_ids(&query.ids)?;
    Ok(Json(state.service.application_statuses(&ids).await?))
}

fn parse_shadow_status(raw: &str) -> Result<ShadowStatus, ApiError> {
    ShadowStatus::parse_status(raw.trim())
        .ok_or_else(|| ServiceError::validation(format!("unknown status {}", raw)).into())
}

/// Parse `1,2, 3` into ids; blanks are skipped, anything else non-numeric is rejected.
pub fn parse_ids(raw: &str) -> Result<Vec<i64>, ServiceError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| ServiceError::validation(format!("invalid id {}", s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_comma_separated() {
        assert_eq!(parse_ids("1,2, 3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_ids("").unwrap(), Vec::<i64>::new());
        assert_eq!(parse_ids("4,,5,").unwrap(), vec![4, 5]);
        assert!(parse_ids("1,x").is_err());
    }
}

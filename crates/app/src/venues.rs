use std::{fmt::Display, future::Future, time::Instant};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{error, info, warn};
use venue_desk_core::draft::VenuePayload;
use venue_desk_core::query::{ListParams, Pagination, VenueListQuery};
use venue_desk_core::stats::VenueStatistics;
use venue_desk_core::types::VenueDocument;
use venue_desk_storage::VenueError;

use crate::envelope::{ApiError, ApiResponse};
use crate::router::AppState;

type VenueId = Result<Path<i64>, PathRejection>;
type Payload = Result<Json<VenuePayload>, JsonRejection>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
    Statistics,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Statistics => "statistics",
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            Self::List => "Failed to get venues",
            Self::Get => "Failed to get venue",
            Self::Create => "Failed to create venue",
            Self::Update => "Failed to update venue",
            Self::Delete => "Failed to delete venue",
            Self::Statistics => "Failed to get venue statistics",
        }
    }

    fn fail(self, cause: impl Display) -> ApiError {
        let detail = cause.to_string();
        error!(stage = "api", operation = self.as_str(), error = %detail, "venue request failed");
        ApiError::internal(self.failure_message(), detail)
    }

    fn venue_error(self, err: VenueError) -> ApiError {
        match err {
            VenueError::NotFound => ApiError::not_found(),
            VenueError::UpcomingBookings(upcoming) => {
                warn!(
                    stage = "api",
                    operation = self.as_str(),
                    upcoming,
                    "venue has upcoming bookings"
                );
                ApiError::bad_request("Cannot delete venue with upcoming bookings")
            }
            VenueError::Database(err) => self.fail(err),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VenueList {
    venues: Vec<VenueDocument>,
    pagination: Pagination,
}

/// Records request count and latency for `operation` around `handler`.
async fn observe<T, F>(operation: Operation, handler: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    let start = Instant::now();
    let result = handler.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.outcome(),
    };
    counter!("venue_requests_total", "operation" => operation.as_str(), "result" => outcome)
        .increment(1);
    histogram!("venue_request_duration_seconds", "operation" => operation.as_str())
        .record(start.elapsed().as_secs_f64());
    result
}

pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<ApiResponse<VenueList>, ApiError> {
    observe(Operation::List, list_venues(state, params)).await
}

async fn list_venues(
    state: AppState,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<ApiResponse<VenueList>, ApiError> {
    let Query(params) = params.map_err(|rejection| invalid_query(rejection.body_text()))?;
    let query = VenueListQuery::try_from(params).map_err(|err| invalid_query(err.to_string()))?;

    let now = state.now();
    let page = state
        .storage()
        .venues()
        .list(&query, now)
        .await
        .map_err(|err| Operation::List.venue_error(err))?;

    Ok(ApiResponse::ok(VenueList {
        venues: page
            .venues
            .into_iter()
            .map(|venue| venue.into_document(now))
            .collect(),
        pagination: page.pagination,
    }))
}

fn invalid_query(detail: String) -> ApiError {
    warn!(stage = "api", operation = "list", error = %detail, "invalid list parameters");
    ApiError::bad_request("Invalid query parameters").with_error(detail)
}

pub async fn get(
    State(state): State<AppState>,
    id: VenueId,
) -> Result<ApiResponse<VenueDocument>, ApiError> {
    observe(Operation::Get, get_venue(state, id)).await
}

async fn get_venue(state: AppState, id: VenueId) -> Result<ApiResponse<VenueDocument>, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::not_found())?;
    let venue = state
        .storage()
        .venues()
        .fetch(id)
        .await
        .map_err(|err| Operation::Get.venue_error(err))?;
    Ok(ApiResponse::ok(venue.into_document(state.now())))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Payload,
) -> Result<ApiResponse<VenueDocument>, ApiError> {
    observe(Operation::Create, create_venue(state, payload)).await
}

async fn create_venue(
    state: AppState,
    payload: Payload,
) -> Result<ApiResponse<VenueDocument>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| Operation::Create.fail(rejection.body_text()))?;
    let (draft, contacts) = payload
        .into_parts()
        .map_err(|err| Operation::Create.fail(err))?;

    let now = state.now();
    let venue = state
        .storage()
        .venues()
        .create(&draft, &contacts, now)
        .await
        .map_err(|err| Operation::Create.venue_error(err))?;

    info!(
        stage = "api",
        operation = "create",
        venue_id = venue.id,
        contacts = venue.contacts.len(),
        "venue created"
    );
    Ok(ApiResponse::created(venue.into_document(now)).with_message("Venue created successfully"))
}

pub async fn update(
    State(state): State<AppState>,
    id: VenueId,
    payload: Payload,
) -> Result<ApiResponse<VenueDocument>, ApiError> {
    observe(Operation::Update, update_venue(state, id, payload)).await
}

async fn update_venue(
    state: AppState,
    id: VenueId,
    payload: Payload,
) -> Result<ApiResponse<VenueDocument>, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::not_found())?;
    let repo = state.storage().venues();

    // Contacts in the body are not applied on update.
    let parts = payload
        .map_err(|rejection| rejection.body_text())
        .and_then(|Json(payload)| payload.into_parts().map_err(|err| err.to_string()));
    let draft = match parts {
        Ok((draft, _)) => draft,
        Err(detail) => {
            let exists = repo
                .exists(id)
                .await
                .map_err(|err| Operation::Update.venue_error(err))?;
            if !exists {
                return Err(ApiError::not_found());
            }
            return Err(Operation::Update.fail(detail));
        }
    };

    let now = state.now();
    let venue = repo
        .update(id, &draft, now)
        .await
        .map_err(|err| Operation::Update.venue_error(err))?;

    info!(stage = "api", operation = "update", venue_id = id, "venue updated");
    Ok(ApiResponse::ok(venue.into_document(now)).with_message("Venue updated successfully"))
}

pub async fn delete(
    State(state): State<AppState>,
    id: VenueId,
) -> Result<ApiResponse<()>, ApiError> {
    observe(Operation::Delete, delete_venue(state, id)).await
}

async fn delete_venue(state: AppState, id: VenueId) -> Result<ApiResponse<()>, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::not_found())?;
    state
        .storage()
        .venues()
        .delete(id, state.now())
        .await
        .map_err(|err| Operation::Delete.venue_error(err))?;

    info!(stage = "api", operation = "delete", venue_id = id, "venue deleted");
    Ok(ApiResponse::message("Venue deleted successfully"))
}

pub async fn statistics(
    State(state): State<AppState>,
    id: VenueId,
) -> Result<ApiResponse<VenueStatistics>, ApiError> {
    observe(Operation::Statistics, venue_statistics(state, id)).await
}

async fn venue_statistics(
    state: AppState,
    id: VenueId,
) -> Result<ApiResponse<VenueStatistics>, ApiError> {
    let Path(id) = id.map_err(|_| ApiError::not_found())?;
    let statistics = state
        .storage()
        .venues()
        .statistics(id, state.now())
        .await
        .map_err(|err| Operation::Statistics.venue_error(err))?;
    Ok(ApiResponse::ok(statistics))
}

//! Service instance endpoints.
//!
//! /v2/service_instances/{instance_id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use yarnbroker_id::{InstanceId, PlanId, ServiceId, UserName};

use crate::api::error::ApiError;
use crate::instance::LifecycleState;
use crate::lifecycle::{
    Completion, CreateRequest, Credentials, DeleteRequest, ProvisionParameters, UpdateParameters,
    UpdateRequest,
};
use crate::operations::OperationOutcome;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/{instance_id}",
            get(get_instance)
                .put(provision_instance)
                .patch(update_instance)
                .delete(deprovision_instance),
        )
        .route("/{instance_id}/last_operation", get(last_operation))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AcceptsIncompleteQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeprovisionQuery {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub accepts_incomplete: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub parameters: ProvisionBodyParameters,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvisionBodyParameters {
    #[serde(default)]
    pub queue_quota_gb: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub parameters: UpdateBodyParameters,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBodyParameters {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub queue_quota_gb: Option<f64>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ProvisionResponse {
    /// Set when the operation is still running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub credentials: CredentialsBody,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct CredentialsBody {
    pub yarn_queue: String,
    pub resource_manager_url: String,
}

impl From<Credentials> for CredentialsBody {
    fn from(c: Credentials) -> Self {
        Self {
            yarn_queue: c.yarn_queue,
            resource_manager_url: c.resource_manager_url,
        }
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct OperationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct LastOperationResponse {
    /// "in progress", "succeeded" or "failed".
    pub state: String,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstanceStateResponse {
    pub instance_id: String,
    pub state: LifecycleState,
}

// =============================================================================
// Handlers
// =============================================================================

fn parse_instance_id(raw: &str) -> Result<InstanceId, ApiError> {
    InstanceId::parse(raw)
        .map_err(|e| ApiError::bad_request("invalid_instance_id", e.to_string()))
}

fn instance_path(instance_id: &InstanceId) -> String {
    format!("/v2/service_instances/{instance_id}")
}

fn accepted_status(completion: Completion, done: StatusCode) -> StatusCode {
    match completion {
        Completion::Accepted => StatusCode::ACCEPTED,
        Completion::Completed => done,
    }
}

fn operation_name(completion: Completion, name: &str) -> Option<String> {
    (completion == Completion::Accepted).then(|| name.to_string())
}

async fn provision_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<AcceptsIncompleteQuery>,
    Json(body): Json<ProvisionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let instance_id = parse_instance_id(&instance_id)?;
    let service_id = ServiceId::parse(&body.service_id)
        .map_err(|e| ApiError::bad_request("invalid_service_id", e.to_string()))?;
    let plan_id = PlanId::parse(&body.plan_id)
        .map_err(|e| ApiError::bad_request("invalid_plan_id", e.to_string()))?;

    let request = CreateRequest {
        instance_id: instance_id.clone(),
        service_id,
        plan_id,
        accepts_incomplete: query.accepts_incomplete,
        parameters: ProvisionParameters {
            queue_quota_gb: body.parameters.queue_quota_gb,
        },
    };
    let response = state
        .orchestrator()
        .create(request)
        .await
        .map_err(|e| ApiError::from(e).with_instance(instance_path(&instance_id)))?;

    Ok((
        accepted_status(response.completion, StatusCode::CREATED),
        Json(ProvisionResponse {
            operation: operation_name(response.completion, "provision"),
            credentials: response.credentials.into(),
        }),
    ))
}

async fn update_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<AcceptsIncompleteQuery>,
    Json(body): Json<UpdateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let instance_id = parse_instance_id(&instance_id)?;
    let plan_id = body
        .plan_id
        .as_deref()
        .map(PlanId::parse)
        .transpose()
        .map_err(|e| ApiError::bad_request("invalid_plan_id", e.to_string()))?;
    let user_name = body
        .parameters
        .user_name
        .as_deref()
        .map(UserName::parse)
        .transpose()
        .map_err(|e| ApiError::bad_request("invalid_user_name", e.to_string()))?;

    let request = UpdateRequest {
        instance_id: instance_id.clone(),
        plan_id,
        accepts_incomplete: query.accepts_incomplete,
        parameters: UpdateParameters {
            user_name,
            queue_quota_gb: body.parameters.queue_quota_gb,
        },
    };
    let response = state
        .orchestrator()
        .update(request)
        .await
        .map_err(|e| ApiError::from(e).with_instance(instance_path(&instance_id)))?;

    Ok((
        accepted_status(response.completion, StatusCode::OK),
        Json(OperationResponse {
            operation: operation_name(response.completion, "update"),
        }),
    ))
}

async fn deprovision_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<DeprovisionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let instance_id = parse_instance_id(&instance_id)?;
    let service_id = ServiceId::parse(&query.service_id)
        .map_err(|e| ApiError::bad_request("invalid_service_id", e.to_string()))?;
    let plan_id = PlanId::parse(&query.plan_id)
        .map_err(|e| ApiError::bad_request("invalid_plan_id", e.to_string()))?;

    let request = DeleteRequest {
        instance_id: instance_id.clone(),
        service_id,
        plan_id,
        accepts_incomplete: query.accepts_incomplete,
    };
    let response = state
        .orchestrator()
        .delete(request)
        .await
        .map_err(|e| ApiError::from(e).with_instance(instance_path(&instance_id)))?;

    Ok((
        accepted_status(response.completion, StatusCode::OK),
        Json(OperationResponse {
            operation: operation_name(response.completion, "delete"),
        }),
    ))
}

async fn last_operation(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let instance_id = parse_instance_id(&instance_id)?;

    let (status, operation, description) =
        match state.orchestrator().last_operation(&instance_id).await {
            OperationOutcome::NotFound => {
                return Err(ApiError::not_found(
                    "operation_not_found",
                    format!("no operation pending for instance {instance_id}"),
                )
                .with_instance(instance_path(&instance_id)));
            }
            OperationOutcome::InProgress { kind } => ("in progress", kind, None),
            OperationOutcome::Succeeded { kind } => ("succeeded", kind, None),
            OperationOutcome::Failed { kind, description } => ("failed", kind, Some(description)),
        };

    Ok(Json(LastOperationResponse {
        state: status.to_string(),
        operation: operation.to_string(),
        description,
    }))
}

async fn get_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let instance_id = parse_instance_id(&instance_id)?;
    let lifecycle = state
        .orchestrator()
        .lifecycle_state(&instance_id)
        .await
        .map_err(ApiError::from)?;

    if lifecycle == LifecycleState::Absent {
        return Err(ApiError::not_found(
            "not_found",
            format!("instance {instance_id} does not exist"),
        )
        .with_instance(instance_path(&instance_id)));
    }

    Ok(Json(InstanceStateResponse {
        instance_id: instance_id.to_string(),
        state: lifecycle,
    }))
}

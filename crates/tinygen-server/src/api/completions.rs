//! Text-generation endpoints and the health snapshot.

use salvo::{handler, writing::Json, Depot, Request, Response};

use tinygen_engine::completion_service;
use tinygen_engine::types::CompletionRequest;

use crate::api::auth::current_user;
use crate::error::ApiError;

/// POST /v1/completions
///
/// 503 while the engine isn't loaded; 422 on request validation failures; any
/// engine failure surfaces as 500 with the original message.
#[handler]
pub async fn handle_completions(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let service = completion_service(depot)?;
    let user = current_user(depot)?;

    let request: CompletionRequest = req
        .parse_json()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    request.validate().map_err(ApiError::Validation)?;

    let response = service.generate_completion(&request, &user.username).await?;

    res.render(Json(response));

    Ok(())
}

/// GET /v1/models
#[handler]
pub async fn handle_models(depot: &mut Depot, res: &mut Response) -> Result<(), ApiError> {
    let service = completion_service(depot)?;

    let list = service.available_models().await?;

    res.render(Json(list));

    Ok(())
}

/// GET /health (no auth required)
#[handler]
pub async fn handle_health(depot: &mut Depot, res: &mut Response) -> Result<(), ApiError> {
    let service = completion_service(depot)?;

    let status = service.health_status().await?;

    res.render(Json(status));

    Ok(())
}

use actix_web::{web, HttpResponse, Responder};
use log::{error, info};
use serde_json::json;

use crate::web::error::ApiError;
use crate::web::models::{ChatRequest, ChatResponse, ReportRequest, ReportResponse};
use crate::AppState;

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

// Chat API endpoint
pub async fn chat(
    data: web::Data<AppState>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    info!(
        "Chat request (session: {}, mode: {})",
        req.session_id.as_deref().unwrap_or("<new>"),
        req.mode.as_deref().unwrap_or("chat")
    );

    let outcome = data.chat.handle(req.into()).await.map_err(|e| {
        error!("Chat request failed: {}", e);
        ApiError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(ChatResponse::from(outcome)))
}

// Report generation is not implemented yet; the request is only acknowledged.
pub async fn generate_report(req: web::Json<ReportRequest>) -> impl Responder {
    info!(
        "Report requested (session: {:?}, email provided: {})",
        req.session_id,
        req.email.is_some()
    );

    HttpResponse::Ok().json(ReportResponse {
        status: "queued".to_string(),
        message: "Report generation started. You will receive an email when ready.".to_string(),
    })
}

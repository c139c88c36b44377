use actix_web::web;
use crate::web::error::ApiError;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .content_type_required(false)
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .route("/chat", web::post().to(handlers::chat))
    .route("/generate_report", web::post().to(handlers::generate_report))
    .route("/health", web::get().to(handlers::health_check));
}

//! HTTP route handlers for the API service

use actix_web::{web, HttpRequest, HttpResponse};
use apex_gateway_core::telemetry::{get_correlation_id, get_request_id};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/api/v1/status", web::get().to(api_status));
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "apex-gateway-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn api_status(req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "api_version": "v1",
        "platform": "Apex Gateway",
        "status": "operational",
        "correlation_id": get_correlation_id(&req),
        "request_id": get_request_id(&req),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

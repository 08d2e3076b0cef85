//! Apex Gateway API - HTTP service entrypoint
//!
//! Default port: 8080
//!
//! Observability comes up before anything else and is allowed to degrade:
//! a broken exporter or malformed logging config never stops the service
//! from starting.

use actix_web::{App, HttpServer};
use apex_gateway_api::routes;
use apex_gateway_core::config::{load_dotenv, ConfigLoader, ServiceConfig};
use apex_gateway_core::observability::{ObservabilityConfig, ObservabilityPipeline};
use apex_gateway_core::telemetry::TracingMiddleware;
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = ServiceConfig::from_env()?;
    config.validate()?;

    let pipeline = match ObservabilityPipeline::init(ObservabilityConfig::from_env()).await {
        Ok(pipeline) => Some(pipeline),
        Err(e) => {
            eprintln!("Warning: observability pipeline degraded: {}", e);
            None
        }
    };

    info!(
        host = %config.host,
        port = config.port,
        workers = config.workers,
        "Starting Apex Gateway API service"
    );

    HttpServer::new(|| {
        App::new()
            .wrap(TracingMiddleware)
            .configure(routes::configure)
    })
    .workers(config.workers)
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    if let Some(pipeline) = pipeline {
        pipeline.shutdown();
    }

    Ok(())
}

use actix_web::{get, middleware, post, web, App, HttpResponse, HttpServer, Responder};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::util::SubscriberInitExt; // <- needed for .try_init()
use tracing_subscriber::{fmt, EnvFilter};

mod capture;
mod config;
mod error;
mod store;
mod types;
mod ui;

use crate::capture::CaptureService;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::Datastore;
use crate::types::CaptureRequest;

#[get("/health")]
async fn health() -> impl Responder {
    web::Json(json!({ "status": "ok" }))
}

fn failure(e: &AppError) -> HttpResponse {
    HttpResponse::build(e.status()).json(json!({ "success": false, "error": e.to_string() }))
}

/* ------------------------ POST /capture ------------------------ */

#[post("/capture")]
async fn submit_capture(
    payload: web::Json<CaptureRequest>,
    store: web::Data<Datastore>,
    svc: web::Data<CaptureService>,
) -> actix_web::Result<impl Responder> {
    let url = match payload.into_inner().url {
        Some(u) if !u.trim().is_empty() => u,
        _ => {
            return Ok(HttpResponse::BadRequest().json(json!({
                "success": false, "error": "url is required"
            })));
        }
    };

    match svc.capture(store.get_ref(), &url).await {
        Ok(summary) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "capture complete",
            "data": summary,
        }))),
        Err(e) => {
            error!(error = %e, url = %url, "capture failed");
            Ok(failure(&e))
        }
    }
}

/* ------------------------ GET /history ------------------------ */

#[get("/history")]
async fn list_history(store: web::Data<Datastore>) -> actix_web::Result<impl Responder> {
    match store.recent_captures().await {
        Ok(records) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "count": records.len(),
            "data": records,
        }))),
        Err(e) => {
            error!(error = %e, "history query failed");
            Ok(failure(&e))
        }
    }
}

/* ------------------------ GET /records/{id} ------------------------ */

#[get("/records/{id}")]
async fn read_record(
    path: web::Path<String>,
    store: web::Data<Datastore>,
) -> actix_web::Result<impl Responder> {
    let raw = path.into_inner();
    let id: i64 = match raw.parse() {
        Ok(id) => id,
        Err(_) => {
            return Ok(failure(&AppError::Validation(format!(
                "invalid capture id: {raw:?}"
            ))));
        }
    };

    match store.capture_by_id(id).await {
        Ok(record) => Ok(HttpResponse::Ok().json(json!({ "success": true, "data": record }))),
        Err(e) => {
            if !matches!(e, AppError::NotFound) {
                error!(error = %e, id, "record read failed");
            }
            Ok(failure(&e))
        }
    }
}

/* ------------------------ diagnostics ------------------------ */
// Read-only probes; always 200 with a success flag in the body.

#[get("/diag/db")]
async fn diag_db(store: web::Data<Datastore>) -> impl Responder {
    let report = store.probe().await;
    web::Json(json!({ "success": report.ok(), "tiers": report }))
}

#[get("/diag/schema")]
async fn diag_schema(store: web::Data<Datastore>) -> impl Responder {
    match store.schema_info().await {
        Ok(info) => web::Json(json!({ "success": true, "schema": info })),
        Err(e) => web::Json(json!({ "success": false, "error": e.to_string() })),
    }
}

// Smoke probe of the whole pipeline; it persists like a real capture.
#[post("/diag/capture")]
async fn diag_capture(
    payload: web::Json<CaptureRequest>,
    store: web::Data<Datastore>,
    svc: web::Data<CaptureService>,
) -> impl Responder {
    let url = match payload.into_inner().url {
        Some(u) if !u.trim().is_empty() => u,
        _ => return web::Json(json!({ "success": false, "error": "url is required" })),
    };

    match svc.capture(store.get_ref(), &url).await {
        Ok(summary) => web::Json(json!({
            "success": true,
            "message": "test capture complete",
            "data": summary,
        })),
        Err(e) => web::Json(json!({
            "success": false,
            "message": "test capture failed",
            "error": e.to_string(),
        })),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish()
        .try_init();

    // Config
    let cfg = AppConfig::from_env()?;

    // Init subsystems
    let store = Datastore::connect(&cfg.db).await?;
    info!("✅ connected to Postgres");

    let svc = CaptureService::new(cfg.capture.clone());

    info!("🌐 pagestash listening on {}", cfg.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(svc.clone()))
            .wrap(middleware::Logger::default())
            .service(health)
            .service(submit_capture)
            .service(list_history)
            .service(read_record)
            .service(diag_db)
            .service(diag_schema)
            .service(diag_capture)
            .service(ui::index)
            .service(ui::viewer)
    })
    .bind(&cfg.bind_addr)?
    .workers(2)
    .run()
    .await?;

    Ok(())
}

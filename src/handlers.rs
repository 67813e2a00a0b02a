use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{ClassificationResponse, PredictionResponse, ServiceInfo};
use crate::service::PredictionService;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest accepted image upload, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/classify").route(web::post().to(classify)))
        .service(web::resource("/products").route(web::get().to(list_products)))
        .service(web::resource("/products/{id}").route(web::get().to(get_product)));
}

pub async fn index(service: web::Data<PredictionService>) -> HttpResponse {
    HttpResponse::Ok().json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        description: "Upload a product photo and get its aisle and shelf.",
        classifier: service.classifier_kind(),
        confidence_threshold: service.threshold(),
        catalog_size: service.catalog().len(),
        endpoints: vec![
            "GET /",
            "GET /health",
            "POST /predict",
            "POST /classify",
            "GET /products",
            "GET /products/{id}",
        ],
    })
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub async fn predict(
    service: web::Data<PredictionService>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let bytes = read_upload(payload, limit.0).await?;
    log::debug!("[{}] received {} byte upload", request_id, bytes.len());

    let result = web::block(move || service.predict(&bytes)).await??;

    log::info!(
        target: "audit",
        "id={} | label={} | conf={} | status={:?} | location={}",
        request_id,
        result.product_id,
        result.confidence,
        result.status(),
        result.location()
    );

    Ok(HttpResponse::Ok()
        .insert_header((REQUEST_ID_HEADER, request_id.to_string()))
        .json(PredictionResponse::from(&result)))
}

pub async fn classify(
    service: web::Data<PredictionService>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let bytes = read_upload(payload, limit.0).await?;
    let classification = web::block(move || service.classify_only(&bytes)).await??;
    Ok(HttpResponse::Ok().json(ClassificationResponse::from(classification)))
}

pub async fn list_products(service: web::Data<PredictionService>) -> HttpResponse {
    HttpResponse::Ok().json(service.catalog().all())
}

pub async fn get_product(
    service: web::Data<PredictionService>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    match service.catalog().lookup(&id) {
        Some(product) => Ok(HttpResponse::Ok().json(product)),
        None => Err(ApiError::ProductNotFound(id)),
    }
}

/// Reads the first file field (`file`, `image`, or anything with a filename).
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
    while let Some(item) = payload.next().await {
        let mut field = item?;
        let disposition = field.content_disposition();
        let is_file = matches!(disposition.get_name(), Some("file") | Some("image"))
            || disposition.get_filename().is_some();
        if !is_file {
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            if bytes.len() + data.len() > limit {
                return Err(ApiError::PayloadTooLarge { limit });
            }
            bytes.extend_from_slice(&data);
        }
        return Ok(bytes);
    }
    Err(ApiError::MissingFile)
}

use serde::Serialize;

use crate::catalog::Product;
use crate::classifier::{Classification, Confidence};
use crate::service::{PredictionResult, PredictionStatus, Resolution};

/// Catalog extras reported alongside a located product.
#[derive(Debug, Serialize, PartialEq)]
pub struct ProductMeta {
    pub category: Option<String>,
    pub price: Option<f64>,
    pub in_stock: bool,
}

impl From<&Product> for ProductMeta {
    fn from(product: &Product) -> Self {
        Self {
            category: product.category.clone(),
            price: product.price,
            in_stock: product.in_stock,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub product: String,
    pub confidence: Confidence,
    pub location: String,
    pub product_id: String,
    pub status: PredictionStatus,
    /// `null` unless the product was located in the catalog.
    pub meta: Option<ProductMeta>,
}

impl From<&PredictionResult> for PredictionResponse {
    fn from(result: &PredictionResult) -> Self {
        Self {
            product: result.product().to_string(),
            confidence: result.confidence,
            location: result.location(),
            product_id: result.product_id.clone(),
            status: result.status(),
            meta: match &result.resolution {
                Resolution::Located(product) => Some(ProductMeta::from(product)),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClassificationResponse {
    pub label: String,
    pub confidence: Confidence,
}

impl From<Classification> for ClassificationResponse {
    fn from(c: Classification) -> Self {
        Self {
            label: c.label,
            confidence: c.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub classifier: &'static str,
    pub confidence_threshold: Confidence,
    pub catalog_size: usize,
    pub endpoints: Vec<&'static str>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

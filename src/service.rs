//! Joins classifier output with the catalog.

use serde::Serialize;

use crate::catalog::{Catalog, Product};
use crate::classifier::{Classification, Classifier, ClassifyError, Confidence};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

pub const UNKNOWN_PRODUCT: &str = "unknown";
pub const UNKNOWN_LOCATION: &str = "unknown location";
pub const UNRECOGNIZED: &str = "unrecognized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Recognized,
    /// Confidence fell below the threshold, catalog was not consulted.
    Unrecognized,
    /// Classifier was confident but the id has no catalog entry.
    LocationUnresolved,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Located(Product),
    Unrecognized,
    LocationUnresolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub product_id: String,
    pub confidence: Confidence,
    pub resolution: Resolution,
}

impl PredictionResult {
    pub fn status(&self) -> PredictionStatus {
        match self.resolution {
            Resolution::Located(_) => PredictionStatus::Recognized,
            Resolution::Unrecognized => PredictionStatus::Unrecognized,
            Resolution::LocationUnresolved => PredictionStatus::LocationUnresolved,
        }
    }

    /// Display name when located, the raw id when only the location is
    /// missing, `unknown` when unrecognized.
    pub fn product(&self) -> &str {
        match &self.resolution {
            Resolution::Located(product) => &product.name,
            Resolution::LocationUnresolved => &self.product_id,
            Resolution::Unrecognized => UNKNOWN_PRODUCT,
        }
    }

    pub fn location(&self) -> String {
        match &self.resolution {
            Resolution::Located(product) => product.location(),
            Resolution::LocationUnresolved => UNKNOWN_LOCATION.to_string(),
            Resolution::Unrecognized => UNRECOGNIZED.to_string(),
        }
    }
}

pub struct PredictionService {
    classifier: Box<dyn Classifier>,
    catalog: Catalog,
    threshold: Confidence,
}

impl PredictionService {
    pub fn new(classifier: Box<dyn Classifier>, catalog: Catalog, threshold: f64) -> Self {
        Self {
            classifier,
            catalog,
            threshold: Confidence::new(threshold),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn classifier_kind(&self) -> &'static str {
        self.classifier.kind()
    }

    pub fn threshold(&self) -> Confidence {
        self.threshold
    }

    pub fn classify_only(&self, image_bytes: &[u8]) -> Result<Classification, ClassifyError> {
        self.classifier.classify(image_bytes)
    }

    pub fn predict(&self, image_bytes: &[u8]) -> Result<PredictionResult, ClassifyError> {
        let Classification { label, confidence } = self.classifier.classify(image_bytes)?;

        let resolution = if confidence < self.threshold {
            Resolution::Unrecognized
        } else {
            match self.catalog.lookup(&label) {
                Some(product) => Resolution::Located(product.clone()),
                None => {
                    log::warn!("Classifier returned `{}` which is not in the catalog", label);
                    Resolution::LocationUnresolved
                }
            }
        };

        Ok(PredictionResult {
            product_id: label,
            confidence,
            resolution,
        })
    }
}

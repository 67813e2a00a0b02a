use super::{decode_image, Classification, Classifier, ClassifyError, Confidence};

/// Placeholder model: validates the upload, then always answers with the
/// same label so the catalog and HTTP paths can be exercised end to end.
#[derive(Debug, Clone)]
pub struct StubClassifier {
    label: String,
    confidence: Confidence,
}

impl StubClassifier {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence: Confidence::new(confidence),
        }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new("banana", 0.95)
    }
}

impl Classifier for StubClassifier {
    fn kind(&self) -> &'static str {
        "stub"
    }

    fn classify(&self, image_bytes: &[u8]) -> Result<Classification, ClassifyError> {
        let img = decode_image(image_bytes)?;
        log::debug!(
            "Stub classifier received {}x{} image",
            img.width(),
            img.height()
        );
        Ok(Classification {
            label: self.label.clone(),
            confidence: self.confidence,
        })
    }
}

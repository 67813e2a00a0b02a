use std::fs;
use std::path::PathBuf;

use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgba, RgbaImage};
use ndarray::Array4;
use serde::Deserialize;
use tract_onnx::prelude::*;

use super::{decode_image, Classification, Classifier, ClassifierLoadError, ClassifyError, Confidence};

// ImageNet normalization
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

fn default_input_size() -> u32 {
    224
}

fn default_top_k() -> usize {
    5
}

fn default_fallback_label() -> String {
    "neither".to_string()
}

fn default_apply_softmax() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OnnxSettings {
    pub model_path: PathBuf,
    /// One class name per line, in model output order.
    pub labels_path: PathBuf,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,
    #[serde(default = "default_apply_softmax")]
    pub apply_softmax: bool,
    /// Checked in order; the first group matching any top-k class wins.
    #[serde(default)]
    pub keywords: Vec<KeywordGroup>,
}

/// Substrings of model class names that stand for one catalog product.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct KeywordGroup {
    pub id: String,
    pub keywords: Vec<String>,
}

pub struct OnnxClassifier {
    model: TypedRunnableModel<TypedModel>,
    labels: Vec<String>,
    settings: OnnxSettings,
}

impl OnnxClassifier {
    pub fn load(settings: OnnxSettings) -> Result<Self, ClassifierLoadError> {
        if settings.input_size == 0 {
            return Err(ClassifierLoadError::InputSize);
        }
        let labels = load_labels(&settings)?;
        let size = settings.input_size as usize;
        let model_err = |e: TractError| ClassifierLoadError::Model {
            path: settings.model_path.display().to_string(),
            reason: e.to_string(),
        };

        let model = tract_onnx::onnx()
            .model_for_path(&settings.model_path)
            .and_then(|m| {
                m.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
                )
            })
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(model_err)?;

        log::info!(
            "Loaded ONNX model {} with {} labels",
            settings.model_path.display(),
            labels.len()
        );
        Ok(Self {
            model,
            labels,
            settings,
        })
    }

    fn run(&self, img: &DynamicImage) -> Result<Vec<f32>, ClassifyError> {
        let size = self.settings.input_size as usize;
        let input = preprocess(img, self.settings.input_size);
        let tensor = tract_ndarray::Array::from_shape_vec((1, 3, size, size), input.into_raw_vec())
            .map_err(|e| ClassifyError::Inference(e.to_string()))?
            .into_tensor();

        let result = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        let output = result
            .first()
            .ok_or_else(|| ClassifyError::Inference("model returned no outputs".to_string()))?;
        let scores = output
            .to_array_view::<f32>()
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        Ok(scores.iter().copied().collect())
    }
}

impl Classifier for OnnxClassifier {
    fn kind(&self) -> &'static str {
        "onnx"
    }

    fn classify(&self, image_bytes: &[u8]) -> Result<Classification, ClassifyError> {
        let img = decode_image(image_bytes)?;
        let scores = self.run(&img)?;
        if scores.len() != self.labels.len() {
            return Err(ClassifyError::Inference(format!(
                "model produced {} scores but {} labels were loaded",
                scores.len(),
                self.labels.len()
            )));
        }

        let probs = if self.settings.apply_softmax {
            softmax(&scores)
        } else {
            scores
        };
        let ranked = top_k(&probs, self.settings.top_k);
        let (_, best) = ranked
            .first()
            .copied()
            .ok_or_else(|| ClassifyError::Inference("model produced no scores".to_string()))?;

        let names: Vec<&str> = ranked.iter().map(|(i, _)| self.labels[*i].as_str()).collect();
        log::debug!("Top-{} classes: {:?}", ranked.len(), names);

        Ok(Classification {
            label: map_label(&names, &self.settings.keywords, &self.settings.fallback_label),
            confidence: Confidence::from(best),
        })
    }
}

fn load_labels(settings: &OnnxSettings) -> Result<Vec<String>, ClassifierLoadError> {
    let path = settings.labels_path.display().to_string();
    let raw = fs::read_to_string(&settings.labels_path).map_err(|source| {
        ClassifierLoadError::Labels {
            path: path.clone(),
            source,
        }
    })?;
    let labels: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    if labels.is_empty() {
        return Err(ClassifierLoadError::NoLabels(path));
    }
    Ok(labels)
}

/// Letterboxes `img` into a `size`x`size` square and returns a normalized
/// NCHW tensor. Padding is black before normalization.
pub fn preprocess(img: &DynamicImage, size: u32) -> Array4<f32> {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = if width > height {
        (size, ((size * height) / width).max(1))
    } else {
        (((size * width) / height).max(1), size)
    };

    let resized = img.resize_exact(new_width, new_height, FilterType::Triangle);
    let mut canvas = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 255]));
    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;
    for (x, y, pixel) in resized.pixels() {
        canvas.put_pixel(x + pad_x, y + pad_y, Rgba([pixel[0], pixel[1], pixel[2], 255]));
    }

    let side = size as usize;
    let mut tensor = Array4::zeros((1, 3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }
    tensor
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; scores.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

fn top_k(probs: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    ranked.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    ranked.truncate(k.max(1));
    ranked
}

/// Picks the catalog id of the first keyword group matching any of the
/// top-k class names. With no groups configured the top class name is used
/// as is.
fn map_label(ranked_names: &[&str], groups: &[KeywordGroup], fallback: &str) -> String {
    if groups.is_empty() {
        return ranked_names
            .first()
            .map(|n| n.to_string())
            .unwrap_or_else(|| fallback.to_string());
    }
    let names: Vec<String> = ranked_names.iter().map(|n| n.to_lowercase()).collect();
    for group in groups {
        let matches = |name: &String| {
            group
                .keywords
                .iter()
                .any(|w| name.contains(&w.to_lowercase()))
        };
        if names.iter().any(matches) {
            return group.id.clone();
        }
    }
    fallback.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn group(id: &str, keywords: &[&str]) -> KeywordGroup {
        KeywordGroup {
            id: id.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn keywords() -> Vec<KeywordGroup> {
        vec![
            group("banana", &["banana", "plantain"]),
            group("apple", &["granny smith", "red delicious"]),
        ]
    }

    fn settings(dir: &std::path::Path) -> OnnxSettings {
        OnnxSettings {
            model_path: dir.join("model.onnx"),
            labels_path: dir.join("labels.txt"),
            input_size: default_input_size(),
            top_k: default_top_k(),
            fallback_label: default_fallback_label(),
            apply_softmax: true,
            keywords: Vec::new(),
        }
    }

    #[test]
    fn preprocess_letterboxes_wide_images() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([255, 255, 255])));
        let tensor = preprocess(&img, 8);
        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);

        // Top row is padding, the middle row is image content.
        let black = (0.0 - MEAN[0]) / STD[0];
        let white = (1.0 - MEAN[0]) / STD[0];
        assert!((tensor[[0, 0, 0, 4]] - black).abs() < 1e-5);
        assert!((tensor[[0, 0, 4, 4]] - white).abs() < 0.05);
    }

    #[test]
    fn preprocess_handles_extreme_aspect_ratios() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(1000, 1));
        assert_eq!(preprocess(&img, 16).shape(), &[1, 3, 16, 16]);
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn top_k_orders_by_probability() {
        let ranked = top_k(&[0.1, 0.6, 0.3], 2);
        assert_eq!(ranked, vec![(1, 0.6), (2, 0.3)]);
    }

    #[test]
    fn map_label_checks_every_rank_for_earlier_groups() {
        let names = ["Granny Smith", "banana", "orange"];
        assert_eq!(map_label(&names, &keywords(), "neither"), "banana");
    }

    #[test]
    fn map_label_group_order_decides_the_winner() {
        let names = ["Granny Smith", "banana"];
        let mut groups = keywords();
        groups.reverse();
        assert_eq!(map_label(&names, &groups, "neither"), "apple");
    }

    #[test]
    fn map_label_matches_lower_ranked_names() {
        let names = ["orange", "lemon", "Red Delicious"];
        assert_eq!(map_label(&names, &keywords(), "neither"), "apple");
    }

    #[test]
    fn map_label_falls_back_when_nothing_matches() {
        let names = ["orange", "lemon"];
        assert_eq!(map_label(&names, &keywords(), "neither"), "neither");
    }

    #[test]
    fn map_label_without_keywords_uses_top_class() {
        assert_eq!(map_label(&["milk", "cereal"], &[], "neither"), "milk");
    }

    #[test]
    fn load_fails_on_missing_labels() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            OnnxClassifier::load(settings(dir.path())),
            Err(ClassifierLoadError::Labels { .. })
        ));
    }

    #[test]
    fn load_fails_on_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("labels.txt"), "banana\napple\n").unwrap();
        assert!(matches!(
            OnnxClassifier::load(settings(dir.path())),
            Err(ClassifierLoadError::Model { .. })
        ));
    }

    #[test]
    fn load_rejects_zero_input_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("labels.txt"), "banana\n").unwrap();
        let settings = OnnxSettings {
            input_size: 0,
            ..settings(dir.path())
        };
        assert!(matches!(
            OnnxClassifier::load(settings),
            Err(ClassifierLoadError::InputSize)
        ));
    }
}

use crate::{
    classifier::{Classifier, ClassifierError},
    diseases::canonical_key,
    labels::LabelVocabulary,
    preprocess::{PreprocessConfig, PreprocessError, Tensor},
};
use ndarray::{Array3, Axis};

const HEALTHY: &str = "healthy";
const EARLY_BLIGHT: &str = "early blight";
const LATE_BLIGHT: &str = "late blight";
const SEPTORIA: &str = "septoria leaf spot";

#[derive(Debug, Clone, Copy, PartialEq)]
struct ChannelStats {
    mean: [f32; 3],
    std: [f32; 3],
}

impl ChannelStats {
    fn of(rgb: &Array3<f32>) -> Self {
        let mut mean = [0.0; 3];
        let mut std = [0.0; 3];
        for (channel, plane) in rgb.axis_iter(Axis(2)).enumerate() {
            mean[channel] = plane.mean().unwrap_or(0.0);
            std[channel] = plane.std(0.0);
        }
        Self { mean, std }
    }
}

/// Color-statistics rules used when no trained model is available.
///
/// Far weaker than a network: it only separates uniformly green leaves from
/// brown, red or yellow discoloration.
#[derive(Debug, Clone)]
pub struct ColorHeuristicClassifier {
    preprocessing: PreprocessConfig,
    num_classes: usize,
    healthy: usize,
    early_blight: usize,
    late_blight: usize,
    septoria: usize,
}

impl ColorHeuristicClassifier {
    pub fn new(
        preprocessing: PreprocessConfig,
        vocabulary: &LabelVocabulary,
    ) -> Result<Self, ClassifierError> {
        let index_of = |key: &str| {
            vocabulary
                .position(|label| canonical_key(label) == key)
                .ok_or_else(|| {
                    ClassifierError::Load(format!("label vocabulary has no class for {:?}", key))
                })
        };

        Ok(Self {
            preprocessing,
            num_classes: vocabulary.len(),
            healthy: index_of(HEALTHY)?,
            early_blight: index_of(EARLY_BLIGHT)?,
            late_blight: index_of(LATE_BLIGHT)?,
            septoria: index_of(SEPTORIA)?,
        })
    }

    fn decide(&self, stats: &ChannelStats) -> (usize, f32) {
        let [r, g, b] = stats.mean;
        let [std_r, std_g, _] = stats.std;

        if g > r + 10.0 && g > b + 10.0 && std_g < 40.0 {
            (self.healthy, 0.75)
        } else if r > g && r > b {
            if std_r > 50.0 {
                (self.early_blight, 0.65)
            } else {
                (self.late_blight, 0.60)
            }
        } else if r > b && g > b && (r - g).abs() < 30.0 {
            (self.septoria, 0.60)
        } else {
            (self.early_blight, 0.55)
        }
    }
}

impl Classifier for ColorHeuristicClassifier {
    fn name(&self) -> &str {
        "Rule-based"
    }

    fn classify(&self, input: &Tensor) -> Result<Vec<f32>, ClassifierError> {
        let rgb = self
            .preprocessing
            .to_rgb_intensities(input)
            .map_err(|e| match e {
                PreprocessError::Shape { expected, actual } => ClassifierError::InputShape {
                    expected: expected.to_vec(),
                    actual,
                },
                other => ClassifierError::Runtime(other.to_string()),
            })?;

        let (index, confidence) = self.decide(&ChannelStats::of(&rgb));

        let rest = (1.0 - confidence) / (self.num_classes - 1).max(1) as f32;
        let mut probabilities = vec![rest; self.num_classes];
        probabilities[index] = confidence;

        Ok(probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{Layout, Normalization, Preprocessor, ResizeFilter};
    use image::{Rgb, RgbImage};

    const LABELS: [&str; 5] = [
        "Tomato___Early_blight",
        "Tomato___Late_blight",
        "Tomato___Leaf_Mold",
        "Tomato___Septoria_leaf_spot",
        "Tomato___healthy",
    ];

    fn classifier(preprocessing: PreprocessConfig) -> ColorHeuristicClassifier {
        let vocabulary = LabelVocabulary::new(LABELS.iter().map(|s| s.to_string()).collect());
        ColorHeuristicClassifier::new(preprocessing, &vocabulary).unwrap()
    }

    fn preprocessing() -> PreprocessConfig {
        PreprocessConfig {
            image_size: 16,
            normalization: Normalization::Caffe,
            layout: Layout::Nchw,
            filter: ResizeFilter::Nearest,
        }
    }

    fn classify(image: &RgbImage) -> Vec<f32> {
        let preprocessing = preprocessing();
        let tensor = Preprocessor::new(preprocessing).to_tensor(image);
        classifier(preprocessing).classify(&tensor).unwrap()
    }

    fn argmax(probabilities: &[f32]) -> usize {
        crate::ranking::argmax(probabilities).unwrap().0
    }

    #[test]
    fn test_uniform_green_is_healthy() {
        let probabilities = classify(&RgbImage::from_pixel(50, 50, Rgb([20, 200, 30])));

        assert_eq!(argmax(&probabilities), 4);
        assert!((probabilities[4] - 0.75).abs() < 1e-6);
        assert!((probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_uniform_brown_is_late_blight() {
        let probabilities = classify(&RgbImage::from_pixel(50, 50, Rgb([150, 90, 40])));

        assert_eq!(argmax(&probabilities), 1);
    }

    #[test]
    fn test_high_red_variance_is_early_blight() {
        let image = RgbImage::from_fn(16, 16, |x, _| {
            if x % 2 == 0 {
                Rgb([250, 40, 20])
            } else {
                Rgb([90, 60, 50])
            }
        });

        let probabilities = classify(&image);

        assert_eq!(argmax(&probabilities), 0);
        assert!((probabilities[0] - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_yellowish_is_septoria() {
        let probabilities = classify(&RgbImage::from_pixel(50, 50, Rgb([180, 190, 60])));

        assert_eq!(argmax(&probabilities), 3);
    }

    #[test]
    fn test_anything_else_defaults_to_early_blight() {
        let probabilities = classify(&RgbImage::from_pixel(10, 10, Rgb([40, 40, 200])));

        assert_eq!(argmax(&probabilities), 0);
        assert!((probabilities[0] - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_wrong_tensor_shape_is_rejected() {
        let result = classifier(preprocessing()).classify(&Tensor::zeros((1, 16, 16, 3)));

        assert!(matches!(result, Err(ClassifierError::InputShape { .. })));
    }
}

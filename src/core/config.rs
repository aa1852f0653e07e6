use crate::core::errors::ConfigError;
use crate::core::types::{BoxSelection, SessionType};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: Level,
}

/// Model locations and inference tuning
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub models_dir: PathBuf,
    pub detector_model: String,
    pub species_model: String,
    pub sex_model: String,
    pub abdomen_status_model: String,
    pub ocr_model: String,
    pub ocr_vocab: String,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Square input edge of the detector, in pixels
    pub detector_input_size: u32,
    /// Square input edge of the three classifiers, in pixels
    pub classifier_input_size: u32,
    /// Forced ONNX backend (CPU, CUDA); None means automatic
    pub inference_backend: Option<String>,
    pub intra_threads: usize,
}

/// Capture protocol configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub session_type: SessionType,
    pub box_selection: BoxSelection,
    pub auto_correct_specimen_id: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            session_type: SessionType::Surveillance,
            box_selection: BoxSelection::HighestConfidence,
            auto_correct_specimen_id: true,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub inference: InferenceConfig,
    pub capture: CaptureConfig,
}

/// Parse an optional setting. Unset or blank means "use the default"; a
/// value that does not parse is an error.
fn parsed<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|s| s.trim().to_string()) {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: s }),
    }
}

fn parsed_flag<F>(lookup: &F, key: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|s| s.trim().to_lowercase()) {
        None => Ok(None),
        Some(s) => match s.as_str() {
            "" => Ok(None),
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue { key, value: s }),
        },
    }
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from an arbitrary key lookup (environment, map in tests)
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let log_level = match lookup("LOG_LEVEL").map(|s| s.trim().to_lowercase()) {
            None => Level::INFO,
            Some(s) => match s.as_str() {
                "" | "info" => Level::INFO,
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "warn" | "warning" => Level::WARN,
                "error" => Level::ERROR,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "LOG_LEVEL",
                        value: s,
                    })
                }
            },
        };

        let session_type = match lookup("SESSION_TYPE") {
            Some(s) => s.parse()?,
            None => SessionType::Surveillance,
        };

        let box_selection = match lookup("BOX_SELECTION") {
            Some(s) => s.parse()?,
            None => BoxSelection::default(),
        };

        Ok(Self {
            logging: LoggingConfig { log_level },
            inference: InferenceConfig {
                models_dir: PathBuf::from(string_or("MODELS_DIR", "models")),
                detector_model: string_or("DETECTOR_MODEL", "detector.onnx"),
                species_model: string_or("SPECIES_MODEL", "species.onnx"),
                sex_model: string_or("SEX_MODEL", "sex.onnx"),
                abdomen_status_model: string_or("ABDOMEN_STATUS_MODEL", "abdomen_status.onnx"),
                ocr_model: string_or("OCR_MODEL", "ocr.onnx"),
                ocr_vocab: string_or("OCR_VOCAB", "ocr_vocab.txt"),
                confidence_threshold: parsed(&lookup, "CONFIDENCE_THRESHOLD")?.unwrap_or(0.5),
                iou_threshold: parsed(&lookup, "IOU_THRESHOLD")?.unwrap_or(0.45),
                detector_input_size: parsed(&lookup, "DETECTOR_INPUT_SIZE")?.unwrap_or(640),
                classifier_input_size: parsed(&lookup, "CLASSIFIER_INPUT_SIZE")?.unwrap_or(224),
                inference_backend: lookup("INFERENCE_BACKEND")
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty()),
                intra_threads: parsed(&lookup, "INTRA_THREADS")?.unwrap_or_else(|| {
                    // Leave headroom for the camera pipeline
                    std::cmp::max(num_cpus::get() / 2, 1)
                }),
            },
            capture: CaptureConfig {
                session_type,
                box_selection,
                auto_correct_specimen_id: parsed_flag(&lookup, "AUTO_CORRECT_SPECIMEN_ID")?
                    .unwrap_or(true),
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let inference = &self.inference;

        if !(0.0..=1.0).contains(&inference.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                inference.confidence_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&inference.iou_threshold) {
            return Err(ConfigError::InvalidIoUThreshold(inference.iou_threshold));
        }

        if !(32..=2048).contains(&inference.detector_input_size) {
            return Err(ConfigError::InvalidInputSize(format!(
                "detector_input_size must be between 32 and 2048, got {}",
                inference.detector_input_size
            )));
        }

        if !(32..=1024).contains(&inference.classifier_input_size) {
            return Err(ConfigError::InvalidInputSize(format!(
                "classifier_input_size must be between 32 and 1024, got {}",
                inference.classifier_input_size
            )));
        }

        if inference.models_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidModelsDir(
                "models directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn log_level(&self) -> Level {
        self.logging.log_level
    }

    pub fn session_type(&self) -> SessionType {
        self.capture.session_type
    }

    pub fn model_path(&self, file_name: &str) -> PathBuf {
        self.inference.models_dir.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::load_from(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        config.validate().unwrap();

        assert_eq!(config.log_level(), Level::INFO);
        assert_eq!(config.session_type(), SessionType::Surveillance);
        assert_eq!(config.capture.box_selection, BoxSelection::HighestConfidence);
        assert!(config.capture.auto_correct_specimen_id);
        assert_eq!(config.inference.confidence_threshold, 0.5);
        assert_eq!(config.model_path("detector.onnx"), PathBuf::from("models/detector.onnx"));
        assert!(config.inference.intra_threads >= 1);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("LOG_LEVEL", "debug"),
            ("SESSION_TYPE", "DATA_COLLECTION"),
            ("BOX_SELECTION", "largest_area"),
            ("AUTO_CORRECT_SPECIMEN_ID", "false"),
            ("INFERENCE_BACKEND", "cpu"),
            ("MODELS_DIR", "/opt/models"),
        ])
        .unwrap();

        assert_eq!(config.log_level(), Level::DEBUG);
        assert_eq!(config.session_type(), SessionType::DataCollection);
        assert_eq!(config.capture.box_selection, BoxSelection::LargestArea);
        assert!(!config.capture.auto_correct_specimen_id);
        assert_eq!(config.inference.inference_backend.as_deref(), Some("CPU"));
        assert_eq!(config.model_path("sex.onnx"), PathBuf::from("/opt/models/sex.onnx"));
    }

    #[test]
    fn test_unknown_session_type_rejected() {
        let err = config_from(&[("SESSION_TYPE", "training")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSessionType(_)));
    }

    #[test]
    fn test_malformed_values_rejected() {
        for (key, value) in [
            ("CONFIDENCE_THRESHOLD", "abc"),
            ("IOU_THRESHOLD", "0,4"),
            ("DETECTOR_INPUT_SIZE", "large"),
            ("INTRA_THREADS", "-2"),
            ("AUTO_CORRECT_SPECIMEN_ID", "ture"),
            ("LOG_LEVEL", "verbose"),
        ] {
            let err = config_from(&[(key, value)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { key: k, .. } if k == key),
                "{key}={value}: {err}"
            );
        }
    }

    #[test]
    fn test_flag_spellings() {
        for (value, expected) in [("1", true), ("YES", true), (" off ", false), ("0", false)] {
            let config = config_from(&[("AUTO_CORRECT_SPECIMEN_ID", value)]).unwrap();
            assert_eq!(config.capture.auto_correct_specimen_id, expected, "{value}");
        }

        // Blank means unset
        let config = config_from(&[("CONFIDENCE_THRESHOLD", "  ")]).unwrap();
        assert_eq!(config.inference.confidence_threshold, 0.5);
    }

    #[test]
    fn test_threshold_validation() {
        let config = config_from(&[("CONFIDENCE_THRESHOLD", "1.5")]).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfidenceThreshold(_))
        ));

        let config = config_from(&[("CLASSIFIER_INPUT_SIZE", "8")]).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidInputSize(_))));
    }
}

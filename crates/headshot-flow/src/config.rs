use crate::headshots::{HeadshotCropper, DEFAULT_CROP_PADDING};
use headshot_core::detector::SCRFD_MODEL_FILE;
use headshot_core::{
    EncodeOptions, ModelLoader, ScrfdLoader, DEFAULT_CONFIDENCE_FLOOR, DEFAULT_JPEG_QUALITY,
};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_MODEL_URL: &str =
    "https://github.com/deepinsight/insightface/releases/download/v0.7/scrfd_500m_bnkps.onnx";
const DEFAULT_MAX_SIDE: u32 = 512;

/// Pipeline configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Where to fetch the SCRFD weights when they are missing. `None` disables fetching.
    pub model_url: Option<String>,
    /// Whether the ONNX detector backend is offered at all.
    pub model_enabled: bool,
    /// Minimum confidence for a model detection to be kept.
    pub confidence_floor: f32,
    /// Padding around detected faces, in source pixels.
    pub crop_padding: u32,
    pub jpeg_quality: u8,
    /// Longest side of an extracted headshot. `None` keeps the crop size.
    pub headshot_max_side: Option<u32>,
    pub api_url: Option<String>,
    pub api_token: Option<String>,
}

impl Config {
    /// Load configuration from `HEADSHOT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse_value<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
            v.and_then(|v| v.trim().parse().ok())
        }
        let parsed_u32 = |key: &str| parse_value::<u32>(lookup(key));
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_dir = lookup("HEADSHOT_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(headshot_core::default_model_dir);

        let model_url = match lookup("HEADSHOT_MODEL_URL") {
            Some(url) if url.trim().is_empty() => None,
            Some(url) => Some(url),
            None => Some(DEFAULT_MODEL_URL.to_string()),
        };

        let headshot_max_side = match parsed_u32("HEADSHOT_MAX_SIDE").unwrap_or(DEFAULT_MAX_SIDE) {
            0 => None,
            side => Some(side),
        };

        Self {
            model_dir,
            model_url,
            model_enabled: lookup("HEADSHOT_MODEL_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(true),
            confidence_floor: parse_value(lookup("HEADSHOT_CONFIDENCE_FLOOR"))
                .unwrap_or(DEFAULT_CONFIDENCE_FLOOR)
                .clamp(0.0, 1.0),
            crop_padding: parsed_u32("HEADSHOT_CROP_PADDING").unwrap_or(DEFAULT_CROP_PADDING),
            jpeg_quality: parse_value(lookup("HEADSHOT_JPEG_QUALITY"))
                .unwrap_or(DEFAULT_JPEG_QUALITY)
                .clamp(1, 100),
            headshot_max_side,
            api_url: non_empty("HEADSHOT_API_URL"),
            api_token: non_empty("HEADSHOT_API_TOKEN"),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(SCRFD_MODEL_FILE)
    }

    /// Loader for the ONNX backend, or `None` when it is disabled.
    pub fn model_loader(&self) -> Option<Arc<dyn ModelLoader>> {
        if !self.model_enabled {
            return None;
        }
        Some(Arc::new(ScrfdLoader {
            model_path: self.scrfd_model_path(),
            model_url: self.model_url.clone(),
        }))
    }

    pub fn cropper(&self) -> HeadshotCropper {
        HeadshotCropper {
            padding: self.crop_padding,
            encode: EncodeOptions {
                quality: self.jpeg_quality,
                max_side: self.headshot_max_side,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("HEADSHOT_MODEL_DIR", "/opt/models")]);
        assert_eq!(config.scrfd_model_path(), PathBuf::from("/opt/models/scrfd_500m_bnkps.onnx"));
        assert_eq!(config.model_url.as_deref(), Some(DEFAULT_MODEL_URL));
        assert!(config.model_enabled);
        assert_eq!(config.confidence_floor, 0.5);
        assert_eq!(config.cropper().padding, 20);
        assert_eq!(config.cropper().encode.quality, 90);
        assert_eq!(config.headshot_max_side, Some(512));
        assert!(config.api_url.is_none());
        assert!(config.model_loader().is_some());
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = config(&[
            ("HEADSHOT_CONFIDENCE_FLOOR", "7"),
            ("HEADSHOT_JPEG_QUALITY", "0"),
        ]);
        assert_eq!(config.confidence_floor, 1.0);
        assert_eq!(config.jpeg_quality, 1);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = config(&[("HEADSHOT_CROP_PADDING", "lots"), ("HEADSHOT_MAX_SIDE", "-3")]);
        assert_eq!(config.crop_padding, DEFAULT_CROP_PADDING);
        assert_eq!(config.headshot_max_side, Some(DEFAULT_MAX_SIDE));
    }

    #[test]
    fn test_switches() {
        let config = config(&[
            ("HEADSHOT_MODEL_ENABLED", "0"),
            ("HEADSHOT_MODEL_URL", ""),
            ("HEADSHOT_MAX_SIDE", "0"),
            ("HEADSHOT_API_URL", "https://api.example.com"),
            ("HEADSHOT_API_TOKEN", " "),
        ]);
        assert!(config.model_loader().is_none());
        assert!(config.model_url.is_none());
        assert!(config.headshot_max_side.is_none());
        assert_eq!(config.api_url.as_deref(), Some("https://api.example.com"));
        assert!(config.api_token.is_none());
    }
}

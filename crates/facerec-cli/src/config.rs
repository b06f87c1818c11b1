use facerec_core::OnnxModels;
use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// Label store file.
    pub store_path: PathBuf,
    /// Largest embedding distance accepted as the same person.
    pub distance_threshold: f32,
    /// Minimum detector confidence for a face to count.
    pub score_threshold: f32,
    /// ONNX Runtime intra-op threads per model.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from `FACEREC_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEREC_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facerec_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facerec");

        let store_path = std::env::var("FACEREC_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("facerec.json"));

        Self {
            model_dir,
            store_path,
            distance_threshold: env_parse("FACEREC_DISTANCE_THRESHOLD", 1.10),
            score_threshold: env_parse("FACEREC_SCORE_THRESHOLD", 0.5),
            intra_threads: env_parse("FACEREC_INTRA_THREADS", 2),
        }
    }

    pub fn models(&self) -> OnnxModels {
        OnnxModels {
            score_threshold: self.score_threshold,
            distance_threshold: self.distance_threshold,
            intra_threads: self.intra_threads,
            ..OnnxModels::in_dir(&self.model_dir)
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

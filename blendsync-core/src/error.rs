use thiserror::Error;

/// All errors produced by blendsync-core.
///
/// Empty input and all-silence audio are not errors: those paths return an
/// empty result or leave the buffer untouched.
#[derive(Debug, Error)]
pub enum BlendsyncError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "{stage} returned {actual_rows}x{actual_cols}, expected {expected_rows}x{expected_cols}"
    )]
    ShapeMismatch {
        stage: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    #[error("inference error: {0}")]
    Inference(String),

    #[error("decode cancelled between windows")]
    Cancelled,

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("WAV decode error: {0}")]
    Wav(String),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BlendsyncError>;

//! ONNX backends via the `ort` crate.
//!
//! Two exported graphs, loaded from one models directory:
//! - `audio_feature_extractor.onnx`: `[1, samples]` at 88.2 kHz →
//!   `[frames, features]` (a leading batch axis of 1 is accepted too)
//! - `neurosync_decoder.onnx`: `[1, frame_size, features]` →
//!   `[1, frame_size, outputs]`
//!
//! Input and output tensor names are read from the session at load time, so
//! either graph may be re-exported with different names.
//!
//! ## Environment
//!
//! | Variable                       | Values                       |
//! |--------------------------------|------------------------------|
//! | `BLENDSYNC_MODEL_DIR`          | overrides the models dir     |
//! | `BLENDSYNC_ORT_EP`             | `cpu`, `directml`, `auto`    |
//! | `BLENDSYNC_ORT_INTRA_THREADS`  | 1..=32                       |
//! | `BLENDSYNC_ORT_INTER_THREADS`  | 1..=8                        |

use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, ArrayView2, Axis};
use ort::session::Session;
use ort::value::Value;
use ort::{
    ep,
    session::builder::{GraphOptimizationLevel, SessionBuilder},
};
use tracing::{debug, info, warn};

use crate::{
    audio::AudioBuffer,
    error::{BlendsyncError, Result},
    inference::{ChunkInference, FeatureExtractor},
};

pub const EXTRACTOR_FILE: &str = "audio_feature_extractor.onnx";
pub const DECODER_FILE: &str = "neurosync_decoder.onnx";

/// Samples fed to the extractor during warm-up (one second at 88.2 kHz).
const WARM_UP_SAMPLES: usize = 88_200;

// ── Model config ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OnnxModelConfig {
    pub extractor_path: PathBuf,
    pub decoder_path: PathBuf,
    /// Window height used for the decoder warm-up pass.
    pub frame_size: usize,
}

impl Default for OnnxModelConfig {
    fn default() -> Self {
        Self::from_dir(selected_models_dir())
    }
}

impl OnnxModelConfig {
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            extractor_path: dir.join(EXTRACTOR_FILE),
            decoder_path: dir.join(DECODER_FILE),
            frame_size: 128,
        }
    }

    /// First missing model file, if any.
    pub fn missing_file(&self) -> Option<&Path> {
        [&self.extractor_path, &self.decoder_path]
            .into_iter()
            .find(|p| !p.exists())
            .map(PathBuf::as_path)
    }
}

fn selected_models_dir() -> PathBuf {
    if let Ok(explicit) = std::env::var("BLENDSYNC_MODEL_DIR") {
        if !explicit.trim().is_empty() {
            return PathBuf::from(explicit.trim());
        }
    }
    default_models_dir()
}

pub fn default_models_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|p| {
                PathBuf::from(p)
                    .join("Lattice Labs")
                    .join("Blendsync")
                    .join("models")
            })
            .unwrap_or_else(|| PathBuf::from("models"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("blendsync")
            .join("models")
    }
}

// ── Session construction ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrtExecutionPreference {
    Auto,
    Cpu,
    DirectML,
}

impl OrtExecutionPreference {
    fn from_env() -> Self {
        parse_execution_preference(&std::env::var("BLENDSYNC_ORT_EP").unwrap_or_default())
    }

    /// DirectML is Windows-only; other hosts always run on the CPU provider.
    fn for_host(self, windows: bool) -> Self {
        if windows {
            self
        } else {
            Self::Cpu
        }
    }
}

fn parse_execution_preference(raw: &str) -> OrtExecutionPreference {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cpu" => OrtExecutionPreference::Cpu,
        "dml" | "directml" => OrtExecutionPreference::DirectML,
        _ => OrtExecutionPreference::Auto,
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn session_err(e: impl std::fmt::Display) -> BlendsyncError {
    BlendsyncError::OnnxSession(e.to_string())
}

/// Thread pool sizes for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionThreads {
    intra: usize,
    inter: usize,
}

impl SessionThreads {
    /// Intra defaults to the core count within 2..=12, inter to 1. Overrides
    /// are bounded to 1..=32 and 1..=8.
    fn resolve(intra: Option<usize>, inter: Option<usize>, logical_cores: usize) -> Self {
        Self {
            intra: intra.unwrap_or(logical_cores.clamp(2, 12)).clamp(1, 32),
            inter: inter.unwrap_or(1).clamp(1, 8),
        }
    }

    fn from_env() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::resolve(
            env_usize("BLENDSYNC_ORT_INTRA_THREADS"),
            env_usize("BLENDSYNC_ORT_INTER_THREADS"),
            cores,
        )
    }
}

fn create_session(model_path: &Path) -> Result<Session> {
    let requested = OrtExecutionPreference::from_env();
    let pref = requested.for_host(cfg!(target_os = "windows"));
    if requested == OrtExecutionPreference::DirectML && pref != requested {
        warn!("BLENDSYNC_ORT_EP=directml is only available on Windows; using CPU");
    }
    let threads = SessionThreads::from_env();
    debug!(?pref, intra = threads.intra, inter = threads.inter, "ONNX session options");

    let providers = match pref {
        #[cfg(target_os = "windows")]
        OrtExecutionPreference::DirectML => vec![
            ep::DirectML::default().with_device_id(0).build().error_on_failure(),
            ep::CPU::default().build(),
        ],
        #[cfg(target_os = "windows")]
        OrtExecutionPreference::Auto => vec![
            ep::DirectML::default().with_device_id(0).build().fail_silently(),
            ep::CPU::default().build(),
        ],
        _ => vec![ep::CPU::default().build()],
    };

    SessionBuilder::new()
        .map_err(session_err)?
        .with_intra_threads(threads.intra)
        .map_err(session_err)?
        .with_inter_threads(threads.inter)
        .map_err(session_err)?
        .with_optimization_level(GraphOptimizationLevel::All)
        .map_err(session_err)?
        .with_execution_providers(providers)
        .map_err(session_err)?
        .commit_from_file(model_path)
        .map_err(session_err)
}

/// A loaded session plus the names of its first input and output.
struct LoadedSession {
    session: Session,
    input_name: String,
    output_name: String,
}

impl LoadedSession {
    fn load(label: &str, path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BlendsyncError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let size_mb = std::fs::metadata(path)
            .map(|m| m.len() as f64 / 1_048_576.0)
            .unwrap_or(0.0);
        info!("loading {label} from {:?} ({size_mb:.2} MB)", path);

        let session = create_session(path)?;
        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| session_err(format!("{label} graph declares no inputs")))?;
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| session_err(format!("{label} graph declares no outputs")))?;
        info!(input = %input_name, output = %output_name, "{label} ready");

        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }

    /// Run with a single input tensor and return the first output as
    /// `(shape, data)`.
    fn run<D>(&mut self, input: ndarray::Array<f32, D>) -> Result<(Vec<usize>, Vec<f32>)>
    where
        D: ndarray::Dimension + 'static,
    {
        let value = Value::from_array(input).map_err(session_err)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(session_err)?;
        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(session_err)?;
        let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok((dims, data.to_vec()))
    }
}

/// Collapse an output of `[rows, cols]` or `[1, rows, cols]` into a matrix.
fn into_matrix(stage: &'static str, dims: &[usize], data: Vec<f32>) -> Result<Array2<f32>> {
    let (rows, cols) = match *dims {
        [rows, cols] => (rows, cols),
        [1, rows, cols] => (rows, cols),
        _ => {
            return Err(BlendsyncError::Inference(format!(
                "{stage} returned unsupported output rank {dims:?}"
            )))
        }
    };
    Array2::from_shape_vec((rows, cols), data).map_err(|e| {
        BlendsyncError::Inference(format!("{stage} output does not match shape {dims:?}: {e}"))
    })
}

// ── Feature extractor ────────────────────────────────────────────────────────

/// `audio_feature_extractor.onnx` as a [`FeatureExtractor`].
///
/// The session is created lazily by `warm_up` (or the first `extract`).
pub struct OnnxFeatureExtractor {
    path: PathBuf,
    session: Option<LoadedSession>,
}

impl OnnxFeatureExtractor {
    pub fn new(config: &OnnxModelConfig) -> Self {
        Self {
            path: config.extractor_path.clone(),
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut LoadedSession> {
        if self.session.is_none() {
            self.session = Some(LoadedSession::load("feature extractor", &self.path)?);
        }
        self.session
            .as_mut()
            .ok_or_else(|| session_err("feature extractor session unavailable"))
    }
}

impl FeatureExtractor for OnnxFeatureExtractor {
    fn warm_up(&mut self) -> Result<()> {
        let session = self.session()?;
        session.run(Array2::<f32>::zeros((1, WARM_UP_SAMPLES)))?;
        info!("feature extractor warm-up complete");
        Ok(())
    }

    fn extract(&mut self, audio: &AudioBuffer) -> Result<Array2<f32>> {
        if audio.is_empty() {
            return Ok(Array2::zeros((0, 0)));
        }
        let input = Array2::from_shape_vec((1, audio.len()), audio.samples.clone())
            .map_err(|e| BlendsyncError::Inference(e.to_string()))?;
        let (dims, data) = self.session()?.run(input)?;
        let features = into_matrix("feature extractor", &dims, data)?;
        debug!(
            samples = audio.len(),
            frames = features.nrows(),
            features = features.ncols(),
            "features extracted"
        );
        Ok(features)
    }
}

// ── Decoder ──────────────────────────────────────────────────────────────────

/// `neurosync_decoder.onnx` as a [`ChunkInference`] backend.
pub struct OnnxDecoder {
    path: PathBuf,
    frame_size: usize,
    session: Option<LoadedSession>,
    /// Feature width seen by the extractor; learned on first `infer` and used
    /// for the warm-up window when the graph does not declare it.
    num_features: usize,
}

impl OnnxDecoder {
    pub fn new(config: &OnnxModelConfig) -> Self {
        Self {
            path: config.decoder_path.clone(),
            frame_size: config.frame_size,
            session: None,
            num_features: 256,
        }
    }

    fn session(&mut self) -> Result<&mut LoadedSession> {
        if self.session.is_none() {
            let loaded = LoadedSession::load("decoder", &self.path)?;
            if let Some(width) = loaded
                .session
                .inputs()
                .first()
                .and_then(|i| i.dtype().tensor_shape())
                .and_then(|s| s.last().copied())
                .filter(|&d| d > 0)
            {
                self.num_features = width as usize;
            }
            self.session = Some(loaded);
        }
        self.session
            .as_mut()
            .ok_or_else(|| session_err("decoder session unavailable"))
    }
}

impl ChunkInference for OnnxDecoder {
    fn warm_up(&mut self) -> Result<()> {
        self.session()?;
        let window = Array2::<f32>::zeros((self.frame_size, self.num_features));
        self.infer(window.view())?;
        info!(
            frame_size = self.frame_size,
            num_features = self.num_features,
            "decoder warm-up complete"
        );
        Ok(())
    }

    fn infer(&mut self, window: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let input: Array3<f32> = window.to_owned().insert_axis(Axis(0));
        let (dims, data) = self.session()?.run(input)?;
        into_matrix("decoder", &dims, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_preference_parses_aliases() {
        assert_eq!(parse_execution_preference("CPU"), OrtExecutionPreference::Cpu);
        assert_eq!(parse_execution_preference(" dml "), OrtExecutionPreference::DirectML);
        assert_eq!(parse_execution_preference(""), OrtExecutionPreference::Auto);
    }

    #[test]
    fn directml_falls_back_to_cpu_off_windows() {
        let dml = OrtExecutionPreference::DirectML;
        assert_eq!(dml.for_host(true), OrtExecutionPreference::DirectML);
        assert_eq!(dml.for_host(false), OrtExecutionPreference::Cpu);
        assert_eq!(
            OrtExecutionPreference::Auto.for_host(false),
            OrtExecutionPreference::Cpu
        );
    }

    #[test]
    fn session_threads_follow_cores_and_overrides() {
        assert_eq!(
            SessionThreads::resolve(None, None, 1),
            SessionThreads { intra: 2, inter: 1 }
        );
        assert_eq!(
            SessionThreads::resolve(None, None, 64),
            SessionThreads { intra: 12, inter: 1 }
        );
        assert_eq!(
            SessionThreads::resolve(Some(0), Some(99), 8),
            SessionThreads { intra: 1, inter: 8 }
        );
        assert_eq!(
            SessionThreads::resolve(Some(48), Some(3), 8),
            SessionThreads { intra: 32, inter: 3 }
        );
    }

    #[test]
    fn output_rank_two_and_three_are_accepted() {
        let m = into_matrix("t", &[2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(m.dim(), (2, 3));
        let m = into_matrix("t", &[1, 4, 2], vec![0.0; 8]).unwrap();
        assert_eq!(m.dim(), (4, 2));
        assert!(into_matrix("t", &[2, 2, 2], vec![0.0; 8]).is_err());
    }

    #[test]
    fn missing_model_file_is_reported() {
        let cfg = OnnxModelConfig::from_dir("/definitely/not/here");
        assert_eq!(cfg.missing_file(), Some(cfg.extractor_path.as_path()));
        let mut extractor = OnnxFeatureExtractor::new(&cfg);
        let err = extractor.warm_up().unwrap_err();
        assert!(matches!(err, BlendsyncError::ModelNotFound { .. }));
    }
}

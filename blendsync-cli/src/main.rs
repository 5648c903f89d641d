//! `blendsync`: turn a WAV file into a JSON blendshape clip.

mod settings;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use blendsync_core::inference::stub::{StubDecoder, StubExtractor};
use blendsync_core::{read_wav, BlendshapeEngine, DecoderHandle, EngineConfig, ExtractorHandle};
use clap::Parser;
use tracing::{info, warn};

use settings::{
    apply_runtime_env_from_settings, default_settings_path, load_settings, save_settings, Settings,
};

#[derive(Debug, Parser)]
#[command(name = "blendsync")]
#[command(about = "Generate facial blendshape frames from speech audio")]
struct Args {
    /// Input WAV file
    input: PathBuf,

    /// Write the clip here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory holding the extractor and decoder ONNX models
    #[arg(long)]
    models: Option<PathBuf>,

    /// Use the deterministic stub backends instead of ONNX models
    #[arg(long)]
    stub: bool,

    /// Settings file (defaults to the user data directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Persist the effective settings back to the settings file
    #[arg(long)]
    save_settings: bool,

    /// Sample rate the audio is converted to before feature extraction
    #[arg(long)]
    target_rate: Option<u32>,

    /// Rows per decoder window
    #[arg(long)]
    frame_size: Option<usize>,

    /// Rows shared and cross-faded between consecutive windows
    #[arg(long)]
    overlap: Option<usize>,

    /// Use the polynomial resampler instead of linear interpolation
    #[arg(long)]
    cubic: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

impl Args {
    /// Command-line flags win over the settings file.
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(rate) = self.target_rate {
            settings.target_sample_rate = rate;
        }
        if let Some(frame_size) = self.frame_size {
            settings.frame_size = frame_size;
        }
        if let Some(overlap) = self.overlap {
            settings.overlap = overlap;
        }
        if self.cubic {
            settings.resample_quality = "cubic".into();
        }
        if self.pretty {
            settings.pretty_output = true;
        }
        if let Some(dir) = self.models.as_ref() {
            settings.models_dir = Some(dir.display().to_string());
        }
        settings.normalize();
    }
}

fn stub_backends() -> (ExtractorHandle, DecoderHandle) {
    (
        ExtractorHandle::new(StubExtractor::default()),
        DecoderHandle::new(StubDecoder::default()),
    )
}

#[cfg(feature = "onnx")]
fn model_backends(
    args: &Args,
    config: &EngineConfig,
) -> anyhow::Result<(ExtractorHandle, DecoderHandle)> {
    use blendsync_core::{BlendsyncError, OnnxDecoder, OnnxFeatureExtractor, OnnxModelConfig};

    let mut model_cfg = match args.models.as_ref() {
        Some(dir) => OnnxModelConfig::from_dir(dir),
        None => OnnxModelConfig::default(),
    };
    model_cfg.frame_size = config.decoder.frame_size;

    if let Some(missing) = model_cfg.missing_file() {
        if args.models.is_some() {
            return Err(BlendsyncError::ModelNotFound {
                path: missing.to_path_buf(),
            })
            .context("explicit --models directory is incomplete");
        }
        warn!("ONNX model file {:?} not found; using stub backends", missing);
        return Ok(stub_backends());
    }

    info!("loading ONNX models from {:?}", model_cfg.extractor_path.parent());
    Ok((
        ExtractorHandle::new(OnnxFeatureExtractor::new(&model_cfg)),
        DecoderHandle::new(OnnxDecoder::new(&model_cfg)),
    ))
}

#[cfg(not(feature = "onnx"))]
fn model_backends(
    _args: &Args,
    _config: &EngineConfig,
) -> anyhow::Result<(ExtractorHandle, DecoderHandle)> {
    warn!("built without the `onnx` feature; using stub backends");
    Ok(stub_backends())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    // stdout may carry the clip, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("blendsync=info,blendsync_core=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // ── Settings ──────────────────────────────────────────────────────────
    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    args.apply_to(&mut settings);
    if args.save_settings {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("failed to write settings to {}", settings_path.display()))?;
        info!(settings_path = ?settings_path, "settings saved");
    }
    apply_runtime_env_from_settings(&settings);
    info!(
        settings_path = ?settings_path,
        target_sample_rate = settings.target_sample_rate,
        resample_quality = %settings.resample_quality,
        frame_size = settings.frame_size,
        overlap = settings.overlap,
        ort_ep = %settings.ort_ep,
        "runtime settings loaded"
    );

    // ── Engine setup ──────────────────────────────────────────────────────
    let config = settings.to_engine_config();
    let (extractor, decoder) = if args.stub {
        info!("using stub backends");
        stub_backends()
    } else {
        model_backends(&args, &config)?
    };
    let engine = Arc::new(
        BlendshapeEngine::new(config, extractor, decoder).context("invalid engine configuration")?,
    );

    {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.warm_up())
            .await
            .context("warm-up task died")?
            .context("model warm-up failed")?;
    }

    // ── Generate ──────────────────────────────────────────────────────────
    let raw = read_wav(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let started = Instant::now();

    let generation = Arc::clone(&engine).generate_blocking(raw);
    tokio::pin!(generation);
    let result = tokio::select! {
        result = &mut generation => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received; cancelling generation");
            engine.cancel();
            generation.await
        }
    };
    let clip = result.context("blendshape generation failed")?;

    let diagnostics = engine.diagnostics_snapshot();
    info!(
        frames = clip.len(),
        outputs = clip.output_features,
        duration_secs = clip.duration_secs(),
        windows = diagnostics.windows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "clip generated"
    );

    // ── Output ────────────────────────────────────────────────────────────
    let json = if settings.pretty_output {
        serde_json::to_string_pretty(&clip)
    } else {
        serde_json::to_string(&clip)
    }
    .context("failed to serialize clip")?;

    match args.output.as_ref() {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = ?path, "clip written");
        }
        None => println!("{json}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let args = Args::parse_from([
            "blendsync",
            "in.wav",
            "--frame-size",
            "64",
            "--overlap",
            "16",
            "--cubic",
            "--target-rate",
            "48000",
        ]);
        let mut settings = Settings::default();
        args.apply_to(&mut settings);
        assert_eq!(settings.frame_size, 64);
        assert_eq!(settings.overlap, 16);
        assert_eq!(settings.resample_quality, "cubic");
        assert_eq!(settings.target_sample_rate, 48_000);
        assert!(!args.stub);
    }

    #[test]
    fn overlap_not_below_frame_size_is_rejected() {
        let args = Args::parse_from([
            "blendsync",
            "in.wav",
            "--frame-size",
            "128",
            "--overlap",
            "500",
        ]);
        let mut settings = Settings::default();
        args.apply_to(&mut settings);
        assert_eq!(settings.overlap, 500);

        let (extractor, decoder) = stub_backends();
        let err = BlendshapeEngine::new(settings.to_engine_config(), extractor, decoder)
            .unwrap_err();
        assert!(matches!(err, blendsync_core::BlendsyncError::InvalidConfig(_)));
    }

    #[test]
    fn zero_target_rate_is_rejected() {
        let args = Args::parse_from(["blendsync", "in.wav", "--target-rate", "0"]);
        let mut settings = Settings::default();
        args.apply_to(&mut settings);

        let (extractor, decoder) = stub_backends();
        let err = BlendshapeEngine::new(settings.to_engine_config(), extractor, decoder)
            .unwrap_err();
        assert!(matches!(err, blendsync_core::BlendsyncError::InvalidConfig(_)));
    }

    #[test]
    fn no_flags_keep_settings() {
        let args = Args::parse_from(["blendsync", "in.wav", "-o", "out.json"]);
        let mut settings = Settings {
            overlap: 16,
            ..Default::default()
        };
        args.apply_to(&mut settings);
        assert_eq!(settings.overlap, 16);
        assert_eq!(args.output, Some(PathBuf::from("out.json")));
    }
}

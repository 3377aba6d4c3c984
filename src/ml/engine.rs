// ============================================================
// Layer 5 — Inference Engine
// ============================================================
// Owns the model lifecycle and the classification pass.
//
// Lifecycle: UNLOADED → LOADING → LOADED, or → FAILED when the
// artifacts cannot be fetched or restored. Loading happens at
// most once per process (it is expensive: possible network
// fetch + weight deserialization); the ModelManager below gives
// single-flight semantics so concurrent first callers share one
// load instead of each triggering their own.
//
// The classification pass itself:
//   decode → validate → preprocess → forward (no gradients)
//   → softmax → arg-max → percentages rounded to 2 decimals
//
// Accelerator out-of-memory does not come back as a Result from
// the tensor runtime — it panics. The engine catches panics at
// its own boundary and converts them into the closed error
// taxonomy (ResourceExhausted vs Internal), so callers decide
// retryability from the variant, never from message text.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §16 (Shared-State Concurrency)

use std::any::Any;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use burn::{
    module::AutodiffModule,
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::data::preprocessor::Preprocessor;
use crate::data::validator::ImageValidator;
use crate::domain::error::AnalysisError;
use crate::domain::image::{DecodedImage, SaliencyOverlay};
use crate::domain::report::{ClassProbability, ClassificationResult};
use crate::domain::traits::Analyzer;
use crate::infra::model_repository::ModelRepository;
use crate::ml::model::{ModelSpec, XrayCnn, XrayCnnConfig, FALLBACK_LABELS, MIN_WORKING_RESOLUTION};
use crate::ml::saliency::SaliencyGenerator;
use crate::ml::{Device, GradBackend, ScratchGuard};

/// A fully loaded model: weights, paired preprocessor, ordered
/// label vocabulary and the device they live on.
///
/// The model is held on the autodiff backend so the saliency
/// pass can backpropagate; the classification pass takes a
/// gradient-free view via `valid()`. Both passes therefore share
/// one weight instance. Read-only after load.
#[derive(Debug)]
pub struct InferenceEngine {
    pub(crate) model:        XrayCnn<GradBackend>,
    pub(crate) preprocessor: Preprocessor,
    pub(crate) labels:       Vec<String>,
    pub(crate) device:       Device,
}

impl InferenceEngine {
    /// Fetch the artifacts for `repo` and restore the model.
    ///
    /// Any failure (network, auth, corrupt weights, nonsense
    /// config) is a ModelLoad error and leaves no partially
    /// initialised engine behind — the constructor either
    /// returns a usable engine or nothing.
    pub fn load(repo: &str, token: Option<&str>) -> Result<Self, AnalysisError> {
        let repository = ModelRepository::from_env();
        let artifacts = repository
            .fetch(repo, token)
            .map_err(|e| AnalysisError::ModelLoad(format!("{e:#}")))?;

        let raw = fs::read_to_string(&artifacts.config).map_err(|e| {
            AnalysisError::ModelLoad(format!(
                "cannot read {}: {e}",
                artifacts.config.display()
            ))
        })?;
        let spec: ModelSpec = serde_json::from_str(&raw)
            .map_err(|e| AnalysisError::ModelLoad(format!("invalid model config: {e}")))?;

        if spec.preprocess.image_size < MIN_WORKING_RESOLUTION {
            return Err(AnalysisError::ModelLoad(format!(
                "working resolution {} is below the architecture minimum {}",
                spec.preprocess.image_size, MIN_WORKING_RESOLUTION
            )));
        }

        // The model's own mapping is authoritative. The hardcoded
        // pair is a last resort for legacy artifacts and is
        // flagged loudly, because it silently mislabels any model
        // with different or additional classes.
        let labels = match spec.labels() {
            Some(labels) => labels,
            None => {
                tracing::warn!(
                    "Model config has no usable id2label mapping; \
                     falling back to {:?}",
                    FALLBACK_LABELS
                );
                FALLBACK_LABELS.iter().map(|s| s.to_string()).collect()
            }
        };

        let device = Device::default();
        let model_cfg = XrayCnnConfig::new(labels.len())
            .with_image_size(spec.preprocess.image_size)
            .with_dropout(spec.dropout);
        let model: XrayCnn<GradBackend> = model_cfg.init(&device);

        let record = CompactRecorder::new()
            .load(artifacts.weights_stem.clone(), &device)
            .map_err(|e| {
                AnalysisError::ModelLoad(format!(
                    "cannot restore weights from '{}': {e:?}",
                    artifacts.weights_stem.display()
                ))
            })?;
        let model = model.load_record(record);

        tracing::info!(
            "Model loaded from '{}' ({} classes: {:?}, {}px)",
            repo,
            labels.len(),
            labels,
            spec.preprocess.image_size,
        );

        Ok(Self {
            model,
            preprocessor: Preprocessor::new(spec.preprocess),
            labels,
            device,
        })
    }

    /// Classify raw image bytes.
    ///
    /// Validation happens before any tensor work, so an invalid
    /// image performs zero model invocations. The validated image
    /// is returned alongside the result for reuse by the saliency
    /// pass.
    pub fn analyze(
        &self,
        bytes: &[u8],
    ) -> Result<(ClassificationResult, DecodedImage), AnalysisError> {
        let image = ImageValidator::decode_and_validate(bytes)?;

        // Scratch allocations are settled when this guard drops,
        // on every exit path.
        let _scratch = ScratchGuard::new(&self.device);

        let probabilities = self.run_forward(&image)?;
        let result = build_classification(&self.labels, &probabilities)?;

        tracing::info!(
            "Analysis complete: {} ({:.2}%)",
            result.label,
            result.confidence
        );
        Ok((result, image))
    }

    /// The ordered label vocabulary of the loaded model.
    pub fn label_vocabulary(&self) -> &[String] {
        &self.labels
    }

    /// The model's square working resolution in pixels.
    pub fn working_resolution(&self) -> usize {
        self.preprocessor.resolution()
    }

    /// Human-readable description of the device the model lives on.
    pub fn device_description(&self) -> String {
        format!("wgpu {:?}", self.device)
    }

    /// One gradient-free forward pass → softmax probabilities.
    fn run_forward(&self, image: &DecodedImage) -> Result<Vec<f32>, AnalysisError> {
        let input_data = self.preprocessor.to_model_input(image);
        let size = self.preprocessor.resolution();

        // The tensor runtime reports out-of-memory by panicking;
        // contain that here and translate it into the taxonomy.
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let model = self.model.valid();
            let input = Tensor::<crate::ml::InferBackend, 1>::from_floats(
                input_data.as_slice(),
                &self.device,
            )
            .reshape([1, 3, size, size]);

            let logits = model.forward(input);
            let probs = burn::tensor::activation::softmax(logits, 1);
            probs.into_data().to_vec::<f32>()
        }));

        match outcome {
            Ok(Ok(probabilities)) => Ok(probabilities),
            Ok(Err(e)) => Err(AnalysisError::Internal(format!(
                "could not read probabilities from device: {e:?}"
            ))),
            Err(payload) => Err(classify_panic(payload)),
        }
    }
}

impl Analyzer for InferenceEngine {
    fn classify(
        &self,
        bytes: &[u8],
    ) -> Result<(ClassificationResult, DecodedImage), AnalysisError> {
        self.analyze(bytes)
    }

    fn explain(&self, image: &DecodedImage) -> Option<SaliencyOverlay> {
        SaliencyGenerator::new(self).generate(image)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Round a percentage to 2 decimal places.
pub(crate) fn round2(percent: f64) -> f64 {
    (percent * 100.0).round() / 100.0
}

/// Turn raw softmax probabilities into the result contract:
/// arg-max label, confidence and per-class percentages, all
/// rounded to 2 decimals.
pub(crate) fn build_classification(
    labels: &[String],
    probabilities: &[f32],
) -> Result<ClassificationResult, AnalysisError> {
    if probabilities.len() != labels.len() {
        return Err(AnalysisError::Internal(format!(
            "model produced {} probabilities for {} labels",
            probabilities.len(),
            labels.len()
        )));
    }

    let (best_idx, best_prob) = probabilities
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| AnalysisError::Internal("model produced no probabilities".into()))?;

    let distribution = labels
        .iter()
        .zip(probabilities)
        .map(|(label, &p)| ClassProbability {
            label:   label.clone(),
            percent: round2(p as f64 * 100.0),
        })
        .collect();

    Ok(ClassificationResult {
        label:      labels[best_idx].clone(),
        confidence: round2(*best_prob as f64 * 100.0),
        distribution,
    })
}

/// Classify a caught panic payload into the error taxonomy.
/// Out-of-memory style failures become ResourceExhausted so the
/// host can answer with a retryable status; everything else is
/// Internal.
pub(crate) fn classify_panic(payload: Box<dyn Any + Send>) -> AnalysisError {
    let text = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "inference pass panicked".to_string()
    };

    let lowered = text.to_lowercase();
    let exhausted = lowered.contains("out of memory")
        || lowered.contains("outofmemory")
        || lowered.contains("allocation failed")
        || lowered.contains("oom");

    if exhausted {
        AnalysisError::ResourceExhausted(text)
    } else {
        AnalysisError::Internal(text)
    }
}

// ─── ModelManager — single-flight load guard ──────────────────────────────────

/// Engine lifecycle state. `Loading` has no explicit variant:
/// it is the window in which the write lock is held, so
/// concurrent first callers queue on the lock and then observe
/// the outcome.
enum EngineState {
    Unloaded,
    Loaded(Arc<InferenceEngine>),
    Failed(String),
}

/// Lazily initialised, process-wide owner of the engine.
///
/// Injected into request handlers by dependency passing (behind
/// an `Arc`), never reached through ambient global state — which
/// keeps tests free to substitute a stub and makes the
/// concurrency story explicit.
pub struct ModelManager {
    state: RwLock<EngineState>,
}

impl ModelManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState::Unloaded),
        }
    }

    /// Load the model if it is not loaded yet.
    ///
    /// Idempotent after success: further calls return the
    /// existing engine without touching the repository. After a
    /// failure the state is FAILED; only this method (an explicit
    /// operator retry) attempts the load again — `get` keeps
    /// refusing traffic.
    pub fn load(&self, repo: &str, token: Option<&str>) -> Result<Arc<InferenceEngine>, AnalysisError> {
        // Fast path: already loaded, no lock contention beyond a read.
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let EngineState::Loaded(engine) = &*state {
                return Ok(Arc::clone(engine));
            }
        }

        // Single flight: whoever wins the write lock performs the
        // load; everyone else blocks here and re-checks.
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let EngineState::Loaded(engine) = &*state {
            return Ok(Arc::clone(engine));
        }

        tracing::info!("Loading model from '{}'", repo);
        match InferenceEngine::load(repo, token) {
            Ok(engine) => {
                let engine = Arc::new(engine);
                *state = EngineState::Loaded(Arc::clone(&engine));
                Ok(engine)
            }
            Err(e) => {
                tracing::error!("Model load failed: {e}");
                *state = EngineState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// The engine, if and only if a load has succeeded.
    pub fn get(&self) -> Result<Arc<InferenceEngine>, AnalysisError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            EngineState::Loaded(engine) => Ok(Arc::clone(engine)),
            EngineState::Unloaded       => Err(AnalysisError::NotLoaded),
            EngineState::Failed(reason) => Err(AnalysisError::ModelLoad(reason.clone())),
        }
    }

    /// Current lifecycle state, for operator-facing `info` output.
    pub fn state_name(&self) -> &'static str {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            EngineState::Unloaded  => "UNLOADED",
            EngineState::Loaded(_) => "LOADED",
            EngineState::Failed(_) => "FAILED",
        }
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

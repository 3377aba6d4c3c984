// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
// No other layer imports from burn directly — only this one.
//
// Why isolate Burn code here?
//   - If Burn's API changes, we only update this layer
//   - Other layers are testable without a GPU
//   - The model architecture is clearly separated from
//     image handling and application logic
//
// What's in this layer:
//
//   model.rs    — The CNN classifier architecture plus the
//                 ModelSpec read from the repository's
//                 config.json (labels, resolution, transform
//                 parameters), which lets inference rebuild
//                 the exact architecture before loading weights
//
//   engine.rs   — The inference engine and its single-flight
//                 ModelManager: loads artifacts once per
//                 process, runs the gradient-free forward
//                 pass, softmax, arg-max and rounding
//
//   saliency.rs — The attribution pass: re-runs the model with
//                 gradient tracking, backpropagates the winning
//                 logit to the input, and composites the
//                 normalised gradient heatmap over the original
//                 image
//
// Concurrency note (host precondition, not an assumption): the
// loaded model is read-only shared state. If the wgpu adapter in
// use is not safe for uncoordinated concurrent passes, the host
// must serialize calls into this layer (e.g. a single-slot
// semaphore around analyze/saliency).
//
// Reference: Burn Book §3 (Building Blocks)
//            Simonyan et al. (2014) Deep Inside Convolutional
//            Networks (image-specific saliency)

use burn::tensor::backend::Backend;

/// CNN classifier architecture + repository ModelSpec
pub mod model;

/// Inference engine and single-flight model manager
pub mod engine;

/// Gradient-based saliency map generation
pub mod saliency;

/// Backend for plain forward passes
pub type InferBackend = burn::backend::Wgpu;

/// Backend for the saliency pass — same device, with autodiff
pub type GradBackend = burn::backend::Autodiff<InferBackend>;

pub type Device = burn::backend::wgpu::WgpuDevice;

/// Scoped device cleanup. Dropping the guard synchronises the
/// device so per-request scratch allocations are settled before
/// the call returns — success or failure — and cannot pile up
/// across thousands of requests.
pub(crate) struct ScratchGuard<'a> {
    device: &'a Device,
}

impl<'a> ScratchGuard<'a> {
    pub(crate) fn new(device: &'a Device) -> Self {
        Self { device }
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        <InferBackend as Backend>::sync(self.device);
    }
}

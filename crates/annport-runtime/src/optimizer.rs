use std::path::Path;

use anyhow::anyhow;
use annport_core::{
    AnnError, Backend, BackendId, BackendOptions, DeviceSpec, OptimizerOptions, Result,
    ShapeInferenceMethod,
};
use tracing::debug;

const ALLOW_EXPANDED_DIMS: bool = false;
const SHAPE_INFERENCE: ShapeInferenceMethod = ShapeInferenceMethod::ValidateOnly;

/// Builds the option set for one optimization run.
///
/// Precision reduction, shape inference and expanded dims are fixed policy.
/// The cache keys are only present when `cache_path` is given.
pub fn optimizer_options(
    compute: &BackendId,
    fast_math: bool,
    save_cache: bool,
    cache_path: Option<&Path>,
) -> OptimizerOptions {
    let mut options = OptimizerOptions {
        reduce_fp32_to_fp16: false,
        shape_inference: SHAPE_INFERENCE,
        allow_expanded_dims: ALLOW_EXPANDED_DIMS,
        model_options: Vec::new(),
    };

    let mut accel = BackendOptions::new(compute.clone()).with("FastMathEnabled", fast_math);
    if let Some(path) = cache_path {
        accel.add("SaveCachedNetwork", save_cache);
        accel.add("CachedNetworkFilePath", path.to_string_lossy().into_owned());
    }
    options.add_model_option(accel);

    options.add_model_option(
        BackendOptions::new(BackendId::new("AllowExpandedDims"))
            .with("AllowExpandedDims", ALLOW_EXPANDED_DIMS),
    );
    options.add_model_option(
        BackendOptions::new(BackendId::new("ShapeInferenceMethod")).with(
            "InferAndValidate",
            SHAPE_INFERENCE == ShapeInferenceMethod::InferAndValidate,
        ),
    );

    options
}

pub fn optimize<B: Backend>(
    backend: &B,
    graph: B::Graph,
    compute: &BackendId,
    device: &DeviceSpec,
    options: &OptimizerOptions,
) -> Result<B::Network> {
    if !device.supports(compute) {
        return Err(AnnError::Optimization(anyhow!(
            "{} backend does not support compute backend {compute} (available: {:?})",
            backend.name(),
            device.supported_backends
        )));
    }
    debug!(%compute, backend = backend.name(), "optimizing network");
    backend
        .optimize(graph, std::slice::from_ref(compute), device, options)
        .map_err(AnnError::Optimization)
}

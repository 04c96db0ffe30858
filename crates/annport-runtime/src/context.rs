//! The runtime context: one backend execution context plus the networks
//! loaded onto it.

use std::path::Path;

use annport_core::{
    AnnError, Backend, BackendOptions, BindingInfo, BoundInput, BoundOutput, CompactShape,
    DType, NetworkHandle, Result, RuntimeOptions,
};
use tracing::{debug, error, info, warn};

use crate::registry::{LoadedNetwork, NetworkRegistry};
use crate::{loader, logging, optimizer, LoadOptions, RuntimeConfig};

pub struct RuntimeContext<B: Backend> {
    config: RuntimeConfig,
    backend: B,
    networks: NetworkRegistry,
    closed: bool,
}

impl<B: Backend> RuntimeContext<B> {
    /// Validates `config`, configures logging and creates the backend.
    pub fn init(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        logging::configure(config.log_severity);

        let options = runtime_options(&config);
        let backend = B::create(&options).map_err(AnnError::BackendCreate)?;
        backend.configure_logging(config.log_severity);
        info!(
            backend = backend.name(),
            compute = %config.compute,
            tuning_level = config.tuning_level,
            "runtime initialized"
        );

        Ok(Self {
            config,
            backend,
            networks: NetworkRegistry::new(),
            closed: false,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    /// Parses, optimizes and loads a model. Nothing is registered unless every
    /// step succeeds.
    pub fn load(
        &mut self,
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<NetworkHandle> {
        let path = path.as_ref();
        options.validate()?;
        if !path.exists() {
            return Err(AnnError::model_load(
                path,
                anyhow::anyhow!("model file does not exist"),
            ));
        }

        let parsed = loader::load_model(
            &self.backend,
            path,
            &options.input_name,
            &options.output_name,
            options.format,
        )?;

        let opt_options = optimizer::optimizer_options(
            &self.config.compute,
            options.fast_math,
            options.save_cached_network,
            options.cached_network_path.as_deref(),
        );
        let device = self.backend.device_spec();
        let network = optimizer::optimize(
            &self.backend,
            parsed.graph,
            &self.config.compute,
            &device,
            &opt_options,
        )?;

        let network_id = self
            .backend
            .load_network(network)
            .map_err(AnnError::Optimization)?;

        let handle = self.networks.insert(LoadedNetwork {
            network_id,
            input: parsed.input,
            output: parsed.output,
        });
        info!(
            %handle,
            path = %path.display(),
            format = %parsed.format,
            "network loaded"
        );
        Ok(handle)
    }

    /// Runs one forward pass, reading `input` and writing `output`.
    ///
    /// Buffer sizes are not checked against the descriptors here.
    pub fn embed(&self, handle: NetworkHandle, input: &[u8], output: &mut [u8]) -> Result<()> {
        let entry = self.networks.get(handle)?;
        let inputs = [BoundInput {
            id: entry.input.id,
            desc: &entry.input.desc,
            data: input,
        }];
        let mut outputs = [BoundOutput {
            id: entry.output.id,
            desc: &entry.output.desc,
            data: output,
        }];
        self.backend
            .enqueue_workload(entry.network_id, &inputs, &mut outputs)
            .map_err(|source| AnnError::Execution { handle, source })
    }

    /// Checked f32 forward pass: validates the input element count and
    /// allocates the output from the output descriptor.
    pub fn embed_f32(&self, handle: NetworkHandle, input: &[f32]) -> Result<Vec<f32>> {
        let entry = self.networks.get(handle)?;
        check_f32(handle, &entry.input, input.len())?;
        check_f32(handle, &entry.output, entry.output.desc.numel())?;

        let mut output = vec![0f32; entry.output.desc.numel()];
        let input_bytes = f32_bytes(input);
        let mut output_bytes = vec![0u8; output.len() * 4];
        self.embed(handle, &input_bytes, &mut output_bytes)?;
        for (value, chunk) in output.iter_mut().zip(output_bytes.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(output)
    }

    /// Releases the network. The handle is dead afterwards even if the backend
    /// reports a failure while releasing.
    pub fn unload(&mut self, handle: NetworkHandle) -> Result<()> {
        let entry = self.networks.remove(handle)?;
        self.backend
            .unload_network(entry.network_id)
            .map_err(|source| AnnError::Execution { handle, source })?;
        debug!(%handle, "network unloaded");
        Ok(())
    }

    /// First four dimensions of the input or output tensor, 16 bits each.
    pub fn shape(&self, handle: NetworkHandle, is_input: bool) -> Result<u64> {
        let binding = self.networks.binding(handle, is_input)?;
        let dims = binding.desc.shape.dims();
        if !CompactShape::fits(dims) {
            warn!(
                %handle,
                is_input,
                ?dims,
                "shape does not fit the compact encoding and will be truncated"
            );
        }
        Ok(CompactShape::encode(dims).raw())
    }

    /// Full dimension list, without the compact encoding's limits.
    pub fn dims(&self, handle: NetworkHandle, is_input: bool) -> Result<Vec<usize>> {
        let binding = self.networks.binding(handle, is_input)?;
        Ok(binding.desc.shape.dims().to_vec())
    }

    pub fn binding(&self, handle: NetworkHandle, is_input: bool) -> Result<&BindingInfo> {
        self.networks.binding(handle, is_input)
    }

    /// Tears the context down. Networks still loaded are unloaded first, then
    /// the backend gets to persist its tuning data. Dropping the context does
    /// the same.
    pub fn destroy(mut self) {
        self.teardown();
        info!("runtime destroyed");
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let leftover = self.networks.handles();
        if !leftover.is_empty() {
            warn!(count = leftover.len(), "destroying runtime with networks still loaded");
        }
        for handle in leftover {
            if let Err(e) = self.unload(handle) {
                error!(%handle, error = %e, "failed to unload network during teardown");
            }
        }
        if let Err(e) = self.backend.shutdown() {
            error!(
                backend = self.backend.name(),
                error = ?e,
                "backend shutdown failed"
            );
        }
    }
}

impl<B: Backend> Drop for RuntimeContext<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Creation options addressed to the compute backend: tuning level, memory
/// strategy and the optional tuning file.
pub fn runtime_options(config: &RuntimeConfig) -> RuntimeOptions {
    let mut accel = BackendOptions::new(config.compute.clone())
        .with("TuningLevel", i64::from(config.tuning_level))
        .with("MemoryOptimizerStrategy", "ConstantMemoryStrategy");
    if let Some(file) = &config.tuning_file {
        accel.add("TuningFile", file.to_string_lossy().into_owned());
    }
    RuntimeOptions {
        backend_options: vec![accel],
    }
}

fn check_f32(handle: NetworkHandle, binding: &BindingInfo, len: usize) -> Result<()> {
    if binding.desc.dtype != DType::F32 {
        return Err(AnnError::InvalidInput {
            handle,
            reason: format!("expected an f32 tensor, network uses {:?}", binding.desc.dtype),
        });
    }
    if len != binding.desc.numel() {
        return Err(AnnError::InvalidInput {
            handle,
            reason: format!(
                "got {len} elements, network shape {:?} needs {}",
                binding.desc.shape.dims(),
                binding.desc.numel()
            ),
        });
    }
    Ok(())
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

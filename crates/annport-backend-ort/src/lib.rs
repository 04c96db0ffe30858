use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use annport_core::{
    Backend, BackendId, BindingId, BindingInfo, BoundInput, BoundOutput, DType, DeviceSpec,
    LogSeverity, ModelFormat, ModelParser, ModelSource, NetworkId, OptimizerOptions,
    RuntimeOptions, Shape, TensorDescriptor,
};
use bytes::Bytes;
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session, SessionInputValue,
    },
    tensor::TensorElementType,
    value::{DynValue, ValueType},
};
use parking_lot::Mutex;
use tracing::{debug, info};

const FAST_MATH_ENTRY: &str = "mlas.enable_gemm_fastmath_arm64_bfloat16";

/// Where a graph's model bytes come from, kept so the optimizer can rebuild
/// the session with its own settings.
#[derive(Clone, Debug)]
enum GraphSource {
    File(PathBuf),
    Bytes(Bytes),
}

pub struct OrtGraph {
    source: GraphSource,
    inputs: Vec<(String, TensorDescriptor)>,
    outputs: Vec<(String, TensorDescriptor)>,
}

pub struct OrtNetwork {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

struct LoadedSession {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

/// Reads ONNX files and ORT-format byte streams into metadata-only graphs.
pub struct SessionParser {
    format: ModelFormat,
}

impl ModelParser<OrtGraph> for SessionParser {
    fn parse(&self, source: ModelSource<'_>) -> Result<OrtGraph> {
        let builder = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Disable)
            .context("failed to configure ORT session builder")?;

        let (session, source) = match source {
            ModelSource::File(path) => {
                let session = builder
                    .commit_from_file(path)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                (session, GraphSource::File(path.to_path_buf()))
            }
            ModelSource::Bytes(bytes) => {
                let session = builder
                    .commit_from_memory(&bytes)
                    .context("failed to deserialize model bytes")?;
                (session, GraphSource::Bytes(bytes))
            }
        };
        debug!(format = %self.format, "parsed ORT model");

        let inputs = session
            .inputs
            .iter()
            .map(|input| {
                Ok((
                    input.name.clone(),
                    descriptor_from_value_type(&input.input_type)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let outputs = session
            .outputs
            .iter()
            .map(|output| {
                Ok((
                    output.name.clone(),
                    descriptor_from_value_type(&output.output_type)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OrtGraph {
            source,
            inputs,
            outputs,
        })
    }

    fn input_binding(
        &self,
        graph: &OrtGraph,
        subgraph: Option<usize>,
        name: &str,
    ) -> Result<BindingInfo> {
        ensure!(
            subgraph.unwrap_or(0) == 0,
            "ORT models have a single graph, got sub-graph {subgraph:?}"
        );
        find_binding(&graph.inputs, name)
    }

    fn output_binding(
        &self,
        graph: &OrtGraph,
        subgraph: Option<usize>,
        name: &str,
    ) -> Result<BindingInfo> {
        ensure!(
            subgraph.unwrap_or(0) == 0,
            "ORT models have a single graph, got sub-graph {subgraph:?}"
        );
        find_binding(&graph.outputs, name)
    }
}

pub struct OrtBackend {
    exchange: SessionParser,
    serialized: SessionParser,
    networks: HashMap<NetworkId, LoadedSession>,
    next_id: u32,
}

impl Backend for OrtBackend {
    type Graph = OrtGraph;
    type Network = OrtNetwork;

    fn create(options: &RuntimeOptions) -> Result<Self> {
        for group in &options.backend_options {
            if let Some(file) = group.get_str("TuningFile") {
                info!(
                    backend = %group.backend,
                    file,
                    "onnxruntime keeps no tuning data, tuning file unused"
                );
            }
        }
        Ok(Self {
            exchange: SessionParser {
                format: ModelFormat::ExchangeFormat,
            },
            serialized: SessionParser {
                format: ModelFormat::SerializedDefault,
            },
            networks: HashMap::new(),
            next_id: 0,
        })
    }

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    /// onnxruntime emits its log records as `tracing` events, so they pass
    /// through the same `EnvFilter` the runtime installs for `severity`. No
    /// separate ORT log level is set here.
    fn configure_logging(&self, severity: LogSeverity) {
        debug!(?severity, "onnxruntime logging follows the tracing subscriber");
    }

    fn parser(&self, format: ModelFormat) -> Option<&dyn ModelParser<OrtGraph>> {
        match format {
            ModelFormat::ExchangeFormat => Some(&self.exchange),
            ModelFormat::SerializedDefault => Some(&self.serialized),
            ModelFormat::MobileGraph => None,
        }
    }

    fn device_spec(&self) -> DeviceSpec {
        let mut supported_backends = vec![BackendId::cpu_acc()];
        if cfg!(feature = "cuda") {
            supported_backends.push(BackendId::gpu_acc());
        }
        DeviceSpec { supported_backends }
    }

    fn optimize(
        &self,
        graph: OrtGraph,
        backends: &[BackendId],
        _device: &DeviceSpec,
        options: &OptimizerOptions,
    ) -> Result<OrtNetwork> {
        let compute = backends.first().context("no compute backend requested")?;
        let accel = options.model_option(compute);
        let fast_math = accel
            .and_then(|o| o.get_bool("FastMathEnabled"))
            .unwrap_or(false);
        let save_cache = accel
            .and_then(|o| o.get_bool("SaveCachedNetwork"))
            .unwrap_or(false);
        let cache_path = accel
            .and_then(|o| o.get_str("CachedNetworkFilePath"))
            .map(PathBuf::from);

        let builder = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to configure ORT session builder")?;
        let builder = configure_execution_provider(builder, compute)?;
        let builder = if fast_math {
            builder
                .with_config_entry(FAST_MATH_ENTRY, "1")
                .context("failed to enable fast math")?
        } else {
            builder
        };

        let session = match cache_path {
            Some(path) if !save_cache && is_populated(&path) => {
                debug!(path = %path.display(), "loading cached network");
                builder
                    .commit_from_file(&path)
                    .context("failed to load cached network")?
            }
            Some(path) if save_cache => {
                debug!(path = %path.display(), "saving optimized network");
                let builder = builder
                    .with_optimized_model_path(&*path.to_string_lossy())
                    .context("failed to set cached network path")?;
                commit_source(builder, &graph.source)?
            }
            _ => commit_source(builder, &graph.source)?,
        };

        Ok(OrtNetwork {
            session,
            input_names: graph.inputs.into_iter().map(|(name, _)| name).collect(),
            output_names: graph.outputs.into_iter().map(|(name, _)| name).collect(),
        })
    }

    fn load_network(&mut self, network: OrtNetwork) -> Result<NetworkId> {
        let id = NetworkId(self.next_id);
        self.next_id += 1;
        self.networks.insert(
            id,
            LoadedSession {
                session: Mutex::new(network.session),
                input_names: network.input_names,
                output_names: network.output_names,
            },
        );
        Ok(id)
    }

    fn enqueue_workload(
        &self,
        id: NetworkId,
        inputs: &[BoundInput<'_>],
        outputs: &mut [BoundOutput<'_>],
    ) -> Result<()> {
        let loaded = self
            .networks
            .get(&id)
            .with_context(|| format!("network {} is not loaded", id.0))?;

        let mut ort_inputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = binding_name(&loaded.input_names, input.id)?;
            let value = bytes_to_ort_value(input.desc, input.data)?;
            ort_inputs.push((name.clone(), SessionInputValue::from(value)));
        }

        let mut session = loaded.session.lock();
        let results = session.run(ort_inputs)?;
        for out in outputs.iter_mut() {
            let name = binding_name(&loaded.output_names, out.id)?;
            let (_, value) = results
                .iter()
                .find(|(n, _)| *n == name.as_str())
                .with_context(|| format!("session produced no output {name:?}"))?;
            copy_output(&value, out)?;
        }
        Ok(())
    }

    fn unload_network(&mut self, id: NetworkId) -> Result<()> {
        self.networks
            .remove(&id)
            .with_context(|| format!("network {} is not loaded", id.0))?;
        Ok(())
    }
}

fn configure_execution_provider(
    builder: SessionBuilder,
    compute: &BackendId,
) -> Result<SessionBuilder> {
    match compute.as_str() {
        BackendId::CPU_ACC => Ok(builder),
        BackendId::GPU_ACC => configure_cuda(builder, 0),
        other => bail!("onnxruntime backend has no execution provider for {other}"),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build();
        builder
            .with_execution_providers([ep])
            .context("failed to enable ORT CUDA execution provider")
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        bail!("GpuAcc requested but annport-backend-ort was built without the `cuda` feature")
    }
}

fn commit_source(builder: SessionBuilder, source: &GraphSource) -> Result<Session> {
    match source {
        GraphSource::File(path) => builder
            .commit_from_file(path)
            .with_context(|| format!("failed to optimize {}", path.display())),
        GraphSource::Bytes(bytes) => builder
            .commit_from_memory(bytes)
            .context("failed to optimize serialized model"),
    }
}

fn is_populated(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.len() > 0)
        .unwrap_or(false)
}

fn find_binding(entries: &[(String, TensorDescriptor)], name: &str) -> Result<BindingInfo> {
    let (index, (_, desc)) = entries
        .iter()
        .enumerate()
        .find(|(_, (n, _))| n == name)
        .with_context(|| {
            let known: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
            format!("no tensor named {name:?} (model has {known:?})")
        })?;
    Ok(BindingInfo::new(BindingId(index as i32), desc.clone()))
}

fn binding_name(names: &[String], id: BindingId) -> Result<&String> {
    usize::try_from(id.0)
        .ok()
        .and_then(|index| names.get(index))
        .with_context(|| format!("unknown binding id {}", id.0))
}

/// Dynamic dimensions are reported as 1.
fn descriptor_from_value_type(value_type: &ValueType) -> Result<TensorDescriptor> {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        bail!("unsupported non-tensor IO value type");
    };

    let dtype = ort_tensor_element_to_dtype(*ty)?;
    let dims = shape
        .iter()
        .map(|d| if *d < 0 { 1 } else { *d as usize })
        .collect::<Vec<_>>();

    Ok(TensorDescriptor::new(Shape::from_slice(&dims), dtype))
}

fn ort_tensor_element_to_dtype(ty: TensorElementType) -> Result<DType> {
    match ty {
        TensorElementType::Float32 => Ok(DType::F32),
        TensorElementType::Float16 => Ok(DType::F16),
        TensorElementType::Int64 => Ok(DType::I64),
        TensorElementType::Int32 => Ok(DType::I32),
        TensorElementType::Uint8 => Ok(DType::U8),
        TensorElementType::Int8 => Ok(DType::I8),
        _ => bail!("unsupported tensor element type: {ty}"),
    }
}

fn bytes_to_ort_value(desc: &TensorDescriptor, bytes: &[u8]) -> Result<DynValue> {
    let shape: Vec<usize> = desc.shape.dims().to_vec();
    let expected_bytes = desc.byte_len();
    ensure!(
        bytes.len() == expected_bytes,
        "input byte size mismatch: got {}, expected {}",
        bytes.len(),
        expected_bytes
    );

    let value = match desc.dtype {
        DType::F32 => {
            let data = bytes_to_f32(bytes)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::I64 => {
            let data = bytes_to_i64(bytes)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::I32 => {
            let data = bytes_to_i32(bytes)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::U8 => {
            let data = bytes.to_vec();
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::I8 => {
            let data: Vec<i8> = bytes.iter().map(|b| *b as i8).collect();
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::F16 => bail!("f16 inputs are not supported yet"),
    };

    Ok(value)
}

fn copy_output(value: &ort::value::ValueRef<'_>, out: &mut BoundOutput<'_>) -> Result<()> {
    let ValueType::Tensor { ty, .. } = value.dtype() else {
        bail!("non-tensor outputs are not supported");
    };

    match *ty {
        TensorElementType::Float32 => {
            let array = value.try_extract_array::<f32>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            write_bytes(out, as_bytes(slice))
        }
        TensorElementType::Int64 => {
            let array = value.try_extract_array::<i64>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            write_bytes(out, as_bytes(slice))
        }
        TensorElementType::Int32 => {
            let array = value.try_extract_array::<i32>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            write_bytes(out, as_bytes(slice))
        }
        TensorElementType::Uint8 => {
            let array = value.try_extract_array::<u8>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            write_bytes(out, slice)
        }
        TensorElementType::Int8 => {
            let array = value.try_extract_array::<i8>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            write_bytes(out, as_bytes(slice))
        }
        TensorElementType::Float16 => bail!("f16 outputs are not supported yet"),
        _ => bail!("unsupported output tensor element type: {ty}"),
    }
}

fn write_bytes(out: &mut BoundOutput<'_>, bytes: &[u8]) -> Result<()> {
    ensure!(
        out.data.len() == bytes.len(),
        "output buffer holds {} bytes, forward pass produced {}",
        out.data.len(),
        bytes.len()
    );
    out.data.copy_from_slice(bytes);
    Ok(())
}

#[allow(clippy::manual_is_multiple_of)]
fn bytes_to_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    ensure!(bytes.len() % 4 == 0, "f32 input has invalid byte length");
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[allow(clippy::manual_is_multiple_of)]
fn bytes_to_i64(bytes: &[u8]) -> Result<Vec<i64>> {
    ensure!(bytes.len() % 8 == 0, "i64 input has invalid byte length");
    Ok(bytes
        .chunks_exact(8)
        .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect())
}

#[allow(clippy::manual_is_multiple_of)]
fn bytes_to_i32(bytes: &[u8]) -> Result<Vec<i32>> {
    ensure!(bytes.len() % 4 == 0, "i32 input has invalid byte length");
    Ok(bytes
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn as_bytes<T: Copy>(slice: &[T]) -> &[u8] {
    let byte_len = std::mem::size_of_val(slice);
    let ptr = slice.as_ptr().cast::<u8>();
    unsafe { std::slice::from_raw_parts(ptr, byte_len) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_graphs_have_no_parser() -> Result<()> {
        let backend = OrtBackend::create(&RuntimeOptions::default())?;
        assert!(backend.parser(ModelFormat::MobileGraph).is_none());
        assert!(backend.parser(ModelFormat::ExchangeFormat).is_some());
        assert!(backend.parser(ModelFormat::SerializedDefault).is_some());
        Ok(())
    }

    #[test]
    fn cpu_is_always_supported() -> Result<()> {
        let backend = OrtBackend::create(&RuntimeOptions::default())?;
        assert!(backend.device_spec().supports(&BackendId::cpu_acc()));
        Ok(())
    }

    #[test]
    fn bindings_are_positional() -> Result<()> {
        let desc = TensorDescriptor::new(Shape::from_slice(&[1, 3]), DType::F32);
        let entries = vec![("a".to_string(), desc.clone()), ("b".to_string(), desc)];
        assert_eq!(find_binding(&entries, "b")?.id, BindingId(1));
        assert!(find_binding(&entries, "c").is_err());

        let names = vec!["a".to_string()];
        assert_eq!(binding_name(&names, BindingId(0))?, "a");
        assert!(binding_name(&names, BindingId(-1)).is_err());
        Ok(())
    }

    #[test]
    fn input_bytes_must_match_descriptor() {
        let desc = TensorDescriptor::new(Shape::from_slice(&[2]), DType::F32);
        assert!(bytes_to_ort_value(&desc, &[0u8; 4]).is_err());
    }

    #[test]
    fn le_decoding() -> Result<()> {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(bytes_to_f32(&bytes)?, vec![1.5, -2.0]);
        assert!(bytes_to_i64(&bytes[..4]).is_err());
        assert_eq!(as_bytes(&[1u16]), &[1u8, 0][..]);
        Ok(())
    }
}

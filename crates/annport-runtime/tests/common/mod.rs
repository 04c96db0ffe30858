#![allow(dead_code)]

//! In-process backend that reads a small text model description.
//!
//! ```text
//! # optional comment line (may carry a flatbuffer identifier at bytes 4..8)
//! input serving_default_input 1,224,224,3 f32
//! output StatefulPartitionedCall 1,512 f32
//! fail optimize
//! ```
//!
//! `fail` accepts `optimize`, `load`, `run` and `unload`. A tuning file whose
//! first line is `corrupt` makes backend creation fail.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, ensure, Context, Result};
use annport_core::{
    Backend, BackendId, BindingId, BindingInfo, BoundInput, BoundOutput, DType, DeviceSpec,
    LogSeverity, ModelFormat, ModelParser, ModelSource, NetworkId, OptimizerOptions,
    RuntimeOptions, Shape, TensorDescriptor,
};
use parking_lot::Mutex;

#[derive(Clone, Debug, Default)]
pub struct FakeGraph {
    pub parsed_by: Option<ModelFormat>,
    pub inputs: Vec<(String, TensorDescriptor)>,
    pub outputs: Vec<(String, TensorDescriptor)>,
    pub failures: Vec<String>,
}

impl FakeGraph {
    fn fails(&self, step: &str) -> bool {
        self.failures.iter().any(|f| f == step)
    }
}

#[derive(Debug)]
pub struct FakeNetwork {
    graph: FakeGraph,
    options: OptimizerOptions,
}

pub struct FakeParser {
    format: ModelFormat,
    calls: Mutex<Vec<ModelFormat>>,
}

impl FakeParser {
    fn new(format: ModelFormat) -> Self {
        Self {
            format,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ModelParser<FakeGraph> for FakeParser {
    fn parse(&self, source: ModelSource<'_>) -> Result<FakeGraph> {
        self.calls.lock().push(self.format);
        let text = match source {
            ModelSource::File(path) => std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?,
            ModelSource::Bytes(bytes) => {
                ensure!(
                    self.format == ModelFormat::SerializedDefault,
                    "only the deserializer reads byte streams"
                );
                String::from_utf8(bytes.to_vec()).context("model is not utf-8")?
            }
        };
        let mut graph = parse_description(&text)?;
        graph.parsed_by = Some(self.format);
        Ok(graph)
    }

    fn input_binding(
        &self,
        graph: &FakeGraph,
        subgraph: Option<usize>,
        name: &str,
    ) -> Result<BindingInfo> {
        self.check_subgraph(subgraph)?;
        lookup(&graph.inputs, name, 0)
    }

    fn output_binding(
        &self,
        graph: &FakeGraph,
        subgraph: Option<usize>,
        name: &str,
    ) -> Result<BindingInfo> {
        self.check_subgraph(subgraph)?;
        lookup(&graph.outputs, name, 100)
    }
}

impl FakeParser {
    fn check_subgraph(&self, subgraph: Option<usize>) -> Result<()> {
        match (self.format, subgraph) {
            (ModelFormat::ExchangeFormat, None) => Ok(()),
            (ModelFormat::ExchangeFormat, Some(s)) => bail!("unexpected subgraph {s}"),
            (_, Some(0)) => Ok(()),
            (format, other) => bail!("{format} lookup expects subgraph 0, got {other:?}"),
        }
    }
}

fn lookup(
    entries: &[(String, TensorDescriptor)],
    name: &str,
    id_base: i32,
) -> Result<BindingInfo> {
    let (index, (_, desc)) = entries
        .iter()
        .enumerate()
        .find(|(_, (n, _))| n == name)
        .ok_or_else(|| anyhow!("binding {name:?} not found"))?;
    Ok(BindingInfo::new(BindingId(id_base + index as i32), desc.clone()))
}

fn parse_description(text: &str) -> Result<FakeGraph> {
    let mut graph = FakeGraph::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["input", name, dims, dtype] => graph.inputs.push((name.to_string(), desc(dims, dtype)?)),
            ["output", name, dims, dtype] => {
                graph.outputs.push((name.to_string(), desc(dims, dtype)?))
            }
            ["fail", step] => graph.failures.push(step.to_string()),
            _ => bail!("corrupt model line: {line:?}"),
        }
    }
    ensure!(!graph.inputs.is_empty(), "model has no inputs");
    Ok(graph)
}

fn desc(dims: &str, dtype: &str) -> Result<TensorDescriptor> {
    let dims = dims
        .split(',')
        .map(|d| d.parse::<usize>().context("bad dimension"))
        .collect::<Result<Vec<_>>>()?;
    let dtype = match dtype {
        "f32" => DType::F32,
        "u8" => DType::U8,
        other => bail!("unsupported dtype {other}"),
    };
    // Inputs are deliberately reported with `is_input == false`.
    Ok(TensorDescriptor::new(Shape::from_slice(&dims), dtype).with_quantization(1.0, 0))
}

pub struct FakeBackend {
    parsers: Vec<FakeParser>,
    networks: HashMap<NetworkId, FakeNetwork>,
    next_id: u32,
    tuning_file: Option<PathBuf>,
    runs: Mutex<usize>,
    pub severity: Mutex<Option<LogSeverity>>,
    pub runtime_options: RuntimeOptions,
}

impl FakeBackend {
    /// Formats whose parser has run, in call order.
    pub fn parse_calls(&self) -> Vec<ModelFormat> {
        let mut calls = Vec::new();
        for parser in &self.parsers {
            calls.extend(parser.calls.lock().iter().copied());
        }
        calls
    }

    pub fn loaded_networks(&self) -> usize {
        self.networks.len()
    }

    pub fn runs(&self) -> usize {
        *self.runs.lock()
    }

    pub fn last_options(&self, id: NetworkId) -> Option<&OptimizerOptions> {
        self.networks.get(&id).map(|n| &n.options)
    }
}

impl Backend for FakeBackend {
    type Graph = FakeGraph;
    type Network = FakeNetwork;

    fn create(options: &RuntimeOptions) -> Result<Self> {
        let tuning_file = options.tuning_file(&BackendId::gpu_acc());
        if let Some(path) = &tuning_file {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read tuning file {}", path.display()))?;
            if data.lines().next() == Some("corrupt") {
                bail!("tuning data in {} is corrupt", path.display());
            }
        }
        Ok(Self {
            parsers: ModelFormat::ALL.into_iter().map(FakeParser::new).collect(),
            networks: HashMap::new(),
            next_id: 0,
            tuning_file,
            runs: Mutex::new(0),
            severity: Mutex::new(None),
            runtime_options: options.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }

    fn configure_logging(&self, severity: LogSeverity) {
        *self.severity.lock() = Some(severity);
    }

    fn parser(&self, format: ModelFormat) -> Option<&dyn ModelParser<FakeGraph>> {
        self.parsers
            .iter()
            .find(|p| p.format == format)
            .map(|p| p as &dyn ModelParser<FakeGraph>)
    }

    fn device_spec(&self) -> DeviceSpec {
        DeviceSpec {
            supported_backends: vec![BackendId::gpu_acc(), BackendId::cpu_acc()],
        }
    }

    fn optimize(
        &self,
        graph: FakeGraph,
        backends: &[BackendId],
        _device: &DeviceSpec,
        options: &OptimizerOptions,
    ) -> Result<FakeNetwork> {
        ensure!(backends.len() == 1, "expected one preferred backend");
        if graph.fails("optimize") {
            bail!("layer Conv2d is not supported on {}", backends[0]);
        }
        Ok(FakeNetwork {
            graph,
            options: options.clone(),
        })
    }

    fn load_network(&mut self, network: FakeNetwork) -> Result<NetworkId> {
        if network.graph.fails("load") {
            bail!("out of device memory");
        }
        let id = NetworkId(self.next_id);
        self.next_id += 1;
        self.networks.insert(id, network);
        Ok(id)
    }

    fn enqueue_workload(
        &self,
        id: NetworkId,
        inputs: &[BoundInput<'_>],
        outputs: &mut [BoundOutput<'_>],
    ) -> Result<()> {
        let network = self.networks.get(&id).context("network not loaded")?;
        if network.graph.fails("run") {
            bail!("device lost");
        }
        ensure!(inputs.len() == 1 && outputs.len() == 1, "one input and one output");
        ensure!(inputs[0].desc.is_input, "input descriptor not marked as input");
        let source = inputs[0].data;
        let out = &mut outputs[0];
        // Output element i is the first input element plus i.
        let base = source
            .get(0..4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0.0);
        for (i, chunk) in out.data.chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&(base + i as f32).to_le_bytes());
        }
        *self.runs.lock() += 1;
        Ok(())
    }

    fn unload_network(&mut self, id: NetworkId) -> Result<()> {
        let network = self.networks.remove(&id).context("network not loaded")?;
        if network.graph.fails("unload") {
            bail!("driver refused to release network");
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(path) = &self.tuning_file {
            let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
            writeln!(file, "tuned")?;
        }
        Ok(())
    }
}

pub fn write_model(dir: &Path, file_name: &str, contents: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, contents).expect("write model file");
    path
}

pub const MOBILE_MODEL: &str = "\
input serving_default_input 1,224,224,3 f32
output StatefulPartitionedCall 1,512 f32
";

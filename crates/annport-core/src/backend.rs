use anyhow::Result;

use crate::{
    BackendId, BindingId, BindingInfo, LogSeverity, ModelFormat, ModelSource, NetworkId,
    OptimizerOptions, RuntimeOptions, TensorDescriptor,
};

/// What the accelerator reports it can run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSpec {
    pub supported_backends: Vec<BackendId>,
}

impl DeviceSpec {
    pub fn supports(&self, backend: &BackendId) -> bool {
        self.supported_backends.contains(backend)
    }
}

/// Caller memory bound to a graph input for one forward pass.
#[derive(Debug)]
pub struct BoundInput<'a> {
    pub id: BindingId,
    pub desc: &'a TensorDescriptor,
    pub data: &'a [u8],
}

/// Caller memory the backend writes one graph output into.
#[derive(Debug)]
pub struct BoundOutput<'a> {
    pub id: BindingId,
    pub desc: &'a TensorDescriptor,
    pub data: &'a mut [u8],
}

/// Turns one model encoding into a backend graph and answers binding lookups
/// against it.
pub trait ModelParser<G> {
    fn parse(&self, source: ModelSource<'_>) -> Result<G>;

    /// `subgraph` is `None` for formats without sub-graphs.
    fn input_binding(&self, graph: &G, subgraph: Option<usize>, name: &str)
        -> Result<BindingInfo>;

    fn output_binding(
        &self,
        graph: &G,
        subgraph: Option<usize>,
        name: &str,
    ) -> Result<BindingInfo>;
}

/// The accelerator: parsers, graph optimizer and execution context in one.
pub trait Backend: Send + 'static {
    type Graph;
    type Network;

    fn create(options: &RuntimeOptions) -> Result<Self>
    where
        Self: Sized;

    fn name(&self) -> &'static str;

    fn configure_logging(&self, _severity: LogSeverity) {}

    /// `None` when this backend cannot read `format` at all.
    fn parser(&self, format: ModelFormat) -> Option<&dyn ModelParser<Self::Graph>>;

    fn device_spec(&self) -> DeviceSpec;

    fn optimize(
        &self,
        graph: Self::Graph,
        backends: &[BackendId],
        device: &DeviceSpec,
        options: &OptimizerOptions,
    ) -> Result<Self::Network>;

    fn load_network(&mut self, network: Self::Network) -> Result<NetworkId>;

    /// Runs one forward pass and returns once `outputs` hold the results.
    fn enqueue_workload(
        &self,
        id: NetworkId,
        inputs: &[BoundInput<'_>],
        outputs: &mut [BoundOutput<'_>],
    ) -> Result<()>;

    fn unload_network(&mut self, id: NetworkId) -> Result<()>;

    /// Called once at teardown, after every network is unloaded.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

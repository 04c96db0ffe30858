//! Loads models onto an accelerator backend and runs forward passes against
//! them.
//!
//! A [`RuntimeContext`] owns one backend. Each [`RuntimeContext::load`] runs
//! the format dispatcher, the optimizer and the backend load, and registers
//! the result under a [`annport_core::NetworkHandle`]. Later calls name the
//! network by that handle.
//!
//! ```no_run
//! # use annport_core::Backend;
//! use annport_runtime::{LoadOptions, RuntimeConfig, RuntimeContext};
//!
//! # fn run<B: Backend>() -> annport_core::Result<()> {
//! let mut ctx = RuntimeContext::<B>::init(RuntimeConfig::default())?;
//! let options = LoadOptions::new("serving_default_input", "StatefulPartitionedCall");
//! let net = ctx.load("model.tflite", &options)?;
//! let packed = ctx.shape(net, true)?;
//! # let _ = packed;
//! ctx.unload(net)?;
//! ctx.destroy();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod loader;
pub mod logging;
pub mod optimizer;
pub mod registry;

pub use config::{LoadOptions, RuntimeConfig};
pub use context::{runtime_options, RuntimeContext};
pub use loader::{load_model, resolve_format, ParsedModel};
pub use optimizer::optimizer_options;
pub use registry::{LoadedNetwork, NetworkRegistry};

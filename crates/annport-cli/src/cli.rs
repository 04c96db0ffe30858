use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "annport", version, about = "Load, inspect and benchmark accelerator models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the input and output shapes of a model
    Inspect {
        #[command(flatten)]
        runtime: RuntimeArgs,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Time model loading, warm-up and repeated forward passes
    Bench {
        #[command(flatten)]
        runtime: RuntimeArgs,

        #[command(flatten)]
        model: ModelArgs,

        /// Number of timed forward passes
        #[arg(long, default_value_t = 128)]
        iterations: u32,
    },
}

#[derive(Args, Debug)]
pub struct RuntimeArgs {
    /// Log level: 0 trace, 1 debug, 2 info, 3 warning, 4 error, 5 fatal
    #[arg(long, default_value_t = 3)]
    pub log_level: i32,

    /// Tuning level: 0 reads the tuning file only, 1-3 tune with increasing effort
    #[arg(long)]
    pub tuning_level: Option<u32>,

    /// Existing (possibly empty) file holding tuning data
    #[arg(long)]
    pub tuning_file: Option<PathBuf>,

    /// Compute backend (CpuAcc or GpuAcc)
    #[arg(long, default_value = "CpuAcc")]
    pub compute: String,
}

#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Path to the model file
    #[arg(long)]
    pub model: PathBuf,

    /// Name of the graph input
    #[arg(long, default_value = "input_tensor")]
    pub input_name: String,

    /// Name of the graph output
    #[arg(long, default_value = "output_tensor")]
    pub output_name: String,

    /// Disable fast math on the accelerator
    #[arg(long)]
    pub no_fast_math: bool,

    /// Existing (possibly empty) file for the optimized network cache
    #[arg(long)]
    pub cached_network: Option<PathBuf>,

    /// Write the optimized network to --cached-network instead of reading it
    #[arg(long, requires = "cached_network")]
    pub save_cached_network: bool,

    /// Model format (mobile-graph, exchange-format, serialized); detected when omitted
    #[arg(long)]
    pub format: Option<String>,
}

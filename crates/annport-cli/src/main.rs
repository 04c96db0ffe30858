mod cli;

use std::time::Instant;

use anyhow::{bail, Context, Result};
use annport_backend_ort::OrtBackend;
use annport_core::{BackendId, CompactShape, LogSeverity, ModelFormat, NetworkHandle};
use annport_runtime::{LoadOptions, RuntimeConfig, RuntimeContext};
use clap::Parser;
use cli::{Cli, Command, ModelArgs, RuntimeArgs};
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { runtime, model } => inspect(&runtime, &model),
        Command::Bench {
            runtime,
            model,
            iterations,
        } => bench(&runtime, &model, iterations),
    }
}

fn inspect(runtime: &RuntimeArgs, model: &ModelArgs) -> Result<()> {
    let mut ctx = RuntimeContext::<OrtBackend>::init(runtime_config(runtime)?)?;
    let net = ctx.load(&model.model, &load_options(model)?)?;

    for (label, is_input) in [("input", true), ("output", false)] {
        let binding = ctx.binding(net, is_input)?;
        let packed = CompactShape(ctx.shape(net, is_input)?);
        println!(
            "{label:<6} {:?} {:?} (packed {:#018x}, binding {})",
            binding.desc.dtype,
            ctx.dims(net, is_input)?,
            packed.raw(),
            binding.id.0
        );
    }

    ctx.unload(net)?;
    ctx.destroy();
    Ok(())
}

fn bench(runtime: &RuntimeArgs, model: &ModelArgs, iterations: u32) -> Result<()> {
    let start = Instant::now();
    let mut ctx = RuntimeContext::<OrtBackend>::init(runtime_config(runtime)?)?;
    let net = ctx.load(&model.model, &load_options(model)?)?;
    println!("loading took {:.3} ms", start.elapsed().as_secs_f64() * 1e3);

    let (input, mut output) = buffers(&ctx, net)?;

    let start = Instant::now();
    ctx.embed(net, &input, &mut output)
        .context("warm-up forward pass failed")?;
    println!("warmup took {:.3} ms", start.elapsed().as_secs_f64() * 1e3);

    if iterations > 0 {
        let start = Instant::now();
        for _ in 0..iterations {
            ctx.embed(net, &input, &mut output)?;
        }
        let per_sample = start.elapsed().as_secs_f64() * 1e3 / f64::from(iterations);
        println!("embedding took {per_sample:.3} ms");
        info!(
            %net,
            compute = %ctx.config().compute,
            iterations,
            per_sample_ms = per_sample,
            "benchmark finished"
        );
    }

    ctx.unload(net)?;
    ctx.destroy();
    Ok(())
}

fn buffers(ctx: &RuntimeContext<OrtBackend>, net: NetworkHandle) -> Result<(Vec<u8>, Vec<u8>)> {
    let input = vec![0u8; ctx.binding(net, true)?.desc.byte_len()];
    let output = vec![0u8; ctx.binding(net, false)?.desc.byte_len()];
    Ok((input, output))
}

fn runtime_config(args: &RuntimeArgs) -> Result<RuntimeConfig> {
    let severity = LogSeverity::from_level(args.log_level).with_context(|| {
        format!(
            "log level must be 0 (trace) to 5 (fatal), got {}",
            args.log_level
        )
    })?;
    let mut config = RuntimeConfig::default()
        .with_log_severity(severity)
        .with_compute(BackendId::new(args.compute.clone()))
        .with_tuning_file(args.tuning_file.clone());
    if let Some(level) = args.tuning_level {
        config = config.with_tuning_level(level);
    }
    Ok(config)
}

fn load_options(args: &ModelArgs) -> Result<LoadOptions> {
    let mut options = LoadOptions::new(args.input_name.clone(), args.output_name.clone())
        .with_fast_math(!args.no_fast_math);
    if let Some(path) = &args.cached_network {
        options = options.with_cached_network(path, args.save_cached_network);
    }
    if let Some(raw) = &args.format {
        options = options.with_format(parse_format(raw)?);
    }
    Ok(options)
}

fn parse_format(raw: &str) -> Result<ModelFormat> {
    match raw {
        "mobile-graph" | "tflite" => Ok(ModelFormat::MobileGraph),
        "exchange-format" | "onnx" => Ok(ModelFormat::ExchangeFormat),
        "serialized" | "armnn" | "ort" => Ok(ModelFormat::SerializedDefault),
        other => {
            bail!("unsupported format: {other} (expected mobile-graph, exchange-format or serialized)")
        }
    }
}

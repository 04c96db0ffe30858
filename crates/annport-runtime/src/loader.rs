use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context};
use annport_core::{AnnError, Backend, BindingInfo, ModelFormat, ModelSource, Result};
use bytes::Bytes;
use tracing::debug;

/// A parsed graph with the two bindings the caller asked for.
pub struct ParsedModel<G> {
    pub format: ModelFormat,
    pub graph: G,
    pub input: BindingInfo,
    pub output: BindingInfo,
}

/// Explicit tag, then file suffix, then header sniffing, then the serialized
/// default.
pub fn resolve_format(path: &Path, explicit: Option<ModelFormat>) -> ModelFormat {
    if let Some(format) = explicit {
        return format;
    }
    if let Some(format) = ModelFormat::from_extension(path) {
        return format;
    }
    read_header(path)
        .and_then(|header| ModelFormat::sniff(&header))
        .unwrap_or(ModelFormat::SerializedDefault)
}

fn read_header(path: &Path) -> Option<Vec<u8>> {
    let mut header = Vec::with_capacity(8);
    File::open(path)
        .ok()?
        .take(8)
        .read_to_end(&mut header)
        .ok()?;
    Some(header)
}

/// Parses `path` with the backend's parser for its format and looks up the
/// named input and output bindings.
///
/// The input descriptor is rebuilt with `is_input` set regardless of what the
/// parser reported.
pub fn load_model<B: Backend>(
    backend: &B,
    path: &Path,
    input_name: &str,
    output_name: &str,
    explicit: Option<ModelFormat>,
) -> Result<ParsedModel<B::Graph>> {
    let format = resolve_format(path, explicit);
    let parser = backend.parser(format).ok_or_else(|| {
        AnnError::model_load(
            path,
            anyhow!("{} backend cannot read {format} models", backend.name()),
        )
    })?;
    debug!(path = %path.display(), %format, backend = backend.name(), "parsing model");

    let source = match format {
        ModelFormat::MobileGraph | ModelFormat::ExchangeFormat => ModelSource::File(path),
        ModelFormat::SerializedDefault => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))
                .map_err(|e| AnnError::model_load(path, e))?;
            ModelSource::Bytes(Bytes::from(bytes))
        }
    };

    let graph = parser
        .parse(source)
        .with_context(|| format!("{format} parser rejected the file"))
        .map_err(|e| AnnError::model_load(path, e))?;

    let subgraph = format.binding_subgraph();
    let input = parser
        .input_binding(&graph, subgraph, input_name)
        .with_context(|| format!("no input binding named {input_name:?}"))
        .map_err(|e| AnnError::model_load(path, e))?;
    let output = parser
        .output_binding(&graph, subgraph, output_name)
        .with_context(|| format!("no output binding named {output_name:?}"))
        .map_err(|e| AnnError::model_load(path, e))?;

    let input = BindingInfo::new(input.id, input.desc.as_input());

    Ok(ParsedModel {
        format,
        graph,
        input,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_tag_wins() {
        let format = resolve_format(Path::new("model.onnx"), Some(ModelFormat::MobileGraph));
        assert_eq!(format, ModelFormat::MobileGraph);
    }

    #[test]
    fn suffix_before_content() {
        let format = resolve_format(Path::new("/nonexistent/model.onnx"), None);
        assert_eq!(format, ModelFormat::ExchangeFormat);
    }

    #[test]
    fn sniffs_unknown_suffix() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("model.bin");
        File::create(&path)?.write_all(b"\x1c\0\0\0TFL3\0\0\0\0")?;
        assert_eq!(resolve_format(&path, None), ModelFormat::MobileGraph);
        Ok(())
    }

    #[test]
    fn falls_back_to_serialized() {
        let format = resolve_format(Path::new("/nonexistent/model"), None);
        assert_eq!(format, ModelFormat::SerializedDefault);
    }
}

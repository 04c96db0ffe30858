use std::fmt;
use std::path::Path;

use bytes::Bytes;

/// On-disk model encodings the dispatcher knows how to route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    /// Flatbuffer mobile graph (`.tflite`).
    MobileGraph,
    /// Protobuf interchange graph (`.onnx`).
    ExchangeFormat,
    /// Backend-native pre-serialized network, read as a byte stream.
    SerializedDefault,
}

impl ModelFormat {
    pub const ALL: [ModelFormat; 3] = [
        ModelFormat::MobileGraph,
        ModelFormat::ExchangeFormat,
        ModelFormat::SerializedDefault,
    ];

    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("tflite") {
            Some(ModelFormat::MobileGraph)
        } else if ext.eq_ignore_ascii_case("onnx") {
            Some(ModelFormat::ExchangeFormat)
        } else if ext.eq_ignore_ascii_case("armnn") || ext.eq_ignore_ascii_case("ort") {
            Some(ModelFormat::SerializedDefault)
        } else {
            None
        }
    }

    /// Recognises flatbuffer file identifiers (bytes 4..8 of the header).
    /// Protobuf has no magic, so the interchange format is never sniffed.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        match header.get(4..8)? {
            b"TFL3" => Some(ModelFormat::MobileGraph),
            b"ARMN" | b"ORTM" => Some(ModelFormat::SerializedDefault),
            _ => None,
        }
    }

    /// Sub-graph the bindings are looked up in, for formats that have them.
    pub fn binding_subgraph(self) -> Option<usize> {
        match self {
            ModelFormat::MobileGraph | ModelFormat::SerializedDefault => Some(0),
            ModelFormat::ExchangeFormat => None,
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFormat::MobileGraph => "mobile-graph",
            ModelFormat::ExchangeFormat => "exchange-format",
            ModelFormat::SerializedDefault => "serialized",
        };
        f.write_str(name)
    }
}

/// What a parser is handed: a file it opens itself, or an already-read stream.
#[derive(Clone, Debug)]
pub enum ModelSource<'a> {
    File(&'a Path),
    Bytes(Bytes),
}

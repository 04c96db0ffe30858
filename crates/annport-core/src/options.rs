use std::fmt;
use std::path::PathBuf;

/// Names a compute backend, e.g. `GpuAcc` or `CpuAcc`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackendId(pub String);

impl BackendId {
    pub const GPU_ACC: &'static str = "GpuAcc";
    pub const CPU_ACC: &'static str = "CpuAcc";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn gpu_acc() -> Self {
        Self::new(Self::GPU_ACC)
    }

    pub fn cpu_acc() -> Self {
        Self::new(Self::CPU_ACC)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BackendOption {
    pub name: String,
    pub value: OptionValue,
}

/// A named group of key/value options addressed to one backend (or to one
/// optimizer feature, which the options protocol treats the same way).
#[derive(Clone, Debug, PartialEq)]
pub struct BackendOptions {
    pub backend: BackendId,
    pub options: Vec<BackendOption>,
}

impl BackendOptions {
    pub fn new(backend: BackendId) -> Self {
        Self {
            backend,
            options: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
        self.add(name, value);
        self
    }

    pub fn add(&mut self, name: &str, value: impl Into<OptionValue>) {
        self.options.push(BackendOption {
            name: name.to_string(),
            value: value.into(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.options
            .iter()
            .find(|opt| opt.name == name)
            .map(|opt| &opt.value)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            OptionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            OptionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            OptionValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShapeInferenceMethod {
    /// Check declared shapes for consistency, never fill unknown ones in.
    #[default]
    ValidateOnly,
    InferAndValidate,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptimizerOptions {
    pub reduce_fp32_to_fp16: bool,
    pub shape_inference: ShapeInferenceMethod,
    pub allow_expanded_dims: bool,
    pub model_options: Vec<BackendOptions>,
}

impl OptimizerOptions {
    pub fn add_model_option(&mut self, options: BackendOptions) {
        self.model_options.push(options);
    }

    pub fn model_option(&self, backend: &BackendId) -> Option<&BackendOptions> {
        self.model_options.iter().find(|o| &o.backend == backend)
    }
}

/// Options handed to a backend when the runtime context creates it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuntimeOptions {
    pub backend_options: Vec<BackendOptions>,
}

impl RuntimeOptions {
    pub fn for_backend(&self, backend: &BackendId) -> Option<&BackendOptions> {
        self.backend_options.iter().find(|o| &o.backend == backend)
    }

    pub fn tuning_file(&self, backend: &BackendId) -> Option<PathBuf> {
        self.for_backend(backend)?
            .get_str("TuningFile")
            .map(PathBuf::from)
    }
}

/// Log verbosity, numbered 0 (trace) through 5 (fatal).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    Trace = 0,
    Debug = 1,
    Info = 2,
    #[default]
    Warning = 3,
    Error = 4,
    Fatal = 5,
}

impl LogSeverity {
    pub fn from_level(level: i32) -> Option<Self> {
        Some(match level {
            0 => LogSeverity::Trace,
            1 => LogSeverity::Debug,
            2 => LogSeverity::Info,
            3 => LogSeverity::Warning,
            4 => LogSeverity::Error,
            5 => LogSeverity::Fatal,
            _ => return None,
        })
    }

    pub fn level(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookup() {
        let opts = BackendOptions::new(BackendId::gpu_acc())
            .with("FastMathEnabled", true)
            .with("TuningLevel", 2i64)
            .with("CachedNetworkFilePath", "cached.network");
        assert_eq!(opts.get_bool("FastMathEnabled"), Some(true));
        assert_eq!(opts.get_int("TuningLevel"), Some(2));
        assert_eq!(opts.get_str("CachedNetworkFilePath"), Some("cached.network"));
        assert_eq!(opts.get_bool("TuningLevel"), None);
        assert_eq!(opts.get("Missing"), None);
    }

    #[test]
    fn severity_numbering() {
        assert_eq!(LogSeverity::from_level(0), Some(LogSeverity::Trace));
        assert_eq!(LogSeverity::from_level(5), Some(LogSeverity::Fatal));
        assert_eq!(LogSeverity::from_level(6), None);
        assert_eq!(LogSeverity::from_level(-1), None);
        assert_eq!(LogSeverity::Warning.level(), 3);
    }
}

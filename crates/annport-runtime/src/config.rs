use std::path::{Path, PathBuf};

use annport_core::{AnnError, BackendId, LogSeverity, ModelFormat, Result};

pub const MAX_TUNING_LEVEL: u32 = 3;

/// Settings fixed for the lifetime of a runtime context.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    pub log_severity: LogSeverity,
    /// 0 only reads existing tuning data from `tuning_file`; 1-3 tune with
    /// increasing effort.
    pub tuning_level: u32,
    pub tuning_file: Option<PathBuf>,
    pub compute: BackendId,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_severity: LogSeverity::Warning,
            tuning_level: 1,
            tuning_file: None,
            compute: BackendId::gpu_acc(),
        }
    }
}

impl RuntimeConfig {
    /// Exhaustive tuning when the results can be persisted, light tuning
    /// otherwise.
    pub fn with_tuning_file(mut self, tuning_file: Option<PathBuf>) -> Self {
        self.tuning_level = if tuning_file.is_some() { 3 } else { 1 };
        self.tuning_file = tuning_file;
        self
    }

    pub fn with_tuning_level(mut self, level: u32) -> Self {
        self.tuning_level = level;
        self
    }

    pub fn with_log_severity(mut self, severity: LogSeverity) -> Self {
        self.log_severity = severity;
        self
    }

    pub fn with_compute(mut self, compute: BackendId) -> Self {
        self.compute = compute;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(file) = &self.tuning_file {
            require_existing(file, "tuning_file")?;
        }
        if self.tuning_level > MAX_TUNING_LEVEL {
            return Err(AnnError::InvalidConfig(format!(
                "tuning_level must be 0 (load from tuning_file), 1, 2 or 3, got {}",
                self.tuning_level
            )));
        }
        if self.tuning_level == 0 && self.tuning_file.is_none() {
            return Err(AnnError::InvalidConfig(
                "tuning_level 0 reads existing tuning information and requires a tuning_file"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-model options for [`crate::RuntimeContext::load`].
#[derive(Clone, Debug, PartialEq)]
pub struct LoadOptions {
    pub input_name: String,
    pub output_name: String,
    pub fast_math: bool,
    pub save_cached_network: bool,
    pub cached_network_path: Option<PathBuf>,
    /// Skips suffix and content detection when set.
    pub format: Option<ModelFormat>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            input_name: "input_tensor".to_string(),
            output_name: "output_tensor".to_string(),
            fast_math: true,
            save_cached_network: false,
            cached_network_path: None,
            format: None,
        }
    }
}

impl LoadOptions {
    pub fn new(input_name: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            input_name: input_name.into(),
            output_name: output_name.into(),
            ..Self::default()
        }
    }

    pub fn with_fast_math(mut self, fast_math: bool) -> Self {
        self.fast_math = fast_math;
        self
    }

    pub fn with_cached_network(mut self, path: impl Into<PathBuf>, save: bool) -> Self {
        self.cached_network_path = Some(path.into());
        self.save_cached_network = save;
        self
    }

    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.save_cached_network && self.cached_network_path.is_none() {
            return Err(AnnError::InvalidConfig(
                "save_cached_network is set but no cached_network_path was given".to_string(),
            ));
        }
        if let Some(path) = &self.cached_network_path {
            require_existing(path, "cached_network_path")?;
        }
        Ok(())
    }
}

fn require_existing(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(AnnError::InvalidConfig(format!(
            "{what} must point to an existing (possibly empty) file: {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annport_core::ErrorKind;

    #[test]
    fn tuning_file_picks_level() {
        let cfg = RuntimeConfig::default().with_tuning_file(Some("gpu.tuning".into()));
        assert_eq!(cfg.tuning_level, 3);
        let cfg = RuntimeConfig::default().with_tuning_file(None);
        assert_eq!(cfg.tuning_level, 1);
    }

    #[test]
    fn level_out_of_range() {
        let err = RuntimeConfig::default()
            .with_tuning_level(4)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn level_zero_needs_file() {
        let err = RuntimeConfig::default()
            .with_tuning_level(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn saving_cache_needs_path() {
        let opts = LoadOptions {
            save_cached_network: true,
            ..LoadOptions::default()
        };
        assert_eq!(opts.validate().unwrap_err().kind(), ErrorKind::InvalidConfig);
        assert!(LoadOptions::default().validate().is_ok());
    }

    #[test]
    fn defaults_match_wrapper() {
        let opts = LoadOptions::default();
        assert_eq!(opts.input_name, "input_tensor");
        assert_eq!(opts.output_name, "output_tensor");
        assert!(opts.fast_math);
        assert!(!opts.save_cached_network);
    }
}

//! Runtime configuration (`spec.md` §6, ambient stack).
//!
//! Builder-style, no TOML: configuration is read from environment
//! variables only, grounded on the teacher's `CompilerConfig`
//! (`examples/navicore-cem3/crates/compiler/src/config.rs`), which is also
//! a plain builder struct rather than a deserialized file format.
//!
//! Recognized variables (`spec.md` §6):
//! - `SEQ_MODULE_PATH` — colon-separated search path for user modules
//! - `SEQ_NATIVE_LIB_PATH` — search path for native library extensions
//! - `SEQ_REPORT` — `"human"` (default) or `"json"`, at-exit report format
//! - `SEQ_WATCHDOG_SECS` — stuck-safepoint watchdog interval; `0` disables it

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub module_path: Vec<PathBuf>,
    pub native_lib_path: Vec<PathBuf>,
    pub report_format: ReportFormat,
    pub watchdog_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            module_path: Vec::new(),
            native_lib_path: Vec::new(),
            report_format: ReportFormat::Human,
            watchdog_secs: 30,
        }
    }
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Build from the process environment (`spec.md` §6).
    pub fn from_env() -> Self {
        let mut builder = RuntimeConfigBuilder::default();
        if let Ok(path) = env::var("SEQ_MODULE_PATH") {
            builder = builder.module_path(split_path(&path));
        }
        if let Ok(path) = env::var("SEQ_NATIVE_LIB_PATH") {
            builder = builder.native_lib_path(split_path(&path));
        }
        if let Ok(format) = env::var("SEQ_REPORT") {
            builder = builder.report_format(match format.as_str() {
                "json" => ReportFormat::Json,
                _ => ReportFormat::Human,
            });
        }
        if let Ok(secs) = env::var("SEQ_WATCHDOG_SECS") {
            if let Ok(n) = secs.parse() {
                builder = builder.watchdog_secs(n);
            }
        }
        builder.build()
    }
}

fn split_path(raw: &str) -> Vec<PathBuf> {
    raw.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect()
}

#[derive(Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    pub fn module_path(mut self, paths: Vec<PathBuf>) -> Self {
        self.config.module_path = paths;
        self
    }

    pub fn native_lib_path(mut self, paths: Vec<PathBuf>) -> Self {
        self.config.native_lib_path = paths;
        self
    }

    pub fn report_format(mut self, format: ReportFormat) -> Self {
        self.config.report_format = format;
        self
    }

    pub fn watchdog_secs(mut self, secs: u64) -> Self {
        self.config.watchdog_secs = secs;
        self
    }

    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

/// Compile-time options for `seqc`'s resolver/specializer/codegen pipeline.
/// Lives here (not in `seqc`) so both crates agree on one configuration
/// convention.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub specialize_opcodes: bool,
    pub hotspot_threshold: u32,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions { specialize_opcodes: true, hotspot_threshold: 1000 }
    }
}

impl CompilerOptions {
    pub fn builder() -> CompilerOptionsBuilder {
        CompilerOptionsBuilder::default()
    }
}

#[derive(Default)]
pub struct CompilerOptionsBuilder {
    options: CompilerOptions,
}

impl CompilerOptionsBuilder {
    pub fn specialize_opcodes(mut self, on: bool) -> Self {
        self.options.specialize_opcodes = on;
        self
    }

    pub fn hotspot_threshold(mut self, n: u32) -> Self {
        self.options.hotspot_threshold = n;
        self
    }

    pub fn build(self) -> CompilerOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_default_impl() {
        let built = RuntimeConfig::builder().build();
        let default = RuntimeConfig::default();
        assert_eq!(built.report_format, default.report_format);
        assert_eq!(built.watchdog_secs, default.watchdog_secs);
    }

    #[test]
    fn split_path_ignores_empty_segments() {
        assert_eq!(split_path("a:b::c"), vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]);
    }
}

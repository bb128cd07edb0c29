// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML runtime configuration loader.
//!
//! # Example YAML
//!
//! ```yaml
//! # cdata.yaml
//! callbacks:
//!   error_policy: REPORT   # or ABORT
//!   trace: false
//! ```

use super::{CallbackErrorPolicy, RuntimeConfig};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// YAML configuration loader.
pub struct YamlLoader;

/// Root YAML document structure.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfigDocument {
    /// Callback trampoline settings.
    pub callbacks: YamlCallbacks,
}

/// `callbacks:` section.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct YamlCallbacks {
    /// REPORT or ABORT
    pub error_policy: Option<String>,
    /// Trace every invocation at debug level.
    pub trace: Option<bool>,
}

impl YamlLoader {
    /// Load a configuration file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::load_str(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn load_str(content: &str) -> Result<RuntimeConfig> {
        let doc: YamlConfigDocument =
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        Self::convert(&doc)
    }

    fn convert(doc: &YamlConfigDocument) -> Result<RuntimeConfig> {
        let mut config = RuntimeConfig::default();
        if let Some(policy) = &doc.callbacks.error_policy {
            config.callback_error_policy = parse_policy(policy)?;
        }
        if let Some(trace) = doc.callbacks.trace {
            config.trace_callbacks = trace;
        }
        Ok(config)
    }
}

fn parse_policy(s: &str) -> Result<CallbackErrorPolicy> {
    match s.to_uppercase().as_str() {
        "REPORT" => Ok(CallbackErrorPolicy::Report),
        "ABORT" => Ok(CallbackErrorPolicy::Abort),
        other => Err(Error::Config(format!(
            "unknown callback error policy '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_str() {
        let cfg = YamlLoader::load_str(
            r#"
callbacks:
  error_policy: abort
  trace: true
"#,
        )
        .expect("parse");
        assert_eq!(cfg.callback_error_policy, CallbackErrorPolicy::Abort);
        assert!(cfg.trace_callbacks);
    }

    #[test]
    fn test_empty_document_is_default() {
        let cfg = YamlLoader::load_str("{}").expect("parse");
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let err = YamlLoader::load_str("callbacks:\n  error_policy: IGNORE\n")
            .expect_err("should reject");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "callbacks:\n  trace: true").expect("write");
        let cfg = YamlLoader::load_file(file.path()).expect("load");
        assert!(cfg.trace_callbacks);
        assert_eq!(cfg.callback_error_policy, CallbackErrorPolicy::Report);
    }

    #[test]
    fn test_missing_file() {
        let err = YamlLoader::load_file("/nonexistent/cdata.yaml").expect_err("missing");
        assert!(matches!(err, Error::Config(_)));
    }
}

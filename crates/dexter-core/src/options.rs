//! Runtime configuration
//!
//! [`VmOptions`] can be built in code or loaded from TOML:
//!
//! ```toml
//! access_checks = true
//! max_stack_depth = 256
//! trace_execution = false
//! jit_threshold = 10000
//! heap_limit = 1048576
//! ```
//!
//! Missing keys take their default value.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{VmError, VmResult};

/// Interpreter and heap configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Run the access-checking handler set (type and monitor checks)
    pub access_checks: bool,

    /// Maximum interpreted call depth before `StackOverflowError`
    pub max_stack_depth: usize,

    /// Emit a `trace` record for every executed instruction
    pub trace_execution: bool,

    /// Samples after which a method is considered hot
    pub jit_threshold: u32,

    /// Maximum number of live objects, unlimited when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_limit: Option<usize>,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            access_checks: true,
            max_stack_depth: 512,
            trace_execution: false,
            jit_threshold: 10_000,
            heap_limit: None,
        }
    }
}

impl VmOptions {
    /// Parse options from a TOML document
    pub fn from_toml_str(content: &str) -> VmResult<Self> {
        let options: VmOptions = toml::from_str(content).map_err(|e| VmError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> VmResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> VmResult<String> {
        toml::to_string(self).map_err(|e| VmError::Config(e.to_string()))
    }

    /// Check value ranges
    pub fn validate(&self) -> VmResult<()> {
        if self.max_stack_depth == 0 {
            return Err(VmError::Config("max_stack_depth must be at least 1".to_string()));
        }
        if self.jit_threshold == 0 {
            return Err(VmError::Config("jit_threshold must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let options = VmOptions::from_toml_str("max_stack_depth = 64").unwrap();
        assert_eq!(options.max_stack_depth, 64);
        assert!(options.access_checks);
        assert_eq!(options.heap_limit, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = VmOptions::from_toml_str("max_stack_depth = 0").unwrap_err();
        assert!(matches!(err, VmError::Config(_)));
        let err = VmOptions::from_toml_str("access_checks = \"yes\"").unwrap_err();
        assert!(matches!(err, VmError::Config(_)));
    }

    #[test]
    fn test_round_trip_through_file() {
        let options = VmOptions {
            trace_execution: true,
            heap_limit: Some(4096),
            ..VmOptions::default()
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(options.to_toml_string().unwrap().as_bytes()).unwrap();
        assert_eq!(VmOptions::from_file(file.path()).unwrap(), options);
    }
}

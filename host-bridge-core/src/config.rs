//! Bridge configuration types
//!
//! Capacities and buffer bounds for a [`BridgeContext`](crate::BridgeContext).
//! The defaults match the sizes the host runtime was built against.

use serde::{Deserialize, Serialize};

/// Configuration for a bridge context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Maximum number of constraint subroutines (default: 20)
    #[serde(default = "default_table_capacity")]
    pub constraint_capacity: usize,

    /// Maximum number of potential callbacks (default: 20)
    #[serde(default = "default_table_capacity")]
    pub potential_capacity: usize,

    /// Longest shell command passed through, in bytes (default: 1024)
    #[serde(default = "default_command_buffer_len")]
    pub command_buffer_len: usize,

    /// Longest error message or context info forwarded to the host, in bytes
    /// (default: 1000)
    #[serde(default = "default_error_info_len")]
    pub error_info_len: usize,
}

fn default_table_capacity() -> usize {
    20
}

fn default_command_buffer_len() -> usize {
    1024
}

fn default_error_info_len() -> usize {
    1000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            constraint_capacity: default_table_capacity(),
            potential_capacity: default_table_capacity(),
            command_buffer_len: default_command_buffer_len(),
            error_info_len: default_error_info_len(),
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the constraint table capacity
    pub fn with_constraint_capacity(mut self, capacity: usize) -> Self {
        self.constraint_capacity = capacity;
        self
    }

    /// Builder method: set the potential callback table capacity
    pub fn with_potential_capacity(mut self, capacity: usize) -> Self {
        self.potential_capacity = capacity;
        self
    }

    /// Builder method: set the shell command buffer length
    pub fn with_command_buffer_len(mut self, len: usize) -> Self {
        self.command_buffer_len = len;
        self
    }

    /// Builder method: set the error message scratch length
    pub fn with_error_info_len(mut self, len: usize) -> Self {
        self.error_info_len = len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::new();
        assert_eq!(config.constraint_capacity, 20);
        assert_eq!(config.potential_capacity, 20);
        assert_eq!(config.command_buffer_len, 1024);
        assert_eq!(config.error_info_len, 1000);
    }

    #[test]
    fn test_builder() {
        let config = BridgeConfig::new()
            .with_constraint_capacity(4)
            .with_potential_capacity(2)
            .with_command_buffer_len(64)
            .with_error_info_len(16);

        assert_eq!(config.constraint_capacity, 4);
        assert_eq!(config.potential_capacity, 2);
        assert_eq!(config.command_buffer_len, 64);
        assert_eq!(config.error_info_len, 16);
    }

    #[test]
    fn test_partial_deserialization() {
        let config: BridgeConfig = toml::from_str("constraint_capacity = 3").unwrap();
        assert_eq!(config.constraint_capacity, 3);
        // Missing fields fall back to defaults
        assert_eq!(config.potential_capacity, 20);
        assert_eq!(config.command_buffer_len, 1024);
    }
}

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Knobs for partition DDL and routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Deepest partition hierarchy walked when building dispatch trees or
    /// ancestor constraints.
    pub max_tree_depth: usize,
    pub allow_default_partition: bool,
    /// Scan the default partition for rows a newly attached partition
    /// would claim.
    pub validate_default_rows: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: 32,
            allow_default_partition: true,
            validate_default_rows: true,
        }
    }
}

impl PartitionConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

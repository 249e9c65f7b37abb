//! Per-context configuration.

use vela_runtime::gc::{DEFAULT_MIN_THRESHOLD, DEFAULT_PAUSE_PERCENT};

/// Tunables applied when a context is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Minimum bytes allocated between two collection cycles.
    pub gc_min_threshold: usize,
    /// Next threshold as a percentage of live bytes after a cycle.
    pub gc_pause_percent: usize,
    /// Operand stack capacity in value slots.
    pub stack_size: usize,
    /// Maximum nesting of calls before `RecursionError`.
    pub max_recursion_depth: usize,
}

impl VmConfig {
    /// Preset for constrained hosts: small stack, eager collection.
    pub fn low_memory() -> Self {
        Self {
            gc_min_threshold: 32 * 1024,
            gc_pause_percent: 150,
            stack_size: 2048,
            max_recursion_depth: 200,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            gc_min_threshold: DEFAULT_MIN_THRESHOLD,
            gc_pause_percent: DEFAULT_PAUSE_PERCENT,
            stack_size: 16384,
            max_recursion_depth: 1000,
        }
    }
}

use serde::{Deserialize, Serialize};

/// Executor configuration section in heron.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub parallel: ParallelConfig,
    #[serde(default)]
    pub jit: JitConfig,
}

/// Parallel execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Maximum number of worker threads for intra-query parallelism.
    /// 0 = disabled (single-threaded), default = num_cpus.
    pub max_workers: usize,
    /// Minimum number of rows to justify parallel execution.
    pub min_rows_for_parallel: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            max_workers: cpus,
            min_rows_for_parallel: 10_000,
        }
    }
}

impl ParallelConfig {
    /// Create a config with parallelism disabled.
    pub fn single_threaded() -> Self {
        Self {
            max_workers: 0,
            min_rows_for_parallel: usize::MAX,
        }
    }

    /// Whether the executor may consider parallel workers at all.
    pub fn workers_allowed(&self) -> bool {
        self.max_workers > 0
    }
}

/// JIT options carried from planner to executor.
///
/// The bootstrap layer records these on the execution state; compilation
/// itself happens downstream, on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitFlags {
    pub enabled: bool,
    /// Apply expensive optimization passes when compiling.
    pub optimize: bool,
    /// Inline storage/catalog helpers into compiled expressions.
    pub inline_functions: bool,
}

/// JIT configuration section in heron.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitConfig {
    pub enabled: bool,
    /// Total plan cost above which JIT kicks in.
    pub above_cost: f64,
    /// Total plan cost above which optimization passes are applied.
    pub optimize_above_cost: f64,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            above_cost: 100_000.0,
            optimize_above_cost: 500_000.0,
        }
    }
}

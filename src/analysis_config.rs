//! A global store of flags that can impact an analysis run.
//!
//! WARNING: Currently only supports a single consistent configuration amongst threads (i.e., cannot
//! have different configurations for different analysis executions in the same process).

/// The global configuration store. Its fields are expected to be accessed across the program via
/// the global [`CONFIG`](static@CONFIG).
pub struct AnalysisConfig {
    /// Optimization level requested from the block lifter when lifting IR for the dataflow
    /// passes. Level 0 keeps every register write explicit, which the reaching-definitions
    /// analysis depends on; do not raise this unless you know the front-end preserves writes.
    pub dataflow_opt_level: u8,
    /// Optimization level requested from the block lifter by the raw traversal diagnostic
    /// ([`traverse`](crate::cfg::traverse)).
    pub traverse_opt_level: u8,
    /// Whether to dump the analyzed CFG as a `cfg-*.dot` file for debugging.
    pub dump_cfg_dot_file: bool,
}

impl AnalysisConfig {
    /// Internal method: sets up initialization
    #[allow(static_mut_refs)]
    fn from_initialized() -> Self {
        let init = unsafe {
            INTERNAL_CONFIG_INITIALIZER
                .take()
                .expect("Should be initialized only once")
        };
        init.unwrap_or_default()
    }

    /// Initialize with the given configuration. Should be called at most once, before any
    /// analysis is run; if never called, the default configuration applies.
    #[allow(static_mut_refs)]
    pub fn initialize(config: AnalysisConfig) {
        let prev = unsafe { INTERNAL_CONFIG_INITIALIZER.replace(Some(config)) };
        assert!(prev.is_some(), "Performed double initialization");
        lazy_static::initialize(&CONFIG);
    }
}

/// Internal initialization detail.
static mut INTERNAL_CONFIG_INITIALIZER: Option<Option<AnalysisConfig>> = Some(None);

lazy_static::lazy_static! {
    /// The global configuration store
    pub static ref CONFIG: AnalysisConfig = AnalysisConfig::from_initialized();
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            dataflow_opt_level: 0,
            traverse_opt_level: 1,
            dump_cfg_dot_file: false,
        }
    }
}

//! Configuration for the analysis pipeline
//!
//! Two kinds of configuration live here: the read-only target description
//! (zero-page layout, intrinsic purity classes, stack thresholds, chip
//! register maps) loaded from TOML, and the option bundles callers pass to
//! the analyzer and IL generator.
//!
//! The Commodore 64 target ships embedded so the compiler works with no
//! files on disk; other targets load from a TOML file of the same shape.

use indexmap::IndexMap;
use serde::Deserialize;

/// Embedded default target (Commodore 64)
pub static DEFAULT_TARGET: &str = include_str!("targets/c64.toml");

/// A read-only description of the compilation target.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub architecture: String,
    pub pointer_width: u8,
    pub zero_page: ZeroPageConfig,
    pub intrinsics: IntrinsicClasses,
    pub stack: StackConfig,
    #[serde(default)]
    pub chips: IndexMap<String, ChipConfig>,
}

/// Zero-page layout and scoring knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ZeroPageConfig {
    pub safe_start: u8,
    pub safe_end: u8,
    /// Weight applied per loop-nesting level in zero-page scoring
    #[serde(default = "default_loop_multiplier")]
    pub loop_multiplier: u64,
    #[serde(default)]
    pub reserved: Vec<ReservedRange>,
}

fn default_loop_multiplier() -> u64 {
    10
}

/// A zero-page region the compiler must not allocate into.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservedRange {
    pub start: u8,
    pub end: u8,
    pub category: String,
}

/// Purity classification of the intrinsic catalogue.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrinsicClasses {
    pub pure: Vec<String>,
    pub impure: Vec<String>,
}

/// Stack-depth thresholds in bytes.
#[derive(Debug, Clone, Deserialize)]
pub struct StackConfig {
    pub warn_threshold: u32,
    pub error_threshold: u32,
}

/// Register map of one support chip.
#[derive(Debug, Clone, Deserialize)]
pub struct ChipConfig {
    pub base: u16,
    #[serde(default)]
    pub registers: IndexMap<String, u16>,
}

impl TargetConfig {
    /// Parse a target description from TOML text.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse target config: {}", e))
    }

    /// The embedded Commodore 64 target.
    pub fn c64() -> Self {
        Self::from_toml(DEFAULT_TARGET).expect("embedded c64 target must parse")
    }

    pub fn is_pure_intrinsic(&self, name: &str) -> bool {
        self.intrinsics.pure.iter().any(|n| n == name)
    }

    pub fn is_impure_intrinsic(&self, name: &str) -> bool {
        self.intrinsics.impure.iter().any(|n| n == name)
    }

    /// Absolute address of a chip register, if the chip and register are
    /// in the map.
    pub fn chip_register(&self, chip: &str, register: &str) -> Option<u16> {
        let c = self.chips.get(chip)?;
        c.registers.get(register).map(|off| c.base + off)
    }

    /// Whether a zero-page address is inside the allocatable window and
    /// outside every reserved range.
    pub fn zero_page_usable(&self, addr: u8) -> bool {
        if addr < self.zero_page.safe_start || addr > self.zero_page.safe_end {
            return false;
        }
        !self
            .zero_page
            .reserved
            .iter()
            .any(|r| addr >= r.start && addr <= r.end)
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self::c64()
    }
}

/// Options accepted by the semantic analyzer facade.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Abort the pipeline after the first pass that reports an error
    pub stop_on_first_error: bool,
    /// Abort once this many errors have accumulated (0 = unlimited)
    pub max_errors: usize,
    /// Emit warnings in addition to errors
    pub report_warnings: bool,
    /// Record per-pass wall times in the result stats
    pub collect_timings: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        AnalyzerOptions {
            stop_on_first_error: false,
            max_errors: 0,
            report_warnings: true,
            collect_timings: false,
        }
    }
}

impl AnalyzerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stop_on_first_error(mut self, value: bool) -> Self {
        self.stop_on_first_error = value;
        self
    }

    pub fn with_max_errors(mut self, value: usize) -> Self {
        self.max_errors = value;
        self
    }

    pub fn with_report_warnings(mut self, value: bool) -> Self {
        self.report_warnings = value;
        self
    }

    pub fn with_timings(mut self, value: bool) -> Self {
        self.collect_timings = value;
        self
    }
}

/// Options accepted by the IL generator facade.
#[derive(Debug, Clone)]
pub struct GenOptions {
    /// Convert each generated function to SSA form
    pub enable_ssa: bool,
    /// Run the strict SSA verifier. Off by default: well-formed loops
    /// define phi operands on back-edges, which strict dominance checking
    /// rejects
    pub verify_ssa: bool,
    /// Place phi instructions during SSA construction
    pub insert_phi_instructions: bool,
    /// Record per-function SSA statistics
    pub collect_ssa_stats: bool,
    /// Log lowering steps
    pub verbose: bool,
}

impl Default for GenOptions {
    fn default() -> Self {
        GenOptions {
            enable_ssa: true,
            verify_ssa: false,
            insert_phi_instructions: true,
            collect_ssa_stats: false,
            verbose: false,
        }
    }
}

impl GenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ssa(mut self, value: bool) -> Self {
        self.enable_ssa = value;
        self
    }

    pub fn with_verify_ssa(mut self, value: bool) -> Self {
        self.verify_ssa = value;
        self
    }

    pub fn with_ssa_stats(mut self, value: bool) -> Self {
        self.collect_ssa_stats = value;
        self
    }
}

//! `deobfstr-config` provides the shared configuration and report data structures for
//! `deobfstr`, a static string-deobfuscator for managed binaries. These structures are
//! used by both the core analysis/rewriting pipeline and the command-line interface.
//!
//! This crate is intended to be consumed by tools that embed the deobfuscation pipeline
//! or need to parse its YAML configuration overrides.

use serde::{Deserialize, Serialize};

/// Current supported YAML config version.
pub const YAML_CONFIG_VERSION: &str = "1.0.0";

/// Tunable constants that characterize the decoder shape this pipeline recognizes.
///
/// The defaults match the decoder layout fixed by the pipeline's design: a single
/// byte-indexed stream cipher and a minimum payload size used to pick the decoder type
/// out of the module's other static fields. Overriding these via `--config` does not
/// change the recognized instruction patterns, only the numeric thresholds and cipher
/// constants used while scanning for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum byte length of a static field's initial bytes for it to be considered
    /// a candidate decoder payload.
    pub payload_size_threshold: usize,
    /// Modulus applied to the byte index before XOR-ing with `cipher_key_byte`.
    pub cipher_index_modulus: u32,
    /// Constant XOR key byte combined with `index mod cipher_index_modulus`.
    pub cipher_key_byte: u8,
    /// Literal value of the header field that marks a lookup-table record as a
    /// header row rather than data (case-sensitive, compared against field 0).
    pub lookup_table_header_sentinel: String,
    /// Prefix prepended to numeric ids recovered from the lookup-table path to form
    /// `AccessorMap` keys.
    pub lookup_table_key_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            payload_size_threshold: 50_000,
            cipher_index_modulus: 256,
            cipher_key_byte: 0xAA,
            lookup_table_header_sentinel: "StringID".to_owned(),
            lookup_table_key_prefix: "_String_".to_owned(),
        }
    }
}

/// Root YAML configuration file accepted by the CLI's optional `--config` flag.
#[derive(Debug, Serialize, Deserialize)]
pub struct YamlConfig {
    /// Version of the config file format.
    pub version: String,
    /// Pipeline tuning overrides.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Per-accessor outcome recorded while analyzing the decoder type, used to build the
/// human-readable report without promoting per-method failures to errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessorOutcome {
    /// The accessor's `(offset, length)` pair was recovered and decoded successfully.
    Recovered,
    /// The method does not match the accessor shape (wrong arity, return type, etc.)
    /// and was not considered at all.
    NotAnAccessor,
    /// The three-instruction constant-load pattern was not found before the first call.
    PatternMismatch,
    /// `offset + length` exceeded the payload length.
    OutOfBounds,
    /// The sliced bytes were not valid UTF-8.
    InvalidUtf8,
}

/// Summary statistics produced by one pipeline run, independent of how the caller
/// chooses to render them (the CLI logs each field; an embedder might serialize it).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    /// Whether a decoder type was located at all.
    pub decoder_found: bool,
    /// Fully qualified name of the located decoder type, if any.
    pub decoder_type_name: Option<String>,
    /// Number of methods in the decoder type considered as accessor candidates.
    pub accessors_total: usize,
    /// Number of accessors whose text was recovered into the `AccessorMap`.
    pub accessors_recovered: usize,
    /// Number of accessor candidates skipped for any reason.
    pub accessors_skipped: usize,
    /// Per-method or per-record disposition, in the order the analyzer visited them;
    /// finer-grained than the aggregate counters above.
    pub accessor_outcomes: Vec<AccessorOutcome>,
    /// Number of lookup-table records that failed to parse.
    pub table_records_malformed: usize,
    /// Total call-site instructions mutated across the module.
    pub calls_replaced: usize,
    /// Number of distinct methods that had at least one call site mutated.
    pub methods_patched: usize,
    /// Number of decoder-type-targeted calls still present after rewriting.
    pub residual_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipeline_config_matches_spec_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.payload_size_threshold, 50_000);
        assert_eq!(config.cipher_index_modulus, 256);
        assert_eq!(config.cipher_key_byte, 0xAA);
        assert_eq!(config.lookup_table_header_sentinel, "StringID");
        assert_eq!(config.lookup_table_key_prefix, "_String_");
    }

    #[test]
    fn yaml_config_round_trips_through_serde_yaml_shape() {
        let yaml = "version: \"1.0.0\"\npipeline:\n  payload_size_threshold: 1000\n";
        let parsed: YamlConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(parsed.version, YAML_CONFIG_VERSION);
        assert_eq!(parsed.pipeline.payload_size_threshold, 1000);
        assert_eq!(parsed.pipeline.cipher_key_byte, 0xAA);
    }
}

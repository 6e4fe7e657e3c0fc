//! Orchestrates the seven components in a fixed order: load, locate,
//! extract + decrypt, analyze, rewrite, verify, optionally write. Single-threaded,
//! deterministic, side-effect-free until the final write.

use std::path::Path;

use deobfstr_config::{PipelineConfig, Report};

use crate::error::PipelineError;
use crate::{accessor, decoder, facade, payload, rewrite, verify};

/// Runs the full pipeline against `input_path`.
///
/// When `output_path` is `Some`, the (possibly rewritten) module is written there; a
/// `None` decoder match still succeeds and, if requested, writes the module back
/// unchanged (the no-decoder-found outcome). When `scan_only` is set, the pipeline
/// stops right after decoder location: no payload decryption, accessor analysis,
/// rewriting, verification, or write happens, and `output_path` is ignored.
pub fn run(
    input_path: &Path,
    output_path: Option<&Path>,
    config: &PipelineConfig,
    scan_only: bool,
) -> Result<Report, PipelineError> {
    let mut report = Report::default();

    let (mut object, mut module) = facade::load(input_path)?;

    let Some(location) = decoder::locate(&module, config) else {
        log::info!("no decoder type found; module is not string-obfuscated");
        if let Some(output_path) = output_path.filter(|_| !scan_only) {
            facade::write(&mut object, &module, output_path)?;
        }
        return Ok(report);
    };

    report.decoder_found = true;
    report.decoder_type_name = Some(location.decoder_type.clone());
    log::info!("located decoder type `{}`", location.decoder_type);

    if scan_only {
        return Ok(report);
    }

    let mut payload_bytes = payload::extract(&location);
    payload::decrypt_in_place(&mut payload_bytes, config);

    let Some(decoder_type) = module.find_type(&location.decoder_type) else {
        return Err(PipelineError::PayloadExtractionFailed {
            type_name: location.decoder_type.clone(),
        });
    };

    let accessors = accessor::analyze(
        decoder_type,
        location.table_field.as_deref(),
        &payload_bytes,
        config,
        &mut report,
    );
    log::info!(
        "recovered {} of {} accessor(s)",
        report.accessors_recovered,
        report.accessors_total.max(report.accessors_recovered)
    );

    rewrite::rewrite(&mut module, &location.decoder_type, &accessors, &mut report);
    log::info!(
        "replaced {} call site(s) across {} method(s)",
        report.calls_replaced,
        report.methods_patched
    );

    report.residual_calls = verify::count_residual_calls(&module, &location.decoder_type);
    if report.residual_calls > 0 {
        log::warn!(
            "{} decoder call(s) could not be resolved and remain in the output",
            report.residual_calls
        );
    }

    if let Some(output_path) = output_path {
        facade::write(&mut object, &module, output_path)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_output_path_skips_the_write_step() {
        // A nonexistent input surfaces as InputNotFound without touching the facade's
        // write path; this just documents that `run` is safe to call dry.
        let config = PipelineConfig::default();
        let result = run(Path::new("/nonexistent/input.dll"), None, &config, false);
        assert!(matches!(result, Err(PipelineError::InputNotFound(_))));
    }
}

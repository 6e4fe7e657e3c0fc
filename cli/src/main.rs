use std::fs;
use std::path::PathBuf;

use clap::Parser;
use deobfstr_config::{PipelineConfig, YAML_CONFIG_VERSION, YamlConfig};

/// Commandline interface for deobfstr: statically recovers string literals hidden
/// behind an obfuscated decoder in a managed binary and rewrites the call sites that
/// fetched them.
#[derive(Parser, Debug)]
#[command(name = "deobfstr")]
#[command(about = "Statically recover obfuscated strings in a managed binary", long_about = None)]
pub struct Cli {
    /// Input binary to process.
    #[arg(long, value_name = "INPUT")]
    pub input: PathBuf,
    /// Output path for the rewritten binary.
    #[arg(long, value_name = "OUTPUT")]
    pub output: PathBuf,
    /// Run the pipeline and report statistics, but skip writing the output file.
    #[arg(long)]
    pub dry_run: bool,
    /// Run only the decoder-presence scan and exit without rewriting anything.
    #[arg(long)]
    pub scan: bool,
    /// Copy the input file to `<input>.backup` before writing the output.
    #[arg(long, default_value_t = true)]
    pub backup: bool,
    /// Include the underlying library's diagnostic chain on fatal errors.
    #[arg(long)]
    pub verbose: bool,
    /// Optional YAML file overriding the pipeline's decoder-detection constants.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: log::LevelFilter,
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let contents = fs::read_to_string(path)?;
    let config: YamlConfig = serde_yaml::from_str(&contents)?;
    if config.version != YAML_CONFIG_VERSION {
        log::warn!(
            "config file version {} does not match expected {}; using it anyway",
            config.version,
            YAML_CONFIG_VERSION
        );
    }
    Ok(config.pipeline)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    env_logger::builder().filter_level(cli.log_level).init();

    let config = load_config(cli.config.as_ref())?;

    if cli.backup && !cli.dry_run && !cli.scan {
        let mut backup_name = cli.input.file_name().unwrap_or_default().to_os_string();
        backup_name.push(".backup");
        let backup_path = cli.input.with_file_name(backup_name);
        fs::copy(&cli.input, &backup_path)?;
        log::info!("backed up input to {:?}", backup_path);
    }

    let output_path = if cli.dry_run || cli.scan { None } else { Some(cli.output.as_path()) };

    let report = match deobfstr_core::run(&cli.input, output_path, &config, cli.scan) {
        Ok(report) => report,
        Err(err) => {
            log::error!("{err}");
            if cli.verbose {
                let mut source = std::error::Error::source(&err);
                while let Some(cause) = source {
                    log::error!("  caused by: {cause}");
                    source = cause.source();
                }
            }
            std::process::exit(1);
        }
    };

    if cli.scan {
        log::info!("decoder_found = {}", report.decoder_found);
        if let Some(name) = &report.decoder_type_name {
            log::info!("decoder_type = {name}");
        }
        return Ok(());
    }

    log::info!("decoder_found: {}", report.decoder_found);
    log::info!(
        "accessors: {} recovered, {} skipped, {} total",
        report.accessors_recovered,
        report.accessors_skipped,
        report.accessors_total
    );
    if report.table_records_malformed > 0 {
        log::warn!("{} lookup-table record(s) were malformed", report.table_records_malformed);
    }
    log::info!(
        "rewrote {} call site(s) across {} method(s)",
        report.calls_replaced,
        report.methods_patched
    );
    if report.residual_calls > 0 {
        log::warn!("{} decoder call(s) remain unresolved in the output", report.residual_calls);
    }
    if cli.dry_run {
        log::info!("dry run: no output written");
    } else {
        log::info!("wrote {:?}", cli.output);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_used_when_no_file_is_given() {
        let config = load_config(None).expect("default config");
        assert_eq!(config.payload_size_threshold, 50_000);
    }
}

//! Load forecast entry point: CLI wiring and config-driven runs.

use std::process;

use tracing_subscriber::EnvFilter;

use load_forecast::cli::{self, Command, GenerateOptions};
use load_forecast::compare::{ComparisonEntry, ComparisonReport, ProfileSource, compare_profiles};
use load_forecast::config::ForecastConfig;
use load_forecast::error::ForecastError;
use load_forecast::pipeline::run_to_directory;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the configuration: `--config` takes priority, then `--preset`,
/// then the `base_profile` default. Command-line overrides are applied last.
fn load_config(opts: &GenerateOptions) -> ForecastConfig {
    let loaded = if let Some(ref path) = opts.config {
        ForecastConfig::from_toml_file(path)
    } else if let Some(ref name) = opts.preset {
        ForecastConfig::from_preset(name)
    } else {
        Ok(ForecastConfig::base_profile())
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(ref path) = opts.history {
        config.inputs.history = Some(path.clone());
    }
    if let Some(ref path) = opts.scenarios {
        config.inputs.scenarios = Some(path.clone());
    }
    if let Some(seed) = opts.seed {
        config.forecast.seed = Some(seed);
    }
    config
}

fn generate(opts: &GenerateOptions) {
    let config = load_config(opts);

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    match run_to_directory(&config, opts.out.as_deref()) {
        Ok((outcome, written)) => {
            println!("{}", outcome.validation);
            for warning in &outcome.warnings {
                println!("warning: {warning}");
            }
            for path in &written {
                eprintln!("Written {}", path.display());
            }
        }
        Err(ForecastError::Configuration(reasons)) => {
            for r in &reasons {
                eprintln!("{r}");
            }
            process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

fn compare(files: &[std::path::PathBuf]) {
    let sources: Vec<ProfileSource> = files.iter().map(ProfileSource::from_path).collect();
    let entries = compare_profiles(&sources);
    println!("{}", ComparisonReport(&entries));
    if entries
        .iter()
        .all(|e| matches!(e, ComparisonEntry::Failed { .. }))
    {
        process::exit(1);
    }
}

fn main() {
    let command = cli::parse_args().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        cli::print_usage();
        process::exit(1);
    });
    init_tracing();

    match command {
        Command::Help => cli::print_usage(),
        Command::Generate(opts) => generate(&opts),
        Command::Compare(files) => compare(&files),
    }
}

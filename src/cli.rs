use std::env;
use std::path::PathBuf;

/// Options of the `generate` subcommand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub config: Option<PathBuf>,
    pub preset: Option<String>,
    pub history: Option<PathBuf>,
    pub scenarios: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Generate(GenerateOptions),
    Compare(Vec<PathBuf>),
    Help,
}

pub fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

pub fn parse_args_from(args: Vec<String>) -> Result<Command, String> {
    match args.first().map(String::as_str) {
        None | Some("--help" | "-h" | "help") => Ok(Command::Help),
        Some("generate") => parse_generate(&args[1..]).map(Command::Generate),
        Some("compare") => parse_compare(&args[1..]).map(Command::Compare),
        Some(other) => Err(format!(
            "unknown command: {other} (expected `generate` or `compare`)"
        )),
    }
}

fn parse_generate(args: &[String]) -> Result<GenerateOptions, String> {
    let mut i = 0usize;
    let mut opts = GenerateOptions::default();

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--config" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --config (expected a TOML file path)")?;
                set_once(&mut opts.config, PathBuf::from(path), flag)?;
            }
            "--preset" => {
                i += 1;
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                set_once(&mut opts.preset, name.to_string(), flag)?;
            }
            "--history" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --history (expected a CSV file path)")?;
                set_once(&mut opts.history, PathBuf::from(path), flag)?;
            }
            "--scenarios" => {
                i += 1;
                let path =
                    args.next_or_err(i, "missing value for --scenarios (expected a CSV file path)")?;
                set_once(&mut opts.scenarios, PathBuf::from(path), flag)?;
            }
            "--out" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --out (expected a directory)")?;
                set_once(&mut opts.out, PathBuf::from(path), flag)?;
            }
            "--seed" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --seed (expected an unsigned integer)")?;
                let seed = raw
                    .parse::<u64>()
                    .map_err(|_| format!("invalid value for --seed: \"{raw}\" is not a u64"))?;
                set_once(&mut opts.seed, seed, flag)?;
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if opts.config.is_some() && opts.preset.is_some() {
        return Err(
            "arguments `--config` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }
    Ok(opts)
}

fn parse_compare(args: &[String]) -> Result<Vec<PathBuf>, String> {
    if let Some(flag) = args.iter().find(|a| a.starts_with("--")) {
        return Err(format!("unknown argument: {flag}"));
    }
    if args.is_empty() {
        return Err("compare needs at least one forecast CSV".to_string());
    }
    Ok(args.iter().map(PathBuf::from).collect())
}

fn set_once<T>(slot: &mut Option<T>, value: T, flag: &str) -> Result<(), String> {
    if slot.replace(value).is_some() {
        return Err(format!("{flag} provided more than once"));
    }
    Ok(())
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("load-forecast: annual-target driven load profile forecasts");
    eprintln!();
    eprintln!("Usage:");
    eprintln!(
        "  load-forecast generate [--config <toml> | --preset <name>] [--history <csv>] [--scenarios <csv>] [--out <dir>] [--seed <u64>]"
    );
    eprintln!("  load-forecast compare <csv>...");
    eprintln!();
    eprintln!("Presets: base_profile (default), stl, stl_improved");
    eprintln!("Log level follows RUST_LOG (default: info).");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn supports_generate_with_overrides() {
        let cmd = parse_args_from(args(&[
            "generate",
            "--preset",
            "stl",
            "--history",
            "h.csv",
            "--scenarios",
            "s.csv",
            "--out",
            "out",
            "--seed",
            "7",
        ]))
        .expect("parse should succeed");
        let opts = match cmd {
            Command::Generate(opts) => opts,
            other => panic!("expected generate, got {other:?}"),
        };
        assert_eq!(opts.preset.as_deref(), Some("stl"));
        assert_eq!(opts.history.as_deref().and_then(|p| p.to_str()), Some("h.csv"));
        assert_eq!(opts.seed, Some(7));
        assert!(opts.config.is_none());
    }

    #[test]
    fn config_and_preset_are_exclusive() {
        let err = parse_args_from(args(&["generate", "--config", "a.toml", "--preset", "stl"]))
            .unwrap_err();
        assert!(err.contains("mutually exclusive"));
    }

    #[test]
    fn repeated_flag_is_rejected() {
        let err = parse_args_from(args(&["generate", "--out", "a", "--out", "b"])).unwrap_err();
        assert_eq!(err, "--out provided more than once");
    }

    #[test]
    fn bad_seed_is_rejected() {
        let err = parse_args_from(args(&["generate", "--seed", "-3"])).unwrap_err();
        assert!(err.contains("--seed"));
    }

    #[test]
    fn missing_value_is_reported() {
        let err = parse_args_from(args(&["generate", "--history"])).unwrap_err();
        assert!(err.starts_with("missing value for --history"));
    }

    #[test]
    fn supports_compare_cli() {
        let cmd = parse_args_from(args(&["compare", "a.csv", "b.csv"])).unwrap();
        assert_eq!(
            cmd,
            Command::Compare(vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")])
        );
        assert!(parse_args_from(args(&["compare"])).is_err());
    }

    #[test]
    fn no_arguments_shows_help() {
        assert_eq!(parse_args_from(Vec::new()), Ok(Command::Help));
        assert!(parse_args_from(args(&["forecast"])).is_err());
    }
}

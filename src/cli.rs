//! Command-line argument parsing.

use std::env;
use std::path::PathBuf;

/// Preset used when neither `--scenario` nor `--preset` is given.
pub const DEFAULT_PRESET: &str = "baseline";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOptions {
    pub scenario: Option<PathBuf>,
    pub preset: Option<String>,
    pub seed: Option<u64>,
    pub csv_out: Option<PathBuf>,
    pub json_out: Option<PathBuf>,
    /// Suppress per-step lines.
    pub quiet: bool,
    pub help: bool,
}

/// Parses the process arguments.
pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

/// Parses `args` (program name excluded).
///
/// # Errors
///
/// Returns a message for unknown flags, missing or malformed values,
/// repeated flags, and `--scenario` combined with `--preset`.
pub fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    let mut opts = CliOptions::default();
    let mut i = 0usize;

    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --scenario (expected a TOML file path)")?;
                if opts.scenario.replace(PathBuf::from(path)).is_some() {
                    return Err("--scenario provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if opts.preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--seed" => {
                i += 1;
                let raw = args.next_or_err(i, "missing value for --seed (expected a u64)")?;
                let seed = raw
                    .parse::<u64>()
                    .map_err(|_| format!("--seed value \"{raw}\" is not a valid u64"))?;
                if opts.seed.replace(seed).is_some() {
                    return Err("--seed provided more than once".to_string());
                }
            }
            "--csv-out" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --csv-out (expected a file path)")?;
                if opts.csv_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--csv-out provided more than once".to_string());
                }
            }
            "--json-out" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --json-out (expected a file path)")?;
                if opts.json_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--json-out provided more than once".to_string());
                }
            }
            "--quiet" | "-q" => opts.quiet = true,
            "--help" | "-h" => {
                opts.help = true;
                return Ok(opts);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if opts.scenario.is_some() && opts.preset.is_some() {
        return Err(
            "arguments `--scenario` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    if opts.scenario.is_none() && opts.preset.is_none() {
        opts.preset = Some(DEFAULT_PRESET.to_string());
    }

    Ok(opts)
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
    eprintln!("ev-cosim: EV charging, storage, and grid co-simulation");
    eprintln!();
    eprintln!("Usage:");
    eprintln!(
        "  ev-cosim [--scenario <path> | --preset <name>] [--seed <u64>] \
         [--csv-out <path>] [--json-out <path>] [--quiet]"
    );
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>   Load scenario from a TOML file");
    eprintln!("  --preset <name>     Use a built-in preset (baseline, high_renewables, weak_grid)");
    eprintln!("  --seed <u64>        Override the scenario seed");
    eprintln!("  --csv-out <path>    Write one CSV row per step");
    eprintln!("  --json-out <path>   Write the full time series as JSON");
    eprintln!("  -q, --quiet         Print only the run summary");
    eprintln!("  -h, --help          Show this help message");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn supports_scenario_cli() {
        let opts = parse_args_from(args(&["--scenario", "scenario.toml"])).expect("parse should succeed");
        assert_eq!(
            opts.scenario.as_deref().and_then(|p| p.to_str()),
            Some("scenario.toml")
        );
        assert!(opts.preset.is_none());
    }

    #[test]
    fn supports_preset_cli() {
        let opts = parse_args_from(args(&["--preset", "weak_grid"])).expect("parse should succeed");
        assert_eq!(opts.preset.as_deref(), Some("weak_grid"));
        assert!(opts.scenario.is_none());
    }

    #[test]
    fn defaults_to_baseline_preset() {
        let opts = parse_args_from(Vec::new()).unwrap();
        assert_eq!(opts.preset.as_deref(), Some(DEFAULT_PRESET));
        assert!(!opts.quiet);
        assert!(opts.seed.is_none());
    }

    #[test]
    fn parses_all_outputs() {
        let opts = parse_args_from(args(&[
            "--seed", "7", "--csv-out", "out.csv", "--json-out", "out.json", "-q",
        ]))
        .unwrap();
        assert_eq!(opts.seed, Some(7));
        assert_eq!(opts.csv_out, Some(PathBuf::from("out.csv")));
        assert_eq!(opts.json_out, Some(PathBuf::from("out.json")));
        assert!(opts.quiet);
    }

    #[test]
    fn rejects_scenario_with_preset() {
        let err = parse_args_from(args(&["--scenario", "a.toml", "--preset", "baseline"])).unwrap_err();
        assert!(err.contains("mutually exclusive"));
    }

    #[test]
    fn rejects_bad_seed_and_unknown_flags() {
        assert!(parse_args_from(args(&["--seed", "-3"])).unwrap_err().contains("not a valid u64"));
        assert!(parse_args_from(args(&["--seed"])).unwrap_err().contains("missing value"));
        assert!(parse_args_from(args(&["--serve"])).unwrap_err().contains("unknown argument"));
        assert!(parse_args_from(args(&["--csv-out", "a", "--csv-out", "b"]))
            .unwrap_err()
            .contains("more than once"));
    }

    #[test]
    fn help_short_circuits() {
        let opts = parse_args_from(args(&["--help", "--bogus"])).unwrap();
        assert!(opts.help);
    }
}

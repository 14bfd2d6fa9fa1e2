use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;

use crate::checks::{self, CheckContext, CheckReport, Outcome};
use crate::cluster::HttpSession;
use crate::config::{create_sample_config, load_config, ProbeConfig};

pub fn build_cli() -> Command {
    Command::new("telemetry-probe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Telemetry Probe - End-to-end checks for a cluster's metrics pipeline")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("masters")
                .short('m')
                .long("masters")
                .value_name("HOSTS")
                .help("Comma-separated master addresses; the first one is treated as leader"),
        )
        .arg(
            Arg::new("agents")
                .short('a')
                .long("agents")
                .value_name("HOSTS")
                .help("Comma-separated private agent addresses"),
        )
        .arg(
            Arg::new("public-agents")
                .short('p')
                .long("public-agents")
                .value_name("HOSTS")
                .help("Comma-separated public agent addresses"),
        )
        .arg(
            Arg::new("scheme")
                .long("scheme")
                .value_name("SCHEME")
                .help("Admin Router scheme (http or https)"),
        )
        .arg(
            Arg::new("auth-token")
                .long("auth-token")
                .value_name("TOKEN")
                .help("ACS token sent as 'Authorization: token=<TOKEN>'"),
        )
        .arg(
            Arg::new("security")
                .long("security")
                .value_name("MODE")
                .help("Cluster security mode (disabled, permissive, strict)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (error, warn, info, debug, trace)"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Run only this check; may be repeated"),
        )
        .arg(
            Arg::new("windows-only")
                .long("windows-only")
                .action(ArgAction::SetTrue)
                .help("Run only the checks supported on Windows agents"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List the available checks and exit"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the reports as JSON"),
        )
        .arg(
            Arg::new("write-sample-config")
                .long("write-sample-config")
                .value_name("FILE")
                .help("Write a sample configuration file and exit"),
        )
}

/// `RUST_LOG` when set, otherwise the configured level, otherwise `info`.
fn log_filter(rust_log: Option<String>, configured: Option<&str>) -> String {
    rust_log
        .filter(|filter| !filter.is_empty())
        .or_else(|| configured.map(String::from))
        .unwrap_or_else(|| "info".to_string())
}

/// Starts the logger once the configuration is known; later calls are no-ops.
pub fn init_logging(config: &ProbeConfig) {
    let filter = log_filter(std::env::var("RUST_LOG").ok(), config.log_level.as_deref());
    let _ = env_logger::Builder::new().parse_filters(&filter).try_init();
}

fn print_summary(reports: &[CheckReport]) {
    for report in reports {
        let (status, detail) = match &report.outcome {
            Outcome::Passed => ("PASS", None),
            Outcome::Failed(message) => ("FAIL", Some(message)),
            Outcome::Skipped(reason) => ("SKIP", Some(reason)),
        };
        println!("{status} {:<32} {:>8}ms", report.name, report.duration_ms);
        if let Some(detail) = detail {
            println!("     {detail}");
        }
    }

    let failed = reports.iter().filter(|r| r.is_failure()).count();
    println!("\n{} checks, {failed} failed", reports.len());
}

/// Runs the command described by `matches`; `Ok(false)` means at least one check failed.
pub fn run(matches: &ArgMatches) -> Result<bool> {
    if let Some(path) = matches.get_one::<String>("write-sample-config") {
        create_sample_config(path)?;
        return Ok(true);
    }

    if matches.get_flag("list") {
        for check in checks::all() {
            let windows = if check.windows_supported { " [windows]" } else { "" };
            println!("{:<32} {}{windows}", check.name, check.description);
        }
        return Ok(true);
    }

    let config_path = matches.get_one::<String>("config");
    let config = load_config(config_path.map(|s| s.as_str()), matches)?;
    init_logging(&config);

    let names: Vec<String> = matches
        .get_many::<String>("check")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let selected = checks::select(&names, matches.get_flag("windows-only"))?;
    info!(
        "Running {} check(s) against leader {}",
        selected.len(),
        config.masters.first().map(String::as_str).unwrap_or_default()
    );

    let session = HttpSession::new(&config)?;
    let ctx = CheckContext::new(&session, config.timeouts, config.security);
    let reports = checks::run_checks(&ctx, &selected);

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_summary(&reports);
    }

    Ok(!reports.iter().any(CheckReport::is_failure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityMode;

    #[test]
    fn test_cli_overrides_defaults() {
        let matches = build_cli()
            .try_get_matches_from([
                "telemetry-probe",
                "--masters",
                "10.0.0.1,10.0.0.4",
                "--agents",
                "10.0.0.2",
                "--security",
                "strict",
                "--check",
                "metrics_ping",
                "--check",
                "metrics_node",
            ])
            .unwrap();

        let config = load_config(None, &matches).unwrap();
        assert_eq!(config.masters, vec!["10.0.0.1", "10.0.0.4"]);
        assert_eq!(config.agents, vec!["10.0.0.2"]);
        assert_eq!(config.security, SecurityMode::Strict);

        let checks: Vec<&String> = matches.get_many::<String>("check").unwrap().collect();
        assert_eq!(checks.len(), 2);
    }

    #[test]
    fn test_flags_default_off() {
        let matches = build_cli().try_get_matches_from(["telemetry-probe"]).unwrap();
        assert!(!matches.get_flag("json"));
        assert!(!matches.get_flag("windows-only"));
        assert!(matches.get_one::<String>("log-level").is_none());
    }

    #[test]
    fn test_log_filter_precedence() {
        assert_eq!(log_filter(None, None), "info");
        assert_eq!(log_filter(None, Some("debug")), "debug");
        assert_eq!(log_filter(Some(String::new()), Some("warn")), "warn");
        assert_eq!(
            log_filter(Some("telemetry_probe=trace".to_string()), Some("debug")),
            "telemetry_probe=trace"
        );
    }

    #[test]
    fn test_configured_log_level_reaches_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();
        let path = path.to_str().unwrap();

        let matches = build_cli()
            .try_get_matches_from(["telemetry-probe", "--config", path])
            .unwrap();
        let config = load_config(Some(path), &matches).unwrap();
        assert_eq!(log_filter(None, config.log_level.as_deref()), "debug");

        let matches = build_cli()
            .try_get_matches_from(["telemetry-probe", "--config", path, "--log-level", "warn"])
            .unwrap();
        let config = load_config(Some(path), &matches).unwrap();
        assert_eq!(log_filter(None, config.log_level.as_deref()), "warn");
    }

    #[test]
    fn test_unknown_check_is_an_error() {
        let matches = build_cli()
            .try_get_matches_from(["telemetry-probe", "--check", "metrics_everything"])
            .unwrap();
        assert!(run(&matches).is_err());
    }
}

use anyhow::Result;
use log::error;

use telemetry_probe::cli::{build_cli, run};

fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    // Logging starts inside `run`, once the configured level is known
    if !run(&matches)? {
        error!("One or more checks failed");
        std::process::exit(1);
    }
    Ok(())
}

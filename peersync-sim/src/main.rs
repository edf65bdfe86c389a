//! peersync simulator
//!
//! Runs a small watch party entirely in-process: every peer is a real
//! session driver talking over the in-memory network, with simulated
//! players that run at slightly different speeds.
//!
//! Usage:
//!   cargo run -p peersync-sim
//!   cargo run -p peersync-sim -- --peers 5 --drift-secs 20

mod player;
mod scenario;

const DEFAULT_PEERS: usize = 3;
const DEFAULT_DRIFT_SECS: u64 = 12;

/// Value following `flag`, if the flag was given at all
fn flag_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>, String> {
    let Some(i) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    let raw = args
        .get(i + 1)
        .ok_or_else(|| format!("{} needs a value", flag))?;
    raw.parse()
        .map(Some)
        .map_err(|_| format!("invalid value for {}: {:?}", flag, raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("peersync_sim=info".parse()?)
                .add_directive("peersync_core=info".parse()?),
        )
        .init();

    let options = scenario::Options {
        // A party needs someone left over after the host drops
        peers: flag_value(&args, "--peers")?.unwrap_or(DEFAULT_PEERS).max(2),
        drift_secs: flag_value(&args, "--drift-secs")?.unwrap_or(DEFAULT_DRIFT_SECS),
    };

    scenario::run(options).await
}

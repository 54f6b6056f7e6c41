#![forbid(unsafe_code)]

use anyhow::Result;
use civic_sim::{SimulationConfig, Simulator};

fn main() -> Result<()> {
    let mut simulator = Simulator::new(SimulationConfig::default())?;
    let result = simulator.run()?;

    println!(
        "simulation complete: rounds={} trace_events={} interesting={} fingerprint={}",
        result.rounds_run,
        result.trace.len(),
        result.interesting_state_reached,
        result.trace_fingerprint()?
    );

    Ok(())
}

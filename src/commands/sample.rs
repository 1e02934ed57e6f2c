//! Sample command implementation.
//!
//! Builds the configured monitor and prints a fixed number of readings.

use std::thread;
use tracing::debug;

use herakles_proc_load_monitor::{Config, ConfigFormat, Monitor, MonitorMode, SystemMonitor};

use super::UsageRecord;

pub fn command_sample(config: &Config, iterations: usize, format: ConfigFormat) -> anyhow::Result<()> {
    let monitor = Monitor::from_config(config)?;
    let pause = match monitor.mode() {
        MonitorMode::Lazy => config.refresh_threshold()?,
        _ => config.refresh_interval()?,
    };

    monitor.start()?;
    debug!(
        "Sampling {:?} monitor {} times every {}ms",
        monitor.mode(),
        iterations,
        pause.as_millis()
    );

    for i in 1..=iterations {
        let snapshot = monitor.snapshot();
        println!(
            "{}",
            UsageRecord::now(&snapshot.cpu, &snapshot.memory).render(format)?
        );

        if i < iterations {
            thread::sleep(pause);
        }
    }

    monitor.stop();
    Ok(())
}

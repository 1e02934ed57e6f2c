//! Check command implementation.
//!
//! Prints which measurements the configured platform provider supports.

use herakles_proc_load_monitor::{Config, ConfigFormat, PlatformReport};

pub fn command_check(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    let provider = config.provider();
    let report = PlatformReport::collect(provider.as_ref());

    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&report)?,
        ConfigFormat::Toml => toml::to_string_pretty(&report)?,
        ConfigFormat::Yaml => serde_yaml::to_string(&report)?,
    };
    println!("{}", content.trim_end());

    if !report.memory_usage_supported {
        eprintln!("Memory usage is not available; memory readings will be -1");
    }
    if !(report.native_process_cpu_load_supported || report.thread_cpu_time_supported) {
        eprintln!("Process CPU load is not available; process load readings will be -1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_with_missing_proc_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            proc_root: Some(dir.path().join("missing")),
            ..Config::default()
        };
        command_check(&config, ConfigFormat::Json).unwrap();
    }
}

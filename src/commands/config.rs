//! Config command implementation.
//!
//! Writes a default configuration file, or prints it for "-".

use std::fs;
use std::path::PathBuf;

use herakles_proc_load_monitor::config::add_config_comments;
use herakles_proc_load_monitor::{Config, ConfigFormat};

/// Generates configuration files
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| {
        let ext = match format {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
        };
        PathBuf::from(format!("herakles-proc-load-monitor.{ext}"))
    });

    let mut content = Config::default().render(format)?;
    if commented && format == ConfigFormat::Yaml {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("Configuration written to: {}", output.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_proc_load_monitor::load_config;

    #[test]
    fn test_written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        for (format, name) in [
            (ConfigFormat::Yaml, "out.yaml"),
            (ConfigFormat::Json, "out.json"),
            (ConfigFormat::Toml, "out.toml"),
        ] {
            let path = dir.path().join(name);
            command_config(Some(path.clone()), format, true).unwrap();
            assert_eq!(load_config(Some(&path)).unwrap(), Config::default());
        }
    }
}

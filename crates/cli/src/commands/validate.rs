//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Debug, Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Debug, Serialize)]
struct ConfigSummary {
    version: String,
    endpoint: Option<String>,
    vehicle_count: usize,
    by_car: bool,
    throttle_ms: u64,
    max_path: usize,
    reconnect: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();

    if !path.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", path.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(path) {
        Ok(blueprint) => {
            let warnings = config_loader::collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    endpoint: blueprint.broker.endpoint().map(str::to_string),
                    vehicle_count: blueprint.vehicles.len(),
                    by_car: blueprint.stream.by_car,
                    throttle_ms: blueprint.stream.throttle_ms,
                    max_path: blueprint.stream.max_path,
                    reconnect: blueprint.broker.reconnect.is_some(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Endpoint: {}",
                summary.endpoint.as_deref().unwrap_or("(unset)")
            );
            println!("  Vehicles: {}", summary.vehicle_count);
            println!("  Per-vehicle topics: {}", summary.by_car);
            println!("  Throttle: {}ms", summary.throttle_ms);
            println!("  Max path: {}", summary.max_path);
            println!("  Reconnect: {}", summary.reconnect);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_with_warning() {
        let file = config_file(r#"vehicles = ["veh-0001"]"#);
        let result = validate_config(file.path());
        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("broker.endpoint")));
        assert_eq!(result.summary.unwrap().vehicle_count, 1);
    }

    #[test]
    fn test_invalid_config() {
        let file = config_file("[stream]\nmax_path = 0\n");
        let result = validate_config(file.path());
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("max_path"));
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(Path::new("/nonexistent/fleet.toml"));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }
}

use anyhow::Result;

use crate::cli::output::OutputOptions;
use crate::core::config::{AppConfig, ConfigError};
use crate::core::providers::ProviderKind;
use crate::core::service::Service;

pub fn init(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    let config = AppConfig::default();
    let path = config.save()?;
    println!("Generated config at {}", path.display());
    let enabled: Vec<_> = config
        .enabled_providers()
        .iter()
        .map(|p| p.id())
        .collect();
    println!("  Enabled providers: {}", enabled.join(", "));
    println!("  Use `aiq config add <provider>` to enable more.");
    Ok(())
}

pub fn add(provider_id: &str, _opts: &OutputOptions) -> Result<()> {
    if ProviderKind::from_id(provider_id).is_none() {
        eprintln!("Unknown provider: {}", provider_id);
        eprintln!(
            "Supported providers: {}",
            ProviderKind::all()
                .iter()
                .map(|p| p.id())
                .collect::<Vec<_>>()
                .join(", ")
        );
        std::process::exit(1);
    }

    let service = Service::new();
    match service.set_provider_enabled(provider_id, true) {
        Ok(()) => {
            println!("Enabled provider: {}", provider_id);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

pub fn remove(provider_id: &str, _opts: &OutputOptions) -> Result<()> {
    let service = Service::new();
    match service.set_provider_enabled(provider_id, false) {
        Ok(()) => {
            println!("Disabled provider: {}", provider_id);
            Ok(())
        }
        Err(e @ ConfigError::LastEnabledProvider(_)) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

pub fn order(ids: &[String], _opts: &OutputOptions) -> Result<()> {
    let service = Service::new();
    match service.set_provider_order(ids) {
        Ok(()) => {
            let config = service.get_config();
            let order: Vec<_> = config.providers.iter().map(|p| p.id.as_str()).collect();
            println!("Provider order: {}", order.join(", "));
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

pub fn interval(minutes: u64, _opts: &OutputOptions) -> Result<()> {
    let service = Service::new();
    match service.set_refresh_interval(minutes) {
        Ok(()) => {
            println!(
                "Refresh interval set to {} minute(s)",
                service.get_config().refresh_interval
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

pub fn check(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `aiq config init` to create one.");
        return Ok(());
    }

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let issues = config.validate();
    if issues.is_empty() {
        println!("Config is valid: {}", path.display());
        let enabled: Vec<_> = config
            .enabled_providers()
            .iter()
            .map(|p| p.id())
            .collect();
        println!("  Enabled providers: {}", enabled.join(", "));
    } else {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        std::process::exit(1);
    }
    Ok(())
}

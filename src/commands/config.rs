use crate::core::config::{get_config_path, Config, URL_ENV_VAR};
use crate::error::Result;
use std::path::PathBuf;

pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Configuration file: {}", get_config_path()?.display());
    println!();
    println!(
        "  source_url:        {}",
        config.source_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  destination:       {}",
        config
            .destination
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  clamp_permissions: {}", config.clamp_permissions);
    println!("  staged_extraction: {}", config.staged_extraction);
    println!("  user_agent:        {}", config.user_agent);
    println!("  timeout_secs:      {}", config.timeout_secs);

    if std::env::var(URL_ENV_VAR).is_ok() {
        println!();
        println!("ℹ️  source_url is overridden by {URL_ENV_VAR}");
    }

    Ok(())
}

// Loaded without the environment override so it never gets persisted.
fn load_stored() -> Result<Config> {
    Config::load_from(&get_config_path()?)
}

pub fn set_url(url: &str) -> Result<()> {
    let mut config = load_stored()?;
    config.set_source_url(url.to_string())?;
    println!("✅ Source URL set to {url}");
    Ok(())
}

pub fn set_destination(destination: &str) -> Result<()> {
    let mut config = load_stored()?;
    config.set_destination(PathBuf::from(destination))?;
    println!("✅ Destination set to {destination}");
    Ok(())
}

use mutuals::config::{default_config_path, MutualsConfig};
use std::path::PathBuf;

/// Write the default config file
pub fn execute(path: Option<PathBuf>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(default_config_path);

    if path.exists() && !force {
        return Err(format!(
            "Config file '{}' already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    MutualsConfig::create_default(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

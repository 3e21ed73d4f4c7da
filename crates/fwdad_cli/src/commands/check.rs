//! Check command implementation
//!
//! Prints the effective configuration after all layers are applied, then
//! enters and exits one level to confirm the session accepts it.

use fwdad_core::config::ForwardAdConfig;
use fwdad_core::{ForwardAdSession, HostEngine};
use tracing::info;

use crate::{CliError, Result};

/// Run the check command
pub fn run(config: &ForwardAdConfig) -> Result<()> {
    let rendered = render(config)?;

    println!("Effective configuration:");
    println!("{}", rendered);

    let mut session = ForwardAdSession::with_config(HostEngine::new(), config.clone())?;
    let level = session.enter_level()?;
    session.exit_level(Some(level))?;
    info!(level = level.index(), "session smoke test passed");

    println!("Session: OK");
    Ok(())
}

fn render(config: &ForwardAdConfig) -> Result<String> {
    toml::to_string_pretty(config)
        .map_err(|e| CliError::InvalidArgument(format!("cannot render configuration: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_round_trips() {
        let config = ForwardAdConfig::new().with_max_depth(7);
        let rendered = render(&config).unwrap();
        assert!(rendered.contains("max_depth = 7"));
        assert_eq!(ForwardAdConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_run_default_config() {
        assert!(run(&ForwardAdConfig::default()).is_ok());
    }
}

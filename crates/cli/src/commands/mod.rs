pub mod agent;
pub mod config_cmd;
pub mod tools;

use proctor_config::AppConfig;
use proctor_providers::OpenAiCompatGenerator;
use std::sync::Arc;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

/// The configured generator. Fails with setup hints when no API key is set.
pub fn generator(config: &AppConfig) -> Result<Arc<OpenAiCompatGenerator>, Box<dyn std::error::Error>> {
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    PROCTOR_API_KEY=sk-...   (generic)");
        eprintln!("    OPENAI_API_KEY=sk-...    (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }
    Ok(Arc::new(OpenAiCompatGenerator::from_config(&config.llm)))
}

//! `proctor config`: Print a starter config or the config file path.

use proctor_config::AppConfig;

pub fn run(path: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path {
        println!("{}", AppConfig::config_dir().join("config.toml").display());
    } else {
        print!("{}", AppConfig::default_toml());
    }
    Ok(())
}

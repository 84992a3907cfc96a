//! `kotoba onboard` — First-time setup.

use kotoba_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Kotoba — First-Time Setup");
    println!("=========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
        println!("\n  Next steps:");
        println!("  1. Edit {} and add your API key", config_path.display());
        println!("     (or set KOTOBA_API_KEY / OPENAI_API_KEY)");
        println!("  2. Run: kotoba chat\n");
    }

    println!("Setup complete. Run `kotoba chat` to start.\n");

    Ok(())
}

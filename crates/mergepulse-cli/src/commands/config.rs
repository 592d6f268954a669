use clap::Subcommand;
use mergepulse_core::config::PulseConfig;
use mergepulse_db::SqliteStore;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Initialize ~/.mergepulse/ with a default config and database
    Init,
    /// Show current configuration
    Show,
    /// Check the configuration for errors
    Validate,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let home = PulseConfig::init()?;
            let db_path = PulseConfig::db_path()?;

            // Opening runs the migrations.
            SqliteStore::open(&db_path)?;

            println!("Initialized mergepulse at {}", home.display());
            println!("  config: {}", PulseConfig::config_path()?.display());
            println!("  database: {}", db_path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = PulseConfig::load()?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{toml_str}");
            Ok(())
        }
        ConfigAction::Validate => {
            let config = PulseConfig::load()?;
            config.validate()?;
            println!(
                "Configuration is valid ({} repositories, timezone {})",
                config.repositories.len(),
                config.timezone
            );
            Ok(())
        }
    }
}

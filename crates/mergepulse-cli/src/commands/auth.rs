use clap::Subcommand;
use mergepulse_auth::{KeyringTokenStore, TokenStore};
use mergepulse_core::config::PulseConfig;

use super::api_host;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store an API token in the OS keychain
    SetToken {
        /// API token (will prompt if not provided)
        #[arg(long)]
        token: Option<String>,
    },
    /// Remove the stored API token
    Clear,
}

pub fn run(action: AuthAction) -> anyhow::Result<()> {
    let config = PulseConfig::load()?;
    let host = api_host(&config);
    let store = KeyringTokenStore::new();

    match action {
        AuthAction::SetToken { token } => {
            let token = match token {
                Some(t) => t.trim().to_string(),
                None => {
                    eprint!("Enter API token for {host}: ");
                    let mut input = String::new();
                    std::io::stdin().read_line(&mut input)?;
                    input.trim().to_string()
                }
            };

            if token.is_empty() {
                anyhow::bail!("Token cannot be empty");
            }

            store.save_token(&host, &token)?;
            println!("Token for {host} stored in OS keychain");
            Ok(())
        }
        AuthAction::Clear => {
            store.clear_token(&host)?;
            println!("Token for {host} removed");
            Ok(())
        }
    }
}

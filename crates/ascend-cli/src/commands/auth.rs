use clap::Subcommand;
use ascend_core::integrations::DiscordClient;

use super::CmdResult;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the Discord bot token in the OS keyring
    SetToken {
        token: String,
    },
    /// Remove the stored bot token
    Clear,
    /// Check whether a bot token is available
    Status,
}

pub fn run(action: AuthAction) -> CmdResult {
    match action {
        AuthAction::SetToken { token } => {
            if token.trim().is_empty() {
                return Err("token must not be empty".into());
            }
            DiscordClient::store_token(token.trim())?;
            println!("Discord bot token stored.");
        }
        AuthAction::Clear => {
            DiscordClient::clear_token()?;
            println!("Discord bot token removed.");
        }
        AuthAction::Status => {
            let from_env = std::env::var("ASCEND_DISCORD_TOKEN").is_ok_and(|t| !t.is_empty());
            let stored = DiscordClient::has_stored_token()?;
            let status = serde_json::json!({
                "discord": {
                    "env": from_env,
                    "keyring": stored,
                    "authenticated": from_env || stored,
                }
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}

use anyhow::Result;

use crate::cli::output::OutputOptions;
use crate::core::providers::{ProviderError, ProviderKind};
use crate::core::service::Service;

pub async fn login(provider_id: &str, api_key: Option<String>, _opts: &OutputOptions) -> Result<()> {
    let service = Service::new();

    match service.login_provider(provider_id, api_key).await {
        Ok(()) => {
            println!("Logged in to {}", provider_id);
        }
        Err(ProviderError::NotAuthenticated) => {
            let hint = match ProviderKind::from_id(provider_id) {
                Some(ProviderKind::Claude) => "run `claude login` in a terminal first",
                Some(ProviderKind::Codex) => "run `codex login` in a terminal first",
                Some(ProviderKind::Openai) => {
                    "sign in to chatgpt.com in a browser, or pass --api-key"
                }
                _ => "pass --api-key with a valid key",
            };
            eprintln!("No credential found for {} — {}.", provider_id, hint);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Login failed: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

pub async fn logout(provider_id: &str, _opts: &OutputOptions) -> Result<()> {
    let service = Service::new();
    match service.logout_provider(provider_id).await {
        Ok(()) => {
            println!("Logged out of {}", provider_id);
            Ok(())
        }
        Err(e) => {
            eprintln!("Logout failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Re-scan for a freshly-created Claude CLI credential.
pub fn reload(_opts: &OutputOptions) -> Result<()> {
    let service = Service::new();
    match service.reload_token() {
        Ok(true) => println!("Claude credential reloaded."),
        Ok(false) => {
            eprintln!("No Claude credential found. Run `claude login` first.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Reload failed: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

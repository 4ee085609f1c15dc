use anyhow::Result;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::models::usage::UsageSnapshot;
use crate::core::providers::{self, ProviderError, ProviderKind};
use crate::core::service::Service;

pub async fn run(provider_filter: Option<String>, opts: &OutputOptions) -> Result<()> {
    let service = Service::new();
    let config = service.get_config();

    // Determine which providers to fetch
    let providers: Vec<ProviderKind> = if let Some(filter) = &provider_filter {
        if filter == "all" {
            config.enabled_providers()
        } else {
            match ProviderKind::from_id(filter) {
                Some(p) => vec![p],
                None => {
                    eprintln!("Unknown provider: '{}'", filter);
                    std::process::exit(1);
                }
            }
        }
    } else {
        config.enabled_providers()
    };

    if providers.is_empty() {
        eprintln!("No providers enabled. Run `aiq config init` to set up providers.");
        return Ok(());
    }

    // Show spinner on stderr (text mode only)
    let spinner = if matches!(opts.format, OutputFormat::Text) {
        Some(tokio::spawn(async {
            let frames = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
            let mut i = 0usize;
            loop {
                eprint!("\r {} Fetching usage data...", frames[i % frames.len()]);
                i = i.wrapping_add(1);
                tokio::time::sleep(std::time::Duration::from_millis(80)).await;
            }
        }))
    } else {
        None
    };

    // Fetch all providers concurrently; one slow provider never delays
    // the others
    let ctx = service.provider_ctx();
    let handles: Vec<_> = providers
        .into_iter()
        .map(|kind| {
            let ctx = ctx.clone();
            tokio::spawn(async move { (kind, providers::fetch_usage(&ctx, kind).await) })
        })
        .collect();

    let mut results: Vec<UsageSnapshot> = Vec::new();
    let mut errors: Vec<(ProviderKind, String)> = Vec::new();
    let mut needs_login: Vec<ProviderKind> = Vec::new();

    for handle in handles {
        let (kind, result) = handle.await?;
        match result {
            Ok(snapshot) => results.push(snapshot),
            Err(ProviderError::NotAuthenticated) => needs_login.push(kind),
            Err(e) => errors.push((kind, e.to_string())),
        }
    }

    // Stop spinner and clear the line
    if let Some(s) = spinner {
        s.abort();
        eprint!("\r\x1b[2K");
    }

    match opts.format {
        OutputFormat::Text => {
            let mut sections: Vec<String> = Vec::new();

            for snapshot in &results {
                sections.push(renderer::render_provider(snapshot, opts.use_color));
            }

            for kind in &needs_login {
                sections.push(format!(
                    " {} (not logged in)\n  Run `aiq login {}` to authenticate.",
                    kind.display_name(),
                    kind.id()
                ));
            }

            for (kind, err) in &errors {
                let header = format!(" {} (error)", kind.display_name());
                let msg = format!("  {}", err);
                if opts.use_color {
                    use colored::Colorize;
                    colored::control::set_override(true);
                    sections.push(format!("{}\n{}", header.bold(), msg.red()));
                } else {
                    sections.push(format!("{}\n{}", header, msg));
                }
            }

            println!("{}", sections.join("\n\n"));
        }
        OutputFormat::Json => {
            let json = if opts.pretty {
                serde_json::to_string_pretty(&results)?
            } else {
                serde_json::to_string(&results)?
            };
            println!("{}", json);

            if opts.verbose {
                for kind in &needs_login {
                    eprintln!("{}: not authenticated", kind.id());
                }
                for (kind, err) in &errors {
                    eprintln!("Error fetching {}: {}", kind.display_name(), err);
                }
            }
        }
    }

    Ok(())
}

mod app;
mod cli;
mod config;
mod controller;
mod error;
mod generator;
mod paths;
mod prompt;
mod provider;
mod system;
mod theme;

#[cfg(feature = "tui")]
mod tui;

use anyhow::Context;
use clap::Parser;
use generator::JobDescriptionGenerator;
use prompt::JobInput;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    #[cfg(feature = "tui")]
    let interactive = matches!(args.cmd, Some(cli::Command::Tui));
    #[cfg(not(feature = "tui"))]
    let interactive = false;

    // The form owns the terminal, so only warnings reach stderr by default.
    let default_filter = if interactive { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_dir = paths::config_dir()?;
    let cfg = config::Config::load_optional(config_dir.join("config.toml"))?;
    tracing::debug!(?config_dir, ?cfg, "resolved config");

    if let Some(cli::Command::Theme { cmd }) = args.cmd {
        return app::cmd_theme(cmd, &mut std::io::stdout());
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let model = app::resolve_model(args.model.clone(), cfg.as_ref());
    let provider_name = app::resolve_provider_name(args.provider.clone(), cfg.as_ref());
    let provider = app::build_provider(&http, cfg.as_ref(), &provider_name)?;
    let generator = JobDescriptionGenerator::new(provider, model);

    let input = JobInput::new(
        args.title.unwrap_or_default(),
        args.skills.unwrap_or_default(),
        args.experience.unwrap_or_default(),
    );

    #[cfg(feature = "tui")]
    if interactive {
        return tui::run_tui(generator, input).await;
    }

    app::cmd_generate(generator, input, &mut std::io::stdout()).await
}

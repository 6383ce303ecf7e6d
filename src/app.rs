use crate::cli::ThemeCommand;
use crate::controller::{Controller, Submitted, Update};
use crate::generator::{JobDescriptionGenerator, DEFAULT_MODEL};
use crate::prompt::JobInput;
use crate::theme::{FilePreferences, ThemeState};
use crate::{config, paths, provider, system};
use anyhow::Context;
use provider::Provider;
use std::io::Write;
use std::sync::Arc;

pub fn build_provider(
    http: &reqwest::Client,
    cfg: Option<&config::Config>,
    provider_name: &str,
) -> anyhow::Result<Arc<dyn Provider + Send + Sync>> {
    match provider_name {
        "google" => {
            #[cfg(feature = "google")]
            {
                let api_key = std::env::var("GEMINI_API_KEY")
                    .ok()
                    .or_else(|| std::env::var("API_KEY").ok())
                    .or_else(|| cfg.and_then(|c| c.google.api_key.clone()))
                    .filter(|k| !k.trim().is_empty())
                    .context("No Gemini API key found. Set GEMINI_API_KEY or google.api_key in config.toml")?;
                let api_base = cfg.and_then(|c| c.google.api_base.as_deref());

                let p = provider::google::GoogleProvider::new(http.clone(), api_key, api_base)?;
                Ok(Arc::new(p))
            }
            #[cfg(not(feature = "google"))]
            {
                let _ = http;
                let _ = cfg;
                anyhow::bail!("google provider is not enabled in this build")
            }
        }
        "stub" => Ok(Arc::new(provider::stub::StubProvider::new())),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}

/// CLI flag, then config, then the built-in default.
pub fn resolve_model(flag: Option<String>, cfg: Option<&config::Config>) -> String {
    flag.or_else(|| cfg.and_then(|c| c.model.clone()))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

pub fn resolve_provider_name(flag: Option<String>, cfg: Option<&config::Config>) -> String {
    flag.or_else(|| cfg.and_then(|c| c.provider.clone()))
        .unwrap_or_else(|| "google".to_string())
}

/// Stream one description to `out` as it arrives.
pub async fn cmd_generate(
    generator: JobDescriptionGenerator,
    input: JobInput,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut controller = Controller::new(generator).with_input(input);

    if controller.submit() == Submitted::Rejected {
        anyhow::bail!(controller.state().error.clone().unwrap_or_default());
    }

    let mut write_err = None;
    controller
        .run_to_end(|update| {
            if let Update::Appended(text) = update {
                if write_err.is_none() {
                    if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
                        write_err = Some(e);
                    }
                }
            }
        })
        .await;
    if let Some(e) = write_err {
        return Err(anyhow::Error::new(e).context("failed to write output"));
    }

    if let Some(err) = &controller.state().error {
        anyhow::bail!(err.clone());
    }
    writeln!(out).ok();
    Ok(())
}

pub fn cmd_theme(cmd: ThemeCommand, out: &mut impl Write) -> anyhow::Result<()> {
    let store = FilePreferences::new(paths::preferences_path()?);
    let system = system::detect_color_scheme();
    let mut theme = ThemeState::load(store, system).context("failed to load theme preference")?;

    match cmd {
        ThemeCommand::Show => {
            writeln!(out, "{} ({})", theme.current(), theme.source())?;
        }
        ThemeCommand::Toggle => {
            let t = theme.toggle()?;
            writeln!(out, "theme set to {t} (saved to {})", theme.store().path().display())?;
        }
        ThemeCommand::Reset => {
            let t = theme.reset(system)?;
            writeln!(out, "theme preference cleared; now {t} ({})", theme.source())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::stub::StubProvider;

    fn stub_generator(stub: StubProvider) -> JobDescriptionGenerator {
        JobDescriptionGenerator::new(Arc::new(stub), "test-model")
    }

    #[tokio::test]
    async fn generate_streams_fragments_to_output() {
        let g = stub_generator(StubProvider::scripted(["# Intro\n", "Hello"]));
        let mut out = Vec::new();
        cmd_generate(g, JobInput::new("a", "b", "c"), &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "# Intro\nHello\n");
    }

    #[tokio::test]
    async fn generate_reports_validation_error() {
        let stub = StubProvider::scripted(["x"]);
        let mut out = Vec::new();
        let err = cmd_generate(stub_generator(stub.clone()), JobInput::new("a", "", "c"), &mut out)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Please fill out all fields.");
        assert!(out.is_empty());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn generate_reports_backend_failure() {
        let g = stub_generator(StubProvider::scripted(["partial"]).failing_after("eof"));
        let mut out = Vec::new();
        let err = cmd_generate(g, JobInput::new("a", "b", "c"), &mut out).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to communicate with the AI model"));
    }

    #[test]
    fn model_and_provider_precedence() {
        let cfg = config::Config {
            model: Some("from-config".into()),
            provider: Some("stub".into()),
            ..Default::default()
        };
        assert_eq!(resolve_model(Some("flag".into()), Some(&cfg)), "flag");
        assert_eq!(resolve_model(None, Some(&cfg)), "from-config");
        assert_eq!(resolve_model(None, None), DEFAULT_MODEL);
        assert_eq!(resolve_provider_name(None, Some(&cfg)), "stub");
        assert_eq!(resolve_provider_name(None, None), "google");
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let http = reqwest::Client::new();
        assert!(build_provider(&http, None, "openai").is_err());
        assert_eq!(build_provider(&http, None, "stub").unwrap().name(), "stub");
    }
}

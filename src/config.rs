use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Default model (optional)
    pub model: Option<String>,

    /// Provider identifier: "google" or "stub".
    pub provider: Option<String>,

    pub google: GoogleConfig,
}

#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GoogleConfig {
    pub api_key: Option<String>,

    /// Override for the Generative Language endpoint, e.g. a local proxy.
    pub api_base: Option<String>,
}

// Keeps the key out of `?cfg` debug logs.
impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_optional(dir.path().join("config.toml")).unwrap().is_none());
    }

    #[test]
    fn parses_google_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "model = \"gemini-2.0-flash\"\n\n[google]\napi_key = \"secret\"\n",
        )
        .unwrap();

        let cfg = Config::load_optional(&path).unwrap().unwrap();
        assert_eq!(cfg.model.as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(cfg.provider, None);
        assert_eq!(cfg.google.api_key.as_deref(), Some("secret"));
        assert!(!format!("{cfg:?}").contains("secret"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = ").unwrap();
        assert!(Config::load_optional(&path).is_err());
    }
}

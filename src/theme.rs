use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => anyhow::bail!("unknown theme: {other:?}"),
        }
    }
}

/// String key/value persistence for user preferences.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
}

/// Preferences kept as a flat JSON object on disk.
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> anyhow::Result<BTreeMap<String, String>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read preferences: {}", self.path.display()))
            }
        };
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse preferences: {}", self.path.display()))
    }

    fn write_all(&self, prefs: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        // Write-then-rename: readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(prefs).context("failed to encode preferences")?;
        std::fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut prefs = self.read_all()?;
        prefs.insert(key.to_string(), value.to_string());
        self.write_all(&prefs)
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        let mut prefs = self.read_all()?;
        if prefs.remove(key).is_some() {
            self.write_all(&prefs)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: BTreeMap<String, String>,
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// Where the active theme came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeSource {
    Explicit,
    System,
    Default,
}

impl fmt::Display for ThemeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThemeSource::Explicit => "explicit choice",
            ThemeSource::System => "system preference",
            ThemeSource::Default => "default",
        })
    }
}

/// Stored choice, then system preference, then the light default.
pub fn resolve(stored: Option<Theme>, system: Option<Theme>) -> (Theme, ThemeSource) {
    match (stored, system) {
        (Some(t), _) => (t, ThemeSource::Explicit),
        (None, Some(t)) => (t, ThemeSource::System),
        (None, None) => (Theme::default(), ThemeSource::Default),
    }
}

/// The active theme plus the store backing explicit choices.
pub struct ThemeState<S> {
    store: S,
    current: Theme,
    source: ThemeSource,
}

impl<S: PreferenceStore> ThemeState<S> {
    pub fn load(store: S, system: Option<Theme>) -> anyhow::Result<Self> {
        let stored = read_stored(&store)?;
        let (current, source) = resolve(stored, system);
        tracing::debug!(%current, %source, "resolved theme");
        Ok(Self { store, current, source })
    }

    pub fn current(&self) -> Theme {
        self.current
    }

    pub fn source(&self) -> ThemeSource {
        self.source
    }

    pub fn palette(&self) -> Palette {
        Palette::for_theme(self.current)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist and apply the opposite of the current theme.
    pub fn toggle(&mut self) -> anyhow::Result<Theme> {
        let next = self.current.toggled();
        self.store
            .set(THEME_KEY, next.as_str())
            .context("failed to save theme preference")?;
        self.current = next;
        self.source = ThemeSource::Explicit;
        tracing::info!(theme = %next, "theme toggled");
        Ok(next)
    }

    /// Follow a system color-scheme change unless the user chose explicitly.
    ///
    /// Returns whether the active theme changed.
    pub fn on_system_change(&mut self, system: Theme) -> anyhow::Result<bool> {
        if read_stored(&self.store)?.is_some() {
            return Ok(false);
        }
        self.source = ThemeSource::System;
        let changed = self.current != system;
        self.current = system;
        Ok(changed)
    }

    /// Forget the explicit choice and fall back to `system`.
    pub fn reset(&mut self, system: Option<Theme>) -> anyhow::Result<Theme> {
        self.store.remove(THEME_KEY).context("failed to clear theme preference")?;
        (self.current, self.source) = resolve(None, system);
        Ok(self.current)
    }
}

fn read_stored(store: &impl PreferenceStore) -> anyhow::Result<Option<Theme>> {
    let Some(raw) = store.get(THEME_KEY)? else {
        return Ok(None);
    };
    match raw.parse() {
        Ok(t) => Ok(Some(t)),
        Err(e) => {
            // Junk counts as no explicit preference.
            tracing::warn!("ignoring stored theme: {e}");
            Ok(None)
        }
    }
}

/// Colors applied at the root of the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub theme: Theme,
    pub background: Rgb,
    pub foreground: Rgb,
    pub muted: Rgb,
    pub accent: Rgb,
    pub border: Rgb,
    pub error_bg: Rgb,
    pub error_fg: Rgb,
    pub success: Rgb,
}

pub type Rgb = (u8, u8, u8);

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self {
                theme,
                background: (249, 250, 251),
                foreground: (17, 24, 39),
                muted: (75, 85, 99),
                accent: (20, 184, 166),
                border: (209, 213, 219),
                error_bg: (254, 226, 226),
                error_fg: (185, 28, 28),
                success: (22, 163, 74),
            },
            Theme::Dark => Self {
                theme,
                background: (17, 24, 39),
                foreground: (229, 231, 235),
                muted: (156, 163, 175),
                accent: (129, 140, 248),
                border: (55, 65, 81),
                error_bg: (127, 29, 29),
                error_fg: (252, 165, 165),
                success: (74, 222, 128),
            },
        }
    }
}

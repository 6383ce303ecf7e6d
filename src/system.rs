//! Probes and side effects that reach outside the process: the desktop color
//! scheme and the clipboard.

use crate::theme::Theme;
use anyhow::{anyhow, Context};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

pub const COLOR_SCHEME_ENV: &str = "JOBGEN_COLOR_SCHEME";

/// Best-effort read of the desktop's light/dark preference.
pub fn detect_color_scheme() -> Option<Theme> {
    if let Some(t) = std::env::var(COLOR_SCHEME_ENV).ok().and_then(|v| v.parse().ok()) {
        return Some(t);
    }
    desktop_color_scheme().or_else(|| {
        std::env::var("COLORFGBG").ok().and_then(|v| parse_colorfgbg(&v))
    })
}

#[cfg(target_os = "macos")]
fn desktop_color_scheme() -> Option<Theme> {
    // Prints "Dark" in dark mode; the key is absent (non-zero exit) in light mode.
    let out = Command::new("defaults")
        .args(["read", "-g", "AppleInterfaceStyle"])
        .stderr(Stdio::null())
        .output()
        .ok()?;
    let dark = out.status.success() && String::from_utf8_lossy(&out.stdout).trim().eq_ignore_ascii_case("dark");
    Some(if dark { Theme::Dark } else { Theme::Light })
}

#[cfg(target_os = "linux")]
fn desktop_color_scheme() -> Option<Theme> {
    let out = Command::new("gsettings")
        .args(["get", "org.gnome.desktop.interface", "color-scheme"])
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    parse_gsettings(&String::from_utf8_lossy(&out.stdout))
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn desktop_color_scheme() -> Option<Theme> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_gsettings(out: &str) -> Option<Theme> {
    match out.trim().trim_matches('\'') {
        "prefer-dark" => Some(Theme::Dark),
        "prefer-light" | "default" => Some(Theme::Light),
        _ => None,
    }
}

/// `COLORFGBG` is "fg;bg" (sometimes "fg;default;bg"); low bg indexes are dark.
fn parse_colorfgbg(v: &str) -> Option<Theme> {
    let bg: u8 = v.rsplit(';').next()?.trim().parse().ok()?;
    Some(if bg < 7 || bg == 8 { Theme::Dark } else { Theme::Light })
}

/// Poll the color scheme and publish changes.
///
/// The receiver starts with the value seen at spawn time.
pub fn watch_color_scheme(every: Duration) -> watch::Receiver<Option<Theme>> {
    let (tx, rx) = watch::channel(detect_color_scheme());
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.tick().await;
        loop {
            tick.tick().await;
            let probed = tokio::task::spawn_blocking(detect_color_scheme).await.ok().flatten();
            let changed = tx.send_if_modified(|cur| {
                if *cur != probed {
                    *cur = probed;
                    true
                } else {
                    false
                }
            });
            if changed {
                tracing::debug!(?probed, "system color scheme changed");
            }
            if tx.is_closed() {
                break;
            }
        }
    });
    rx
}

pub trait Clipboard {
    fn copy(&mut self, text: &str) -> anyhow::Result<()>;
}

/// Pipes text into whichever platform clipboard tool is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

const CLIPBOARD_TOOLS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
    ("clip.exe", &[]),
];

impl Clipboard for SystemClipboard {
    fn copy(&mut self, text: &str) -> anyhow::Result<()> {
        for (program, args) in CLIPBOARD_TOOLS {
            let child = Command::new(program)
                .args(*args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
            let mut child = match child {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(anyhow!(e).context(format!("failed to run {program}"))),
            };

            // stdin is closed at the end of the match so the tool sees EOF.
            let written = match child.stdin.take() {
                Some(mut stdin) => stdin.write_all(text.as_bytes()),
                None => Ok(()),
            };
            let status = child.wait().with_context(|| format!("failed to wait for {program}"))?;
            written.with_context(|| format!("failed to write to {program}"))?;
            if !status.success() {
                anyhow::bail!("{program} exited with {status}");
            }
            tracing::debug!(program, bytes = text.len(), "copied to clipboard");
            return Ok(());
        }
        anyhow::bail!("no clipboard tool found (tried pbcopy, wl-copy, xclip, xsel, clip.exe)")
    }
}

/// Hands each copy to the blocking pool so a slow clipboard tool never
/// stalls the event loop. Outcomes arrive on the receiver from [`BackgroundClipboard::new`].
#[derive(Debug, Clone)]
pub struct BackgroundClipboard<C> {
    inner: C,
    done: mpsc::UnboundedSender<anyhow::Result<()>>,
}

impl<C: Clipboard + Clone + Send + 'static> BackgroundClipboard<C> {
    pub fn new(inner: C) -> (Self, mpsc::UnboundedReceiver<anyhow::Result<()>>) {
        let (done, rx) = mpsc::unbounded_channel();
        (Self { inner, done }, rx)
    }
}

impl<C: Clipboard + Clone + Send + 'static> Clipboard for BackgroundClipboard<C> {
    /// Always succeeds here; a failure is reported later on the receiver.
    fn copy(&mut self, text: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.clone();
        let text = text.to_string();
        let done = self.done.clone();
        tokio::task::spawn_blocking(move || {
            let _ = done.send(inner.copy(&text));
        });
        Ok(())
    }
}

pub const COPY_FEEDBACK: Duration = Duration::from_secs(2);

/// The "Copied!" indicator, shown for [`COPY_FEEDBACK`] after a copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyFeedback {
    copied_at: Option<Instant>,
}

impl CopyFeedback {
    /// Copy `text` and start the indicator on success.
    pub fn copy(&mut self, clipboard: &mut impl Clipboard, text: &str, now: Instant) -> anyhow::Result<()> {
        clipboard.copy(text)?;
        self.copied_at = Some(now);
        Ok(())
    }

    /// Withdraw the indicator, e.g. when a background copy fails.
    pub fn clear(&mut self) {
        self.copied_at = None;
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.copied_at
            .is_some_and(|at| now.saturating_duration_since(at) < COPY_FEEDBACK)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Remembers every copy instead of touching the real clipboard.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingClipboard {
        pub copies: Vec<String>,
    }

    impl Clipboard for RecordingClipboard {
        fn copy(&mut self, text: &str) -> anyhow::Result<()> {
            self.copies.push(text.to_string());
            Ok(())
        }
    }

    #[derive(Clone)]
    struct BrokenClipboard;

    impl Clipboard for BrokenClipboard {
        fn copy(&mut self, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("no display")
        }
    }

    #[test]
    fn copy_writes_text_and_indicator_expires_after_two_seconds() {
        let mut clip = RecordingClipboard::default();
        let mut fb = CopyFeedback::default();
        let t0 = Instant::now();
        assert!(!fb.is_active(t0));

        fb.copy(&mut clip, "Hello", t0).unwrap();
        assert_eq!(clip.copies, vec!["Hello".to_string()]);
        assert!(fb.is_active(t0));
        assert!(fb.is_active(t0 + Duration::from_millis(1999)));
        assert!(!fb.is_active(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn failed_copy_shows_no_confirmation() {
        let mut fb = CopyFeedback::default();
        let now = Instant::now();
        assert!(fb.copy(&mut BrokenClipboard, "Hello", now).is_err());
        assert!(!fb.is_active(now));
    }

    /// Clonable recorder, as the background clipboard copies its inner one per call.
    #[derive(Clone, Default)]
    struct SharedClipboard(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

    impl Clipboard for SharedClipboard {
        fn copy(&mut self, text: &str) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn background_copy_runs_off_the_caller_and_reports_back() {
        let shared = SharedClipboard::default();
        let (mut clip, mut done) = BackgroundClipboard::new(shared.clone());

        clip.copy("Hello").unwrap();
        done.recv().await.unwrap().unwrap();
        assert_eq!(*shared.0.lock().unwrap(), vec!["Hello".to_string()]);
    }

    #[tokio::test]
    async fn background_copy_failure_arrives_on_the_receiver() {
        let (mut clip, mut done) = BackgroundClipboard::new(BrokenClipboard);
        let mut fb = CopyFeedback::default();
        let now = Instant::now();

        fb.copy(&mut clip, "Hello", now).unwrap();
        assert!(fb.is_active(now));

        let err = done.recv().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("no display"));
        fb.clear();
        assert!(!fb.is_active(now));
    }

    #[test]
    fn parses_desktop_signals() {
        assert_eq!(parse_gsettings("'prefer-dark'\n"), Some(Theme::Dark));
        assert_eq!(parse_gsettings("'default'"), Some(Theme::Light));
        assert_eq!(parse_gsettings("''"), None);

        assert_eq!(parse_colorfgbg("15;0"), Some(Theme::Dark));
        assert_eq!(parse_colorfgbg("0;default;15"), Some(Theme::Light));
        assert_eq!(parse_colorfgbg("garbage"), None);
    }
}

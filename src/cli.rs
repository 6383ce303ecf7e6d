use clap::{Parser, Subcommand};

/// Generate job descriptions with Gemini
#[derive(Debug, Parser)]
#[command(name = "jobgen")]
#[command(version)]
#[command(about = "Smart job description generator", long_about = None)]
pub struct Args {
    /// Model name
    #[arg(short = 'm', long = "model", global = true)]
    pub model: Option<String>,

    /// Provider (default: config/provider or "google")
    #[arg(long = "provider", global = true)]
    pub provider: Option<String>,

    /// Job title, e.g. "Senior Frontend Engineer"
    #[arg(short = 't', long = "title")]
    pub title: Option<String>,

    /// Key skills and technologies, e.g. "React, TypeScript"
    #[arg(short = 's', long = "skills")]
    pub skills: Option<String>,

    /// Required experience, e.g. "5+ years"
    #[arg(short = 'e', long = "experience")]
    pub experience: Option<String>,

    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the interactive form
    #[cfg(feature = "tui")]
    Tui,

    /// Inspect or change the light/dark theme preference
    Theme {
        #[command(subcommand)]
        cmd: ThemeCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ThemeCommand {
    /// Print the active theme and where it came from
    Show,
    /// Switch to the other theme and remember the choice
    Toggle,
    /// Forget the saved choice and follow the system again
    Reset,
}

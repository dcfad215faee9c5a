//! inkpost - checks and renders a directory of dated Markdown posts.

mod build;
mod check;
mod cli;
mod config;
mod content;
mod generator;
mod logger;
mod new;
mod render;
mod utils;

use anyhow::Result;
use build::build_site;
use check::run_check;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use new::new_post;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SiteConfig::load(&cli)?;

    match &cli.command {
        Commands::Check {
            json,
            deny_warnings,
            ..
        } => run_check(&config, *json, *deny_warnings),
        Commands::Build { clean, .. } => {
            let summary = build_site(&config, *clean)?;
            log!(
                "build";
                "done: {} pages, {} assets{}",
                summary.pages,
                summary.assets,
                summary.feed.map(|_| ", feed").unwrap_or_default()
            );
            Ok(())
        }
        Commands::New {
            title,
            date,
            layout,
        } => new_post(&config, title, date.as_deref(), layout).map(|_| ()),
    }
}

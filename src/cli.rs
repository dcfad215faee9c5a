//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// inkpost: check and render dated markdown posts
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name, relative to root
    #[arg(short = 'C', long, default_value = "inkpost.toml")]
    pub config: PathBuf,

    /// Output directory path (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Rendering switches shared by `check` and `build`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RenderArgs {
    /// Fail on unresolved link labels, variables and includes
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub strict: Option<bool>,

    /// Minify the html output
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub minify: Option<bool>,

    /// Include posts with `published: false`
    #[arg(long)]
    pub drafts: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Check every post for authoring errors
    Check {
        #[command(flatten)]
        render_args: RenderArgs,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,

        /// Treat warnings as errors
        #[arg(long)]
        deny_warnings: bool,
    },

    /// Render every post into the output directory
    Build {
        #[command(flatten)]
        render_args: RenderArgs,

        /// Remove the output directory before building
        #[arg(long)]
        clean: bool,
    },

    /// Create a new post file with front matter
    New {
        /// Post title
        title: String,

        /// Publish date as YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Layout name written into the front matter
        #[arg(short, long, default_value = "post")]
        layout: String,
    },
}

impl Cli {
    pub fn render_args(&self) -> Option<&RenderArgs> {
        match &self.command {
            Commands::Check { render_args, .. } | Commands::Build { render_args, .. } => {
                Some(render_args)
            }
            Commands::New { .. } => None,
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use inliner_engine::{ResolverSettings, RewriteOptions, TransformSettings, DEFAULT_MAX_DIMENSION};
use log::LevelFilter;
use url::Url;

/// Turn a saved web page into one self-contained HTML file with inlined, downsized images.
#[derive(Debug, Parser)]
#[command(name = "inliner", version, about)]
pub struct Cli {
    /// `.html` or `.webarchive` file. Quotes and shell escapes from drag-and-drop are accepted.
    pub input: String,

    /// Drop every image instead of inlining it.
    #[arg(long)]
    pub no_images: bool,

    /// Largest width or height of an inlined image, in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_DIMENSION, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_dimension: u32,

    /// Per-image request timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Proxy for image requests. Defaults to the HTTPS_PROXY / HTTP_PROXY environment.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Resolve relative image references against this URL instead of the page's own.
    #[arg(long)]
    pub base_url: Option<Url>,

    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Also write the log to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    pub fn transform_settings(&self) -> TransformSettings {
        TransformSettings {
            max_dimension: self.max_dimension,
            ..TransformSettings::default()
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            request_timeout: Duration::from_secs(self.timeout_secs),
            proxy: self.proxy.clone(),
            ..ResolverSettings::default()
        }
    }

    pub fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            include_images: !self.no_images,
        }
    }
}

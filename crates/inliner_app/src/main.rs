mod cli;
mod input;

use anyhow::{Context, Result};
use clap::Parser;
use engine_logging::engine_info;
use inliner_engine::{
    build_html_document, output_filename, rewrite_article, ArchiveImageResolver, AtomicFileWriter,
    Extractor, ImageResolver, ImageTransformer, NetworkImageResolver, ReadabilityLikeExtractor,
};

use crate::cli::Cli;
use crate::input::load_input;

// The rewrite future holds the parsed document, which is not `Send`.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.log_file.as_deref() {
        Some(path) => engine_logging::init_file(path, cli.log_level())
            .with_context(|| format!("failed to create log file {}", path.display()))?,
        None => {
            engine_logging::init_terminal(cli.log_level());
        }
    }

    let loaded = load_input(&cli.input)?;
    let base_url = cli.base_url.clone().or(loaded.base_url);

    let transformer = ImageTransformer::new(cli.transform_settings());
    let network = NetworkImageResolver::new(cli.resolver_settings(), transformer)
        .context("failed to build http client")?;
    let resolver: Box<dyn ImageResolver> = match loaded.resources {
        Some(table) => {
            Box::new(ArchiveImageResolver::new(table, transformer).with_fallback(network))
        }
        None => Box::new(network),
    };

    let extracted = ReadabilityLikeExtractor.extract(&loaded.html);
    let rewritten = rewrite_article(
        &extracted.content_html,
        base_url.as_ref(),
        resolver.as_ref(),
        cli.rewrite_options(),
    )
    .await
    .context("failed to rewrite article")?;

    let document = build_html_document(
        extracted.title.as_deref(),
        extracted.byline.as_deref(),
        &rewritten.html,
    );
    let filename = output_filename(
        extracted.title.as_deref(),
        &loaded.path.to_string_lossy(),
    );
    let written = AtomicFileWriter::new(cli.output_dir.clone())
        .write(&filename, &document)
        .context("failed to write output")?;

    engine_info!(
        "saved {} ({} images inlined)",
        written.display(),
        rewritten.images_inlined
    );
    println!("{}", written.display());
    Ok(())
}

//! Inliner engine: image resolution, inlining and article rewriting.
mod archive;
mod candidates;
mod decode;
mod document;
mod extract;
mod filename;
mod persist;
mod resolve;
mod rewrite;
mod serialize;
mod settings;
mod transform;
mod types;

pub use archive::{decode_webarchive, ArchiveError, ArchiveResource, ResourceTable, WebArchive};
pub use candidates::{best_srcset_candidate, data_attrs_candidate, parse_srcset, ImageCandidate};
pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use document::build_html_document;
pub use extract::{ExtractedContent, Extractor, ReadabilityLikeExtractor};
pub use filename::output_filename;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use resolve::{
    decode_data_uri, is_data_uri, ArchiveImageResolver, ImageResolver, NetworkImageResolver,
    ResolveError,
};
pub use rewrite::{rewrite_article, ArticleRewriter, RewriteError, RewriteOutput, PROCESSED_MARKER};
pub use settings::{
    ResolverSettings, RewriteOptions, TransformSettings, DEFAULT_JPEG_QUALITY,
    DEFAULT_MAX_DIMENSION,
};
pub use transform::{transform, ImageTransformer, InlineImage, OutputFormat, TransformError};
pub use types::{FailureKind, FetchError, FetchedImage};

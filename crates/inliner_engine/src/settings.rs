use std::time::Duration;

pub const DEFAULT_MAX_DIMENSION: u32 = 300;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (compatible; inliner/0.1)";
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

/// Bounds applied when re-encoding an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformSettings {
    /// Neither output dimension exceeds this many pixels.
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// HTTP behaviour of the network resolver.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
    pub accept: String,
    /// Explicit proxy URL. `None` lets the client pick up `HTTPS_PROXY` /
    /// `HTTP_PROXY` from the environment.
    pub proxy: Option<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 20 * 1024 * 1024,
            user_agent: BROWSER_USER_AGENT.to_string(),
            accept: IMAGE_ACCEPT.to_string(),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOptions {
    /// When false every image-bearing element is dropped without resolving.
    pub include_images: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            include_images: true,
        }
    }
}

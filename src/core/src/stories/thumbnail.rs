/// Best-effort thumbnail extraction for video stories.
///
/// Implementations live outside the engine (a media worker, a CDN
/// transform). Failures never block story creation.
pub trait Thumbnailer: Send + Sync + 'static {
    fn thumbnail_for(&self, video_url: &str) -> Result<String, String>;
}

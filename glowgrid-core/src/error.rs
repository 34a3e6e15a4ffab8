/// Error categories for the rasterizer.
///
/// Every error carries a human-readable message. Errors are returned, not
/// used for control flow; `Warning` is non-fatal and the operation that
/// raised it has already produced its (empty or degraded) result.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A caller-supplied argument is unusable (mismatched cache
    /// dimensions, zero-sized tiles, unprepared atlas).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A texture or buffer allocation failed.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// A wrapped failure from the underlying graphics API.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Non-fatal; the operation proceeded with a degraded result.
    #[error("Warning: {0}")]
    Warning(String),
}

impl From<glowgrid_data::TilesetError> for Error {
    fn from(err: glowgrid_data::TilesetError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl Error {
    /// Returns true for non-fatal results.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }

    pub(crate) fn cache_size_mismatch() -> Self {
        Self::InvalidArgument("Cache dimensions must match the surface".to_string())
    }

    pub(crate) fn zero_tile_size() -> Self {
        Self::InvalidArgument("Tileset tile dimensions must be non-zero".to_string())
    }

    pub(crate) fn atlas_not_prepared() -> Self {
        Self::InvalidArgument("Atlas has no texture; prepare it before rendering".to_string())
    }

    pub(crate) fn texture_allocation_failed(detail: &str) -> Self {
        Self::OutOfMemory(format!("Failed to allocate texture: {detail}"))
    }

    pub(crate) fn unknown_texture() -> Self {
        Self::InvalidArgument("Unknown texture handle".to_string())
    }

    pub(crate) fn nothing_rendered() -> Self {
        Self::Warning("Nothing to save before the first frame".to_string())
    }

    pub(crate) fn snapshot_failed(detail: impl std::fmt::Display) -> Self {
        Self::Backend(format!("Failed to encode snapshot: {detail}"))
    }
}

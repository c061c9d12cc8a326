//! Film Interface

/// The sample accumulation statistics exposed by the image buffer. The
/// buffer itself, pixel filtering and AOVs live outside this crate.
pub trait Film: Send + Sync {
    /// Returns the total number of samples accumulated so far.
    fn total_sample_count(&self) -> f64;

    /// Returns the number of pixels in the image.
    fn pixel_count(&self) -> usize;

    /// Returns the renderable film region as `[x_min, x_max, y_min, y_max]`,
    /// bounds inclusive.
    fn sub_region(&self) -> [u32; 4];
}

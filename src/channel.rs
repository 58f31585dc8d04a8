//! Reduction of a decoded drawing to the single channel the dataset stores.
//!
//! Strokes on the drawing canvas are opaque and the background transparent,
//! so for images with transparency the alpha channel carries the drawing.

use image::DynamicImage;
use ndarray::Array2;

/// The image has no alpha channel and more than one color channel,
/// so there is no single channel to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedLayout
{
    pub channels: u8,
}

/// Index of the channel that is kept for an image with `channels` channels.
pub fn designated_channel(channels: u8) -> Option<usize>
{
    match channels
    {
        // Grayscale is used as is.
        1 => Some(0),
        // Luma + alpha.
        2 => Some(1),
        // RGBA.
        4 => Some(3),
        _ => None,
    }
}

/// Extracts the designated channel as a (height, width) array of bytes.
pub fn intensity_channel(image: &DynamicImage) -> Result<Array2<u8>, UnsupportedLayout>
{
    let channels = image.color().channel_count();
    let index = designated_channel(channels).ok_or(UnsupportedLayout { channels })?;

    let width = image.width() as usize;
    let height = image.height() as usize;
    let raw = match channels
    {
        1 => image.to_luma8().into_raw(),
        2 => image.to_luma_alpha8().into_raw(),
        _ => image.to_rgba8().into_raw(),
    };
    let stride = channels as usize;

    Ok(Array2::from_shape_fn((height, width), |(y, x)| raw[(y * width + x) * stride + index]))
}

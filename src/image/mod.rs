//! Image manipulation.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA image.
//! - [`ImageView`] and [`ImageViewMut`], borrowed rectangular views into an underlying [`Image`].
//! - The [`AsImageView`] and [`AsImageViewMut`] traits to abstract over images and views.
//! - The [`draw`] module with primitives for visualizing detections.
//! - [`Rect`], [`Resolution`] and [`AspectRatio`] value types.

pub mod draw;

mod rect;
mod resolution;

use std::{env, fmt, ops::Index};

use ::image::{ImageBuffer, Rgba, RgbaImage};
use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use once_cell::sync::Lazy;

pub use rect::Rect;
pub use resolution::{AspectRatio, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JpegBackend {
    Mozjpeg,
    Image,
}

const ENV_VAR_JPEG_BACKEND: &str = "HEADCOUNT_JPEG_BACKEND";

static JPEG_BACKEND: Lazy<JpegBackend> = Lazy::new(|| {
    let backend = match env::var(ENV_VAR_JPEG_BACKEND).as_deref() {
        Ok("mozjpeg") | Err(_) => JpegBackend::Mozjpeg,
        Ok("image") => JpegBackend::Image,
        Ok(other) => {
            log::warn!(
                "unknown value '{}' in `{}`, using default JPEG backend",
                other,
                ENV_VAR_JPEG_BACKEND,
            );
            JpegBackend::Mozjpeg
        }
    };
    log::debug!("using JPEG decode backend: {:?}", backend);
    backend
});

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    // Internal representation is RGBA8 so that frames can be uploaded to the GPU without
    // conversion.
    buf: RgbaImage,
}

impl Image {
    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = match *JPEG_BACKEND {
            JpegBackend::Mozjpeg => {
                let decompressor = mozjpeg::Decompress::new_mem(data)?;
                let mut decomp = decompressor.rgba()?;
                let buf = decomp.read_scanlines_flat().unwrap();
                ImageBuffer::from_raw(decomp.width() as u32, decomp.height() as u32, buf)
                    .expect("failed to create ImageBuffer")
            }
            JpegBackend::Image => {
                ::image::load_from_memory_with_format(data, ::image::ImageFormat::Jpeg)?.to_rgba8()
            }
        };

        Ok(Self { buf })
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns a [`Rect`] covering this image.
    ///
    /// The rectangle will be positioned at `(0, 0)` and have the width and height of the image.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    /// Creates an immutable view into an area of this image, specified by `rect`.
    ///
    /// If `rect` lies partially outside of `self`, the pixels that are outside of `self` will have
    /// the value [`Color::NULL`] and ignore writes. The returned view always has the size of
    /// `rect`.
    pub fn view(&self, rect: Rect) -> ImageView<'_> {
        ImageView {
            image: self,
            data: ViewData::full(self).view(rect),
        }
    }

    /// Creates a mutable view into an area of this image, specified by `rect`.
    ///
    /// If `rect` lies partially outside of `self`, the pixels that are outside of `self` will have
    /// the value [`Color::NULL`] and ignore writes. The returned view always has the size of
    /// `rect`.
    pub fn view_mut(&mut self, rect: Rect) -> ImageViewMut<'_> {
        ImageViewMut {
            data: ViewData::full(self).view(rect),
            image: self,
        }
    }

    /// Returns the raw RGBA pixel data, row-major without gaps.
    #[inline]
    pub(crate) fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// Offset and size of a view, in the root image's coordinates.
///
/// Views only window the coordinate space; they do not clamp accesses to their own size. Reads
/// that fall outside the root image yield [`Color::NULL`], writes there are dropped.
#[derive(Debug, Clone, Copy)]
struct ViewData {
    x0: i64,
    y0: i64,
    width: u32,
    height: u32,
}

impl ViewData {
    fn full(image: &Image) -> Self {
        Self {
            x0: 0,
            y0: 0,
            width: image.width(),
            height: image.height(),
        }
    }

    fn view(&self, rect: Rect) -> Self {
        Self {
            x0: self.x0 + rect.x().round() as i64,
            y0: self.y0 + rect.y().round() as i64,
            width: rect.width().round() as u32,
            height: rect.height().round() as u32,
        }
    }

    fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width as f32, self.height as f32)
    }

    fn image_coord(&self, x: u32, y: u32, image: &Image) -> Option<(u32, u32)> {
        let x = self.x0 + i64::from(x);
        let y = self.y0 + i64::from(y);
        if x < 0 || y < 0 || x >= i64::from(image.width()) || y >= i64::from(image.height()) {
            return None;
        }
        Some((x as u32, y as u32))
    }

    fn get(&self, x: u32, y: u32, image: &Image) -> Color {
        match self.image_coord(x, y, image) {
            Some((x, y)) => Color(image.buf[(x, y)].0),
            None => Color::NULL,
        }
    }
}

/// An immutable view of a rectangular section of an [`Image`].
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    image: &'a Image,
    data: ViewData,
}

impl<'a> ImageView<'a> {
    /// Returns the width of this view, in pixels.
    pub fn width(&self) -> u32 {
        self.data.width
    }

    /// Returns the height of this view, in pixels.
    pub fn height(&self) -> u32 {
        self.data.height
    }

    /// Returns the size of this view.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns a [`Rect`] of the size of this view.
    ///
    /// The rectangle will be positioned at `(0, 0)` and have the width and height of the view.
    #[inline]
    pub fn rect(&self) -> Rect {
        self.data.rect()
    }

    /// Gets the image color at the given view coordinates.
    ///
    /// Coordinates that fall outside of the underlying [`Image`] read as [`Color::NULL`].
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.data.get(x, y, self.image)
    }

    /// Creates an immutable subview into an area of this view, specified by `rect`.
    pub fn view(&self, rect: Rect) -> ImageView<'_> {
        ImageView {
            image: self.image,
            data: self.data.view(rect),
        }
    }
}

impl fmt::Debug for ImageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ImageView", self.width(), self.height())
    }
}

/// A mutable view of a rectangular section of an [`Image`].
pub struct ImageViewMut<'a> {
    image: &'a mut Image,
    data: ViewData,
}

impl<'a> ImageViewMut<'a> {
    /// Returns the width of this view, in pixels.
    pub fn width(&self) -> u32 {
        self.data.width
    }

    /// Returns the height of this view, in pixels.
    pub fn height(&self) -> u32 {
        self.data.height
    }

    /// Returns the size of this view.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the image color at the given view coordinates.
    ///
    /// Coordinates that fall outside of the underlying [`Image`] read as [`Color::NULL`].
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.data.get(x, y, self.image)
    }

    /// Sets the image color at the given view coordinates.
    ///
    /// Writes to coordinates outside of the underlying [`Image`] are ignored.
    #[inline]
    pub(crate) fn set(&mut self, x: u32, y: u32, color: Color) {
        if let Some((x, y)) = self.data.image_coord(x, y, self.image) {
            self.image.buf[(x, y)] = Rgba(color.0);
        }
    }

    /// Borrows an identical [`ImageViewMut`] from `self` that may have a shorter lifetime.
    ///
    /// This is equivalent to the implicit "reborrowing" that happens on Rust references. It needs
    /// to be a method call here because user-defined types cannot opt into making this happen
    /// automatically.
    pub fn reborrow(&mut self) -> ImageViewMut<'_> {
        ImageViewMut {
            image: self.image,
            data: self.data,
        }
    }
}

impl fmt::Debug for ImageViewMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ImageViewMut", self.width(), self.height())
    }
}

/// An 8-bit RGBA color.
///
/// Colors are always in the sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

/// Trait for types that can be treated as read-only views of image data.
///
/// This allows abstracting over [`Image`] and [`ImageView`] and should be used by any code that
/// takes immutable image data as input.
pub trait AsImageView {
    /// Returns an [`ImageView`] covering `self`.
    fn as_view(&self) -> ImageView<'_>;
}

/// Trait for types that can be treated as mutable views of image data.
///
/// This allows abstracting over [`Image`] and [`ImageViewMut`] and should be used by any code that
/// writes to image data.
pub trait AsImageViewMut: AsImageView {
    /// Returns an [`ImageViewMut`] covering `self`.
    fn as_view_mut(&mut self) -> ImageViewMut<'_>;
}

impl AsImageView for Image {
    fn as_view(&self) -> ImageView<'_> {
        self.view(self.rect())
    }
}

impl AsImageViewMut for Image {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        self.view_mut(self.rect())
    }
}

impl<'a> AsImageView for ImageView<'a> {
    fn as_view(&self) -> ImageView<'_> {
        *self
    }
}

impl<'a> AsImageView for ImageViewMut<'a> {
    fn as_view(&self) -> ImageView<'_> {
        ImageView {
            image: self.image,
            data: self.data,
        }
    }
}

impl<'a> AsImageViewMut for ImageViewMut<'a> {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        self.reborrow()
    }
}

impl<'a, V: AsImageView> AsImageView for &'a V {
    fn as_view(&self) -> ImageView<'_> {
        (*self).as_view()
    }
}

impl<'a, V: AsImageView> AsImageView for &'a mut V {
    fn as_view(&self) -> ImageView<'_> {
        (**self).as_view()
    }
}

impl<'a, V: AsImageViewMut> AsImageViewMut for &'a mut V {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        (*self).as_view_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard() -> Image {
        // 2x2: white in the top-left and bottom-right corners.
        let mut image = Image::new(2, 2);
        image.as_view_mut().set(0, 0, Color::WHITE);
        image.as_view_mut().set(1, 1, Color::WHITE);
        image
    }

    #[test]
    fn view_windows_coordinates() {
        let image = checkerboard();
        let view = image.view(Rect::from_top_left(1.0, 0.0, 1.0, 2.0));
        assert_eq!(view.width(), 1);
        assert_eq!(view.height(), 2);
        assert_eq!(view.get(0, 0), Color::NULL);
        assert_eq!(view.get(0, 1), Color::WHITE);

        // Subview of a view adds offsets.
        let sub = view.view(Rect::from_top_left(0.0, 1.0, 1.0, 1.0));
        assert_eq!(sub.get(0, 0), Color::WHITE);
    }

    #[test]
    fn view_out_of_bounds() {
        let image = checkerboard();
        let view = image.view(Rect::from_top_left(-1.0, -1.0, 4.0, 4.0));
        assert_eq!(view.get(0, 0), Color::NULL);
        assert_eq!(view.get(1, 1), Color::WHITE);
        assert_eq!(view.get(3, 3), Color::NULL);
    }

    #[test]
    fn oob_writes_ignored() {
        let mut image = checkerboard();
        let mut view = image.view_mut(Rect::from_top_left(-10.0, -10.0, 5.0, 5.0));
        view.set(0, 0, Color::RED);
        assert_eq!(image.view(image.rect()).get(0, 0), Color::WHITE);
    }
}

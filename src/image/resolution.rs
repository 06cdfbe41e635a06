//! Types for representing image resolutions.

use std::fmt;

/// Resolution (`width x height`) of an image, window, or camera frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// Creates a new [`Resolution`] of `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the total number of pixels in an image of this resolution.
    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Computes the [`AspectRatio`] of this [`Resolution`].
    ///
    /// If `self` has a width or height of 0, `None` is returned.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Ratio of a width to a height, reduced to its smallest terms.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct AspectRatio {
    // Invariant: `width` and `height` are nonzero and their GCD is 1.
    width: u32,
    height: u32,
}

impl AspectRatio {
    /// Creates the aspect ratio representing `width:height`.
    ///
    /// If either `width` or `height` is `0`, returns `None`.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let gcd = gcd(width, height);
        Some(Self {
            width: width / gcd,
            height: height / gcd,
        })
    }

    /// Returns the `f32` corresponding to this ratio.
    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl fmt::Debug for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_are_reduced() {
        let ratio = Resolution::new(1920, 1080).aspect_ratio().unwrap();
        assert_eq!(ratio.to_string(), "16:9");
        assert_eq!(ratio, Resolution::new(1280, 720).aspect_ratio().unwrap());
        assert_eq!(ratio, AspectRatio::new(16, 9).unwrap());

        // Coprime dimensions stay as they are.
        assert_eq!(AspectRatio::new(7, 13).unwrap().to_string(), "7:13");
    }

    #[test]
    fn degenerate_resolutions_have_no_ratio() {
        assert_eq!(Resolution::new(0, 7).aspect_ratio(), None);
        assert_eq!(Resolution::new(7, 0).aspect_ratio(), None);
        assert_eq!(Resolution::new(0, 0).aspect_ratio(), None);
    }

    #[test]
    fn ratio_as_f32() {
        assert_eq!(AspectRatio::new(1, 1).unwrap().as_f32(), 1.0);
        assert_eq!(AspectRatio::new(640, 320).unwrap().as_f32(), 2.0);
        assert_eq!(AspectRatio::new(320, 640).unwrap().as_f32(), 0.5);
    }

    #[test]
    fn pixel_count() {
        assert_eq!(Resolution::new(1920, 1080).num_pixels(), 2_073_600);
        assert_eq!(Resolution::new(0, 1080).num_pixels(), 0);
    }
}

//! Axis-aligned rectangles.
//!
//! These are used for image views, detection bounding boxes and letterboxing. Nothing in this
//! pipeline produces rotated boxes, so only axis-aligned rectangles exist.

use std::fmt;

use super::resolution::AspectRatio;

/// An axis-aligned rectangle, stored as its top-left corner and size.
///
/// Rectangles are allowed to have zero height and/or width. Negative dimensions are not allowed.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl Rect {
    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub fn from_top_left(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            w: width,
            h: height,
        }
    }

    /// Creates a rectangle extending outwards from a center point.
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            x: x_center - width / 2.0,
            y: y_center - height / 2.0,
            w: width,
            h: height,
        }
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> f32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.w
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.h
    }

    /// Returns the rectangle's center point.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Returns the area covered by `self`.
    #[inline]
    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Scales width and height by `factor`, keeping the center point fixed.
    #[must_use]
    pub fn scale(&self, factor: f32) -> Self {
        let (xc, yc) = self.center();
        Self::from_center(xc, yc, self.w * factor, self.h * factor)
    }

    /// Moves this rectangle by the given offset.
    #[must_use]
    pub fn move_by(&self, x: f32, y: f32) -> Self {
        Self {
            x: self.x + x,
            y: self.y + y,
            ..*self
        }
    }

    /// Symmetrically extends one dimension of `self` so that the resulting rectangle has the given
    /// aspect ratio.
    ///
    /// The resulting rectangle always contains all of `self`. This is what letterboxes a camera
    /// frame for a detector with a different input aspect ratio.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, target_aspect: AspectRatio) -> Self {
        let ratio = target_aspect.as_f32();
        let (xc, yc) = self.center();
        if self.h * ratio >= self.w {
            Self::from_center(xc, yc, self.h * ratio, self.h)
        } else {
            Self::from_center(xc, yc, self.w, self.w / ratio)
        }
    }

    fn intersection_area(&self, other: &Self) -> f32 {
        let w = (self.x + self.w).min(other.x + other.w) - self.x.max(other.x);
        let h = (self.y + self.h).min(other.y + other.h) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Computes the Intersection over Union (IOU) of `self` and `other`.
    pub fn iou(&self, other: &Self) -> f32 {
        let shared = self.intersection_area(other);
        shared / (self.area() + other.area() - shared)
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rect({},{}; {}x{})", self.x, self.y, self.w, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_and_center_agree() {
        let rect = Rect::from_center(3.0, 4.0, 2.0, 6.0);
        assert_eq!(rect, Rect::from_top_left(2.0, 1.0, 2.0, 6.0));
        assert_eq!(rect.center(), (3.0, 4.0));
        assert_eq!((rect.x(), rect.y()), (2.0, 1.0));
        assert_eq!(rect.area(), 12.0);
    }

    #[test]
    fn scale_and_move() {
        let rect = Rect::from_center(10.0, 20.0, 4.0, 8.0).scale(0.5);
        assert_eq!(rect, Rect::from_center(10.0, 20.0, 2.0, 4.0));

        let rect = rect.move_by(-10.0, 5.0);
        assert_eq!(rect.center(), (0.0, 25.0));
        assert_eq!((rect.width(), rect.height()), (2.0, 4.0));
    }

    #[test]
    fn iou_of_overlapping_rects() {
        // Half-overlapping unit squares.
        let a = Rect::from_top_left(0.0, 0.0, 1.0, 1.0);
        let b = Rect::from_top_left(0.5, 0.0, 1.0, 1.0);
        assert_eq!(a.iou(&b), 0.5 / 1.5);
        assert_eq!(b.iou(&a), 0.5 / 1.5);

        // A rectangle contained in another.
        let outer = Rect::from_center(9.0, 9.0, 2.0, 2.0);
        let inner = Rect::from_center(9.0, 9.0, 1.0, 1.0);
        assert_eq!(outer.iou(&inner), 1.0 / 4.0);

        // Identical rectangles.
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn iou_of_disjoint_rects() {
        let a = Rect::from_top_left(0.0, 0.0, 1.0, 1.0);
        let b = Rect::from_top_left(5.0, 5.0, 1.0, 1.0);
        assert_eq!(a.iou(&b), 0.0);

        // Sharing an edge does not count as overlap.
        let c = Rect::from_top_left(1.0, 0.0, 1.0, 1.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn grow_to_aspect() {
        let square = AspectRatio::new(1, 1).unwrap();
        // Taller than the target: grows to the right and left.
        assert_eq!(
            Rect::from_center(10.0, 10.0, 50.0, 100.0).grow_to_fit_aspect(square),
            Rect::from_center(10.0, 10.0, 100.0, 100.0),
        );
        // Wider than the target: grows up and down.
        assert_eq!(
            Rect::from_center(10.0, 10.0, 100.0, 50.0).grow_to_fit_aspect(square),
            Rect::from_center(10.0, 10.0, 100.0, 100.0),
        );
        // Already matching: unchanged.
        let wide = AspectRatio::new(2, 1).unwrap();
        assert_eq!(
            Rect::from_center(0.0, 0.0, 8.0, 4.0).grow_to_fit_aspect(wide),
            Rect::from_center(0.0, 0.0, 8.0, 4.0),
        );
    }
}

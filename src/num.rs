//! Utilities for numerics.

use std::cmp::Ordering;

/// An `f32` wrapper with a total order.
///
/// NaNs sort *after* every other value, so sorting confidences by this key
/// keeps real numbers in front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TotalF32(pub f32);

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order() {
        let mut v = [TotalF32(1.0), TotalF32(f32::NAN), TotalF32(-1.0)];
        v.sort();
        assert_eq!(v[0].0, -1.0);
        assert_eq!(v[1].0, 1.0);
        assert!(v[2].0.is_nan());
    }
}

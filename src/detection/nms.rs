//! Non-Maximum Suppression.
//!
//! One-shot detectors report the same object several times from neighboring anchor positions.
//! This module collapses those duplicates: every detection either seeds a cluster or joins the
//! cluster of an earlier, more confident seed it overlaps with. [`SuppressionMode`] selects what
//! happens to a cluster: dropping everything but the seed, or replacing it with a
//! confidence-weighted average. Averaging reduces frame-to-frame jitter at negligible cost, so it
//! is the default.

use crate::{image::Rect, num::TotalF32};

use super::Detection;

/// A non-maximum suppression pass over the detections of one object class.
pub struct NonMaxSuppression {
    iou_thresh: f32,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold above which two detections count as
    /// overlapping.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    /// Creates a suppressor using [`SuppressionMode::Average`] and the default IOU threshold.
    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            mode: SuppressionMode::Average,
        }
    }

    /// Sets the intersection-over-union threshold above which two detections count as overlapping.
    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    /// Sets the suppression mode.
    pub fn set_mode(&mut self, mode: SuppressionMode) {
        self.mode = mode;
    }

    /// Collapses overlapping detections in place.
    ///
    /// The surviving detections are left in `detections`, ordered by descending confidence.
    pub fn apply(&self, detections: &mut Vec<Detection>) {
        detections
            .sort_unstable_by(|a, b| TotalF32(b.confidence()).cmp(&TotalF32(a.confidence())));

        let mut clustered = vec![false; detections.len()];
        let mut out = Vec::with_capacity(detections.len());
        for i in 0..detections.len() {
            if clustered[i] {
                continue;
            }

            let seed = &detections[i];
            match self.mode {
                SuppressionMode::Remove => {
                    for j in i + 1..detections.len() {
                        if !clustered[j]
                            && seed.bounding_rect().iou(&detections[j].bounding_rect())
                                >= self.iou_thresh
                        {
                            clustered[j] = true;
                        }
                    }
                    out.push(seed.clone());
                }
                SuppressionMode::Average => {
                    let rect = seed.bounding_rect();
                    let mut weight = seed.confidence();
                    let (mut xc, mut yc) = rect.center();
                    let mut w = rect.width();
                    let mut h = rect.height();
                    xc *= weight;
                    yc *= weight;
                    w *= weight;
                    h *= weight;

                    for j in i + 1..detections.len() {
                        if clustered[j] {
                            continue;
                        }
                        let other = &detections[j];
                        if seed.bounding_rect().iou(&other.bounding_rect()) < self.iou_thresh {
                            continue;
                        }
                        clustered[j] = true;

                        let f = other.confidence();
                        let other_rect = other.bounding_rect();
                        let (oxc, oyc) = other_rect.center();
                        xc += oxc * f;
                        yc += oyc * f;
                        w += other_rect.width() * f;
                        h += other_rect.height() * f;
                        weight += f;
                    }

                    out.push(Detection::new(
                        seed.confidence(),
                        Rect::from_center(xc / weight, yc / weight, w / weight, h / weight),
                    ));
                }
            }
        }

        *detections = out;
    }
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

/// Describes how [`NonMaxSuppression`] handles a cluster of overlapping detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SuppressionMode {
    /// Keep only the detection with the highest confidence score.
    Remove,

    /// Replace the cluster with a confidence-weighted average of its detections.
    Average,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_overlapping_duplicates() {
        let mut nms = NonMaxSuppression::new();
        nms.set_mode(SuppressionMode::Remove);

        let mut detections = vec![
            Detection::new(0.4, Rect::from_center(10.0, 10.0, 4.0, 4.0)),
            Detection::new(0.9, Rect::from_center(10.5, 10.0, 4.0, 4.0)),
            Detection::new(0.7, Rect::from_center(50.0, 50.0, 4.0, 4.0)),
        ];
        nms.apply(&mut detections);

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].confidence(), 0.9);
        assert_eq!(detections[0].bounding_rect().center(), (10.5, 10.0));
        assert_eq!(detections[1].confidence(), 0.7);
    }

    #[test]
    fn averages_overlapping_boxes() {
        // `Average` is the default mode.
        let nms = NonMaxSuppression::new();

        let mut detections = vec![
            Detection::new(0.25, Rect::from_center(12.0, 10.0, 4.0, 4.0)),
            Detection::new(0.75, Rect::from_center(10.0, 10.0, 4.0, 4.0)),
        ];
        nms.apply(&mut detections);

        assert_eq!(detections.len(), 1);
        let rect = detections[0].bounding_rect();
        // Confidence of the seed, position weighted by both confidences.
        assert_eq!(detections[0].confidence(), 0.75);
        assert_eq!(rect.center(), (10.5, 10.0));
        assert_eq!(rect.width(), 4.0);
        assert_eq!(rect.height(), 4.0);
    }

    #[test]
    fn keeps_distant_boxes() {
        let nms = NonMaxSuppression::new();

        let mut detections = vec![
            Detection::new(0.5, Rect::from_center(0.0, 0.0, 2.0, 2.0)),
            Detection::new(0.6, Rect::from_center(100.0, 0.0, 2.0, 2.0)),
        ];
        nms.apply(&mut detections);

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].confidence(), 0.6);
        assert_eq!(detections[1].confidence(), 0.5);
    }
}

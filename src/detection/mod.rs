//! Common functionality for object detection.
//!
//! The functionality defined in this module (and submodules) is meant to be reusable across
//! different detectors.

pub mod nms;

use std::marker::PhantomData;

use crate::image::{AsImageView, ImageView, Rect, Resolution};
use crate::nn::{Cnn, Outputs};
use crate::timer::Timer;

use self::nms::NonMaxSuppression;

/// Trait implemented by neural networks that detect objects in an input image.
pub trait Network: Send + Sync + 'static {
    /// The type used to represent the object classes this network can distinguish.
    type Classes: Classes;

    /// Returns the [`Cnn`] to use for detection.
    fn cnn(&self) -> &Cnn;

    /// Extracts all detections with confidence above `threshold` from the network's output.
    ///
    /// Detection positions are expected to be in the coordinate system of the network's input.
    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Detections<Self::Classes>,
    );
}

/// A collection of per-class object detections.
#[derive(Debug)]
pub struct Detections<C: Classes> {
    // FIXME: make this sparse, networks can have thousands of classes
    vec: Vec<Vec<Detection>>,
    _p: PhantomData<C>,
}

impl<C: Classes> Detections<C> {
    pub fn new() -> Self {
        Self {
            vec: Vec::new(),
            _p: PhantomData,
        }
    }

    /// Returns the total number of detections across all object classes.
    pub fn len(&self) -> usize {
        self.vec.iter().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.iter().all(|v| v.is_empty())
    }

    pub fn clear(&mut self) {
        for class in &mut self.vec {
            class.clear();
        }
    }

    pub fn push(&mut self, class: C, detection: Detection) {
        let raw_class = class.as_u32() as usize;
        if self.vec.len() <= raw_class {
            self.vec.resize_with(raw_class + 1, Vec::new);
        }

        self.vec[raw_class].push(detection);
    }

    /// Returns an iterator yielding all detections alongside their class.
    pub fn all_detections(&self) -> impl Iterator<Item = (C, &Detection)> {
        self.vec
            .iter()
            .enumerate()
            .flat_map(|(i, v)| v.iter().map(move |det| (C::from_u32(i as u32), det)))
    }

    pub fn all_detections_mut(&mut self) -> impl Iterator<Item = (C, &mut Detection)> {
        self.vec
            .iter_mut()
            .enumerate()
            .flat_map(|(i, v)| v.iter_mut().map(move |det| (C::from_u32(i as u32), det)))
    }

    /// Returns an iterator that yields all detections of the given class.
    pub fn for_class(&self, class: C) -> impl Iterator<Item = &Detection> {
        self.vec
            .get(class.as_u32() as usize)
            .into_iter()
            .flat_map(|v| v.iter())
    }
}

/// Types that represent object classes.
///
/// Object detectors that can distinguish between a number of different types of objects use a type
/// implementing this trait to tell them apart.
pub trait Classes: Send + Sync + 'static {
    /// Casts an instance of `self` to a raw `u32`.
    fn as_u32(&self) -> u32;

    /// Casts a raw `u32` to an instance of `Self`.
    ///
    /// The library never passes invalid values for `raw` to this method, so any (safe) behavior is
    /// permitted in that case (eg. panicking or returning a default value).
    fn from_u32(raw: u32) -> Self;
}

/// A generic object detector.
///
/// This type wraps a [`Network`] for object detection.
pub struct Detector<C: Classes> {
    network: Box<dyn Network<Classes = C>>,
    detections: Detections<C>,
    t_infer: Timer,
    t_extract: Timer,
    t_nms: Timer,
    thresh: f32,
    nms: NonMaxSuppression,
}

impl<C: Classes> Detector<C> {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;

    pub fn new<N: Network<Classes = C>>(network: N) -> Self {
        Self {
            network: Box::new(network),
            detections: Detections::new(),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
            t_nms: Timer::new("nms"),
            thresh: Self::DEFAULT_THRESHOLD,
            nms: NonMaxSuppression::new(),
        }
    }

    #[inline]
    pub fn set_threshold(&mut self, thresh: f32) {
        self.thresh = thresh;
    }

    pub fn detect<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&Detections<C>> {
        self.detect_impl(image.as_view())
    }

    fn detect_impl(&mut self, image: ImageView<'_>) -> anyhow::Result<&Detections<C>> {
        self.detections.clear();

        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();

        // If the input image's aspect ratio doesn't match the CNN's input, create an oversized view
        // that does.
        let rect = image
            .rect()
            .grow_to_fit_aspect(input_res.aspect_ratio().unwrap());
        let view = image.view(rect);
        let outputs = self.t_infer.time(|| cnn.estimate(&view))?;
        log::trace!("inference result: {:?}", outputs);

        self.t_extract.time(|| {
            self.network
                .extract(&outputs, self.thresh, &mut self.detections)
        });

        self.t_nms.time(|| {
            for class in &mut self.detections.vec {
                self.nms.apply(class);
            }
        });

        to_frame_coords(&mut self.detections, rect, input_res);

        Ok(&self.detections)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract, &self.t_nms].into_iter()
    }
}

/// Maps detections from the network's input coordinate system back into the source image.
///
/// `view_rect` is the (possibly letterboxed) rectangle of the source image that was sampled as the
/// network input. Detections are scaled to its size and then shifted by its offset, which undoes
/// the "black bars" added to match the input aspect ratio.
fn to_frame_coords<C: Classes>(
    detections: &mut Detections<C>,
    view_rect: Rect,
    input_res: Resolution,
) {
    let scale = view_rect.width() / input_res.width() as f32;
    for (_, det) in detections.all_detections_mut() {
        let (xc, yc) = det.rect.center();
        det.rect = Rect::from_center(
            xc * scale,
            yc * scale,
            det.rect.width() * scale,
            det.rect.height() * scale,
        )
        .move_by(view_rect.x(), view_rect.y());
    }
}

/// A detected object.
///
/// A [`Detection`] consists of a [`Rect`] enclosing the detected object and a confidence value.
///
/// Per convention, the confidence value lies between 0.0 and 1.0. It is used when performing
/// non-maximum suppression with [`nms::SuppressionMode::Average`], so it has to have the expected
/// range when making use of that.
#[derive(Debug, Clone)]
pub struct Detection {
    confidence: f32,
    rect: Rect,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self { confidence, rect }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the axis-aligned bounding rectangle containing the detected object.
    pub fn bounding_rect(&self) -> Rect {
        self.rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct TwoClasses(u32);

    impl Classes for TwoClasses {
        fn as_u32(&self) -> u32 {
            self.0
        }

        fn from_u32(raw: u32) -> Self {
            Self(raw)
        }
    }

    #[test]
    fn detections_group_by_class() {
        let mut detections = Detections::new();
        assert!(detections.is_empty());

        let rect = Rect::from_center(0.0, 0.0, 1.0, 1.0);
        detections.push(TwoClasses(0), Detection::new(0.9, rect));
        detections.push(TwoClasses(1), Detection::new(0.8, rect));
        detections.push(TwoClasses(1), Detection::new(0.7, rect));

        assert_eq!(detections.len(), 3);
        assert_eq!(detections.for_class(TwoClasses(0)).count(), 1);
        assert_eq!(detections.for_class(TwoClasses(1)).count(), 2);
        // Class indices never pushed yield nothing.
        assert_eq!(detections.for_class(TwoClasses(7)).count(), 0);

        let classes = detections
            .all_detections()
            .map(|(class, _)| class)
            .collect::<Vec<_>>();
        assert_eq!(classes, [TwoClasses(0), TwoClasses(1), TwoClasses(1)]);

        detections.clear();
        assert!(detections.is_empty());
    }

    #[test]
    fn maps_detections_into_letterboxed_frame() {
        // A 1280x720 frame has to be letterboxed for a square 640x640 network input.
        let frame = Rect::from_top_left(0.0, 0.0, 1280.0, 720.0);
        let input_res = Resolution::new(640, 640);
        let view_rect = frame.grow_to_fit_aspect(input_res.aspect_ratio().unwrap());
        assert_eq!(view_rect.width(), 1280.0);
        assert_eq!(view_rect.height(), 1280.0);

        // Centered in the network input, 100x50 pixels there.
        let mut detections = Detections::new();
        detections.push(
            TwoClasses(0),
            Detection::new(1.0, Rect::from_center(320.0, 320.0, 100.0, 50.0)),
        );
        to_frame_coords(&mut detections, view_rect, input_res);

        let det = detections.for_class(TwoClasses(0)).next().unwrap();
        // Scaled 2x and shifted up by the letterbox bar (280 px).
        assert_eq!(det.bounding_rect().center(), (640.0, 360.0));
        assert_eq!(det.bounding_rect().width(), 200.0);
        assert_eq!(det.bounding_rect().height(), 100.0);
    }

    #[test]
    fn maps_detections_without_letterboxing() {
        // Aspect ratios match, so only the 2x scale applies.
        let frame = Rect::from_top_left(0.0, 0.0, 1280.0, 1280.0);
        let input_res = Resolution::new(640, 640);
        let view_rect = frame.grow_to_fit_aspect(input_res.aspect_ratio().unwrap());
        assert_eq!(view_rect, frame);

        let mut detections = Detections::new();
        detections.push(
            TwoClasses(1),
            Detection::new(1.0, Rect::from_center(100.0, 200.0, 64.0, 64.0)),
        );
        to_frame_coords(&mut detections, view_rect, input_res);

        let det = detections.for_class(TwoClasses(1)).next().unwrap();
        assert_eq!(det.bounding_rect().center(), (200.0, 400.0));
        assert_eq!(det.bounding_rect().width(), 128.0);
        assert_eq!(det.bounding_rect().height(), 128.0);
    }
}

//! Person detection.
//!
//! Runs a YOLOv8 object detection network and keeps track of the classes it distinguishes. The
//! counting loop only cares about [`Class::PERSON`], but detections of every class are extracted
//! so the network wrapper stays usable for other object types.

use std::env;

use crate::detection::{Classes, Detection, Detections, Network};
use crate::image::{draw, AsImageViewMut, Color, ImageViewMut, Rect};
use crate::nn::{tensor::Tensor, Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};

/// Environment variable overriding the path of the ONNX detection model.
pub const ENV_VAR_MODEL: &str = "HEADCOUNT_MODEL";

const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";

/// Detection confidence threshold.
///
/// YOLOv8 produces usable boxes well below the generic default of 0.5, so the detector should be
/// configured with this threshold instead.
pub const DEFAULT_THRESHOLD: f32 = 0.25;

/// The object classes distinguished by the detection network (the 80 COCO classes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Class(u32);

impl Class {
    /// The "person" class, the one the counting loop is interested in.
    pub const PERSON: Self = Self(0);

    /// Returns the human-readable name of this class.
    pub fn name(&self) -> &'static str {
        NAMES[self.0 as usize]
    }
}

impl Classes for Class {
    #[inline]
    fn as_u32(&self) -> u32 {
        self.0
    }

    #[inline]
    fn from_u32(raw: u32) -> Self {
        assert!((raw as usize) < NAMES.len());
        Self(raw)
    }
}

static NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// YOLOv8 object detection network.
///
/// Use with [`Detector`](crate::detection::Detector).
pub struct YoloV8Network {
    cnn: Cnn,
}

impl YoloV8Network {
    /// Loads the detection model.
    ///
    /// The model path is taken from the `HEADCOUNT_MODEL` environment variable, falling back to
    /// `yolov8n.onnx` in the working directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_VAR_MODEL).unwrap_or_else(|_| DEFAULT_MODEL_PATH.to_string());
        log::info!("loading detection model from '{path}'");

        let cnn = Cnn::new(
            NeuralNetwork::from_path(&path)?.load()?,
            CnnInputShape::NCHW,
            ColorMapper::linear(0.0..=1.0),
        )?;
        Ok(Self { cnn })
    }
}

impl Network for YoloV8Network {
    type Classes = Class;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, threshold: f32, detections: &mut Detections<Class>) {
        extract_outputs(&outputs[0], threshold, detections);
    }
}

/// Decodes the raw YOLOv8 output tensor.
///
/// The tensor has shape `[1, 84, N]`: for each of the `N` candidate boxes, rows 0-3 hold the
/// center coordinates and size (in input pixels), and the remaining 80 rows hold the per-class
/// confidences, already mapped to the 0..=1 range by the network itself.
fn extract_outputs(tensor: &Tensor, thresh: f32, detections: &mut Detections<Class>) {
    let shape = tensor.shape();
    assert_eq!(
        (shape.len(), shape[0], shape[1]),
        (3, 1, 4 + NAMES.len()),
        "unexpected detection output shape {shape:?}",
    );
    let candidates = shape[2];

    let rows = (0..shape[1])
        .map(|row| tensor.index([0, row]))
        .collect::<Vec<_>>();

    for i in 0..candidates {
        let mut class = 0;
        let mut confidence = 0.0;
        for (c, row) in rows[4..].iter().enumerate() {
            let score = row.as_slice()[i];
            if score > confidence {
                class = c;
                confidence = score;
            }
        }

        if confidence < thresh {
            continue;
        }

        let [xc, yc, w, h] = [
            rows[0].as_slice()[i],
            rows[1].as_slice()[i],
            rows[2].as_slice()[i],
            rows[3].as_slice()[i],
        ];
        detections.push(
            Class(class as u32),
            Detection::new(confidence, Rect::from_center(xc, yc, w, h)),
        );
    }
}

/// Draws labeled bounding boxes for all detections onto an image.
pub fn draw_detections<I: AsImageViewMut>(image: &mut I, detections: &Detections<Class>) {
    draw_impl(&mut image.as_view_mut(), detections);
}

fn draw_impl(image: &mut ImageViewMut<'_>, detections: &Detections<Class>) {
    for (class, det) in detections.all_detections() {
        let rect = det.bounding_rect();
        draw::rect(image, rect).color(Color::GREEN).stroke_width(2);
        draw::text(
            image,
            rect.x() as i32,
            rect.y() as i32,
            &format!("{} {:.2}", class.name(), det.confidence()),
        )
        .align_left()
        .align_bottom()
        .color(Color::GREEN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names() {
        assert_eq!(Class::PERSON.name(), "person");
        assert_eq!(Class::PERSON.as_u32(), 0);
        assert_eq!(Class::from_u32(15).name(), "cat");
    }

    #[test]
    fn extract_picks_best_class() {
        // 2 candidate boxes: one confident person, one below the threshold.
        let mut data = vec![0.0; 84 * 2];
        let row = |r: usize, i: usize| r * 2 + i;
        data[row(0, 0)] = 320.0; // cx
        data[row(1, 0)] = 240.0; // cy
        data[row(2, 0)] = 100.0; // w
        data[row(3, 0)] = 200.0; // h
        data[row(4, 0)] = 0.9; // person score
        data[row(5, 0)] = 0.3; // bicycle score, must lose
        data[row(4, 1)] = 0.1;

        let tensor = Tensor::from_iter(&[1, 84, 2], data);
        let mut detections = Detections::new();
        extract_outputs(&tensor, 0.25, &mut detections);

        assert_eq!(detections.len(), 1);
        let (class, det) = detections.all_detections().next().unwrap();
        assert_eq!(class, Class::PERSON);
        assert_eq!(det.confidence(), 0.9);
        assert_eq!(det.bounding_rect().center(), (320.0, 240.0));
        assert_eq!(det.bounding_rect().width(), 100.0);
        assert_eq!(det.bounding_rect().height(), 200.0);
    }

    #[test]
    fn extract_ignores_low_confidence() {
        let data = vec![0.01; 84 * 4];
        let tensor = Tensor::from_iter(&[1, 84, 4], data);
        let mut detections = Detections::new();
        extract_outputs(&tensor, 0.25, &mut detections);
        assert!(detections.is_empty());
    }
}

use std::time::Duration;

use headcount::detection::Detector;
use headcount::gui;
use headcount::person::{self, Class, YoloV8Network};
use headcount::timer::{FpsCounter, Ticker};
use headcount::video::camera::{Camera, CameraOptions};

/// How often the person count is reported on stdout.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    headcount::init_logger!();
    gui::run(run)
}

fn run() -> anyhow::Result<()> {
    let mut detector = Detector::new(YoloV8Network::load()?);
    detector.set_threshold(person::DEFAULT_THRESHOLD);

    let mut camera = Camera::open(CameraOptions::default())?;

    let mut fps = FpsCounter::new("headcount");
    let mut report = Ticker::new(REPORT_INTERVAL);

    loop {
        let mut image = match camera.read() {
            Ok(image) => image,
            Err(e) => {
                log::error!("failed to read camera frame: {e}");
                break;
            }
        };

        let detections = detector.detect(&image)?;
        let people = detections.for_class(Class::PERSON).count();
        if report.poll() {
            println!("people detected: {people}");
        }

        person::draw_detections(&mut image, detections);
        gui::show_image("headcount", &image);

        fps.tick_with(camera.timers().chain(detector.timers()));
    }

    Ok(())
}

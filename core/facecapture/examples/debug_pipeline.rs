//! Run validation, detection and portrait extraction on one image.
//!
//! Usage:
//!   RUST_LOG=facecapture=debug cargo run --example debug_pipeline -- photo.jpg [portrait.webp]

use facecapture::{CaptureGuideValidator, FaceDetector, ImageSample, PortraitPipeline};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(input_path) = args.next() else {
        eprintln!("usage: debug_pipeline <image> [output]");
        std::process::exit(2);
    };
    let output_path = args.next().unwrap_or_else(|| "portrait.webp".to_string());

    let input = std::fs::read(&input_path).unwrap();
    let sample = ImageSample::decode(input).unwrap();
    println!("=== {input_path} ({}x{}) ===", sample.width(), sample.height());

    let validation = CaptureGuideValidator::new().validate(&sample);
    println!(
        "  guide: face={} ears={} shoulders={} confidence={:.2} \"{}\"",
        validation.has_face,
        validation.has_ears,
        validation.has_shoulders,
        validation.confidence,
        validation.message,
    );

    let detector = FaceDetector::shared();
    println!("  strategy: {:?}", detector.strategy());

    let outcome = PortraitPipeline::new()
        .detector(detector)
        .process(&sample)
        .unwrap();
    println!(
        "  detection: {:?} confidence={:.2} box={:?} neck={}",
        outcome.detection.method,
        outcome.detection.confidence,
        outcome.detection.bounding_box,
        outcome.detection.has_neck,
    );
    println!("  stages: {:?}", outcome.stages);

    match outcome.portrait() {
        Some(portrait) => {
            std::fs::write(&output_path, portrait.encoded().unwrap()).unwrap();
            println!(
                "  portrait: {}x{} -> {output_path}",
                portrait.width(),
                portrait.height()
            );
        }
        None => {
            let error = outcome.extraction.and_then(|extraction| extraction.error);
            println!("  no portrait ({error:?})");
        }
    }
}

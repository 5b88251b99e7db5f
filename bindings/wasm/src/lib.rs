use facecapture::{
    CaptureGuideValidator, DetectionMethod, DetectionResult, FaceCaptureError, FaceDetector,
    OutputFormat, PipelineStage, PortraitOutcome, PortraitPipeline, ValidationResult,
};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

/// Options for portrait extraction, passed as a JavaScript object.
///
/// All fields are optional; unset fields keep the pipeline defaults.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PortraitOptions {
    pub format: Option<String>,
    pub quality: Option<f32>,
    pub expand_factor: Option<f32>,
    pub tilt_threshold: Option<f32>,
}

fn format_to_str(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Webp => "webp",
        OutputFormat::Png => "png",
        OutputFormat::Jpeg => "jpeg",
    }
}

fn string_to_format(format: &str) -> Result<OutputFormat, JsValue> {
    match format {
        "webp" => Ok(OutputFormat::Webp),
        "png" => Ok(OutputFormat::Png),
        "jpeg" => Ok(OutputFormat::Jpeg),
        _ => Err(make_error(
            "INVALID_OPTIONS",
            &format!("unknown format: {format}"),
        )),
    }
}

fn method_to_str(method: DetectionMethod) -> &'static str {
    match method {
        DetectionMethod::Model => "model",
        DetectionMethod::Heuristic => "heuristic",
        DetectionMethod::None => "none",
    }
}

fn stage_to_str(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Idle => "idle",
        PipelineStage::Detecting => "detecting",
        PipelineStage::Detected => "detected",
        PipelineStage::NotDetected => "not-detected",
        PipelineStage::Extracting => "extracting",
        PipelineStage::Realigning => "realigning",
        PipelineStage::Done => "done",
    }
}

/// Create a JS `Error` with a `code` property.
fn make_error(code: &str, message: &str) -> JsValue {
    let err = js_sys::Error::new(message);
    let _ = js_sys::Reflect::set(&err, &"code".into(), &JsValue::from_str(code));
    JsValue::from(err)
}

fn error_code(e: &FaceCaptureError) -> &'static str {
    match e {
        FaceCaptureError::DecodeError(_) => "DECODE_ERROR",
        FaceCaptureError::ZeroDimensions => "ZERO_DIMENSIONS",
        FaceCaptureError::EncodeError(_) => "ENCODE_ERROR",
        FaceCaptureError::NoFaceDetected => "NO_FACE_DETECTED",
        FaceCaptureError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
        FaceCaptureError::NoLandmarksResolved => "NO_LANDMARKS_RESOLVED",
        FaceCaptureError::InvalidQuality(_) => "INVALID_QUALITY",
        FaceCaptureError::InvalidExpandFactor(_) => "INVALID_EXPAND_FACTOR",
        FaceCaptureError::InvalidTiltThreshold(_) => "INVALID_TILT_THRESHOLD",
        FaceCaptureError::InvalidPadding(_) => "INVALID_PADDING",
        FaceCaptureError::StoreError(_) => "STORE_ERROR",
    }
}

/// Convert a `FaceCaptureError` into a JS `Error` with a machine-readable `code` property.
fn to_js_error(e: FaceCaptureError) -> JsValue {
    make_error(error_code(&e), &e.to_string())
}

fn parse_options(options: JsValue) -> Result<PortraitOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(PortraitOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options)
            .map_err(|e| make_error("INVALID_OPTIONS", &format!("invalid options: {e}")))
    }
}

fn apply_options(
    mut pipeline: PortraitPipeline,
    opts: &PortraitOptions,
) -> Result<PortraitPipeline, JsValue> {
    if let Some(ref fmt) = opts.format {
        pipeline = pipeline.format(string_to_format(fmt)?);
    }
    if let Some(q) = opts.quality {
        pipeline = pipeline.quality(q);
    }
    if let Some(factor) = opts.expand_factor {
        pipeline = pipeline.expand_factor(factor);
    }
    if let Some(degrees) = opts.tilt_threshold {
        pipeline = pipeline.tilt_threshold(degrees);
    }
    Ok(pipeline)
}

fn build_validation_object(result: &ValidationResult) -> Result<JsValue, JsValue> {
    let obj = js_sys::Object::new();
    js_sys::Reflect::set(&obj, &"hasFace".into(), &JsValue::from(result.has_face))?;
    js_sys::Reflect::set(&obj, &"hasEars".into(), &JsValue::from(result.has_ears))?;
    js_sys::Reflect::set(
        &obj,
        &"hasShoulders".into(),
        &JsValue::from(result.has_shoulders),
    )?;
    js_sys::Reflect::set(&obj, &"confidence".into(), &JsValue::from(result.confidence))?;
    js_sys::Reflect::set(&obj, &"message".into(), &JsValue::from_str(&result.message))?;
    Ok(JsValue::from(obj))
}

fn build_detection_object(result: &DetectionResult) -> Result<JsValue, JsValue> {
    let obj = js_sys::Object::new();
    js_sys::Reflect::set(&obj, &"hasFace".into(), &JsValue::from(result.has_face))?;
    js_sys::Reflect::set(&obj, &"confidence".into(), &JsValue::from(result.confidence))?;
    js_sys::Reflect::set(&obj, &"hasNeck".into(), &JsValue::from(result.has_neck))?;
    js_sys::Reflect::set(
        &obj,
        &"method".into(),
        &JsValue::from_str(method_to_str(result.method)),
    )?;

    let bbox = match result.bounding_box.as_ref() {
        Some(bounds) => {
            let bb_obj = js_sys::Object::new();
            js_sys::Reflect::set(&bb_obj, &"x".into(), &JsValue::from(bounds.x))?;
            js_sys::Reflect::set(&bb_obj, &"y".into(), &JsValue::from(bounds.y))?;
            js_sys::Reflect::set(&bb_obj, &"width".into(), &JsValue::from(bounds.width))?;
            js_sys::Reflect::set(&bb_obj, &"height".into(), &JsValue::from(bounds.height))?;
            JsValue::from(bb_obj)
        }
        None => JsValue::NULL,
    };
    js_sys::Reflect::set(&obj, &"boundingBox".into(), &bbox)?;

    let landmarks = match result.landmarks.as_ref() {
        Some(points) => {
            let array = js_sys::Array::new();
            for point in points {
                let p_obj = js_sys::Object::new();
                js_sys::Reflect::set(&p_obj, &"x".into(), &JsValue::from(point.x))?;
                js_sys::Reflect::set(&p_obj, &"y".into(), &JsValue::from(point.y))?;
                if let Some(z) = point.z {
                    js_sys::Reflect::set(&p_obj, &"z".into(), &JsValue::from(z))?;
                }
                array.push(&p_obj);
            }
            JsValue::from(array)
        }
        None => JsValue::NULL,
    };
    js_sys::Reflect::set(&obj, &"landmarks".into(), &landmarks)?;

    Ok(JsValue::from(obj))
}

fn build_portrait_object(outcome: &PortraitOutcome) -> Result<JsValue, JsValue> {
    let obj = js_sys::Object::new();
    js_sys::Reflect::set(&obj, &"success".into(), &JsValue::from(outcome.success()))?;
    js_sys::Reflect::set(
        &obj,
        &"confidence".into(),
        &JsValue::from(outcome.detection.confidence),
    )?;

    let stages = js_sys::Array::new();
    for stage in &outcome.stages {
        stages.push(&JsValue::from_str(stage_to_str(*stage)));
    }
    js_sys::Reflect::set(&obj, &"stages".into(), &stages)?;

    match outcome.portrait() {
        Some(portrait) => {
            let bytes = portrait.encoded().unwrap_or_default();
            let data = js_sys::Uint8Array::from(bytes);
            js_sys::Reflect::set(&obj, &"data".into(), &data)?;
            let format = portrait.format().map_or("", format_to_str);
            js_sys::Reflect::set(&obj, &"format".into(), &JsValue::from_str(format))?;
            js_sys::Reflect::set(&obj, &"width".into(), &JsValue::from(portrait.width()))?;
            js_sys::Reflect::set(&obj, &"height".into(), &JsValue::from(portrait.height()))?;
        }
        None => {
            js_sys::Reflect::set(&obj, &"data".into(), &JsValue::NULL)?;
        }
    }

    let error = outcome
        .extraction
        .as_ref()
        .and_then(|extraction| extraction.error.as_ref())
        .map_or(JsValue::NULL, |e| JsValue::from_str(error_code(e)));
    js_sys::Reflect::set(&obj, &"errorCode".into(), &error)?;

    Ok(JsValue::from(obj))
}

/// Check framing for live capture guidance.
///
/// @param input - Raw image bytes (JPEG, PNG, or WebP)
#[wasm_bindgen]
pub fn validate(input: Vec<u8>) -> Result<JsValue, JsValue> {
    let result = CaptureGuideValidator::new().validate_bytes(&input);
    build_validation_object(&result)
}

/// Detect the most prominent face.
///
/// @param input - Raw image bytes (JPEG, PNG, or WebP)
#[wasm_bindgen]
pub fn detect(input: Vec<u8>) -> Result<JsValue, JsValue> {
    let result = FaceDetector::shared().detect_bytes(&input);
    build_detection_object(&result)
}

/// Detect, crop, mask and level a circular portrait.
///
/// @param input - Raw image bytes (JPEG, PNG, or WebP)
/// @param options - Optional object with fields: format, quality,
///   expandFactor, tiltThreshold
#[wasm_bindgen(js_name = "extractPortrait")]
pub fn extract_portrait(input: Vec<u8>, options: JsValue) -> Result<JsValue, JsValue> {
    let opts = parse_options(options)?;
    let pipeline = apply_options(PortraitPipeline::new(), &opts)?;

    let outcome = pipeline.process_bytes(&input).map_err(to_js_error)?;

    build_portrait_object(&outcome)
}

use crate::config::Config;
use crate::error::RecognitionError;
use crate::types::Detection;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use log::{debug, warn};
use serde_json::Value;
use std::io::Cursor;
use url::Url;

/// Turns one frame into the top-ranked plate detection, or `None` when the
/// service saw no plate.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<Option<Detection>, RecognitionError>;
}

/// Client for the OpenALPR `recognize_bytes` endpoint.
pub struct RecognitionClient {
    client: reqwest::Client,
    endpoint: Url,
    max_dimension: u32,
}

impl RecognitionClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        let mut endpoint = config.recognition_url.clone();
        endpoint
            .query_pairs_mut()
            .append_pair("recognize_vehicle", "1")
            .append_pair("country", &config.country)
            .append_pair("secret_key", &config.secret_key);
        RecognitionClient {
            client,
            endpoint,
            max_dimension: config.max_frame_dimension,
        }
    }
}

#[async_trait]
impl Recognizer for RecognitionClient {
    async fn recognize(&self, image: &[u8]) -> Result<Option<Detection>, RecognitionError> {
        let body = STANDARD.encode(prepare_image(image, self.max_dimension));
        let response = self
            .client
            .post(self.endpoint.clone())
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RecognitionError::Service {
                status,
                body: text.chars().take(200).collect(),
            });
        }
        let json: Value = serde_json::from_str(&text)
            .map_err(|e| RecognitionError::Parse(format!("invalid JSON: {}", e)))?;
        parse_response(&json)
    }
}

/// Downscales frames larger than `max_dimension` and re-encodes them as JPEG.
/// Frames that cannot be decoded are passed through untouched.
fn prepare_image(image: &[u8], max_dimension: u32) -> Vec<u8> {
    let decoded = match image::load_from_memory(image) {
        Ok(i) => i,
        Err(e) => {
            warn!("Failed to decode frame, sending it unchanged: {:?}", e);
            return image.to_vec();
        }
    };
    let (width, height) = decoded.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return image.to_vec();
    }
    debug!(
        "Resizing {}x{} frame to fit {}px",
        width, height, max_dimension
    );
    let resized = DynamicImage::ImageRgb8(
        decoded
            .resize(max_dimension, max_dimension, FilterType::Triangle)
            .to_rgb8(),
    );
    let mut out = Cursor::new(Vec::new());
    match resized.write_to(&mut out, ImageOutputFormat::Jpeg(90)) {
        Ok(()) => out.into_inner(),
        Err(e) => {
            warn!("Failed to re-encode resized frame: {:?}", e);
            image.to_vec()
        }
    }
}

/// Extracts the first result of a recognition response.
pub fn parse_response(json: &Value) -> Result<Option<Detection>, RecognitionError> {
    let results = json["results"]
        .as_array()
        .ok_or_else(|| parse_error("missing results array"))?;
    let top = match results.first() {
        Some(top) => top,
        None => return Ok(None),
    };
    let plate = top["plate"]
        .as_str()
        .ok_or_else(|| parse_error("missing plate field"))?
        .trim();
    if plate.is_empty() {
        return Ok(None);
    }
    let vehicle = &top["vehicle"];
    let (make, make_confidence) = candidate(vehicle, "make")?;
    let (make_model, model_confidence) = candidate(vehicle, "make_model")?;
    // Multi-word models are joined with further underscores; only the first
    // word is kept so it lines up with the registry's first-word model.
    let model = make_model
        .split('_')
        .nth(1)
        .filter(|model| !model.is_empty())
        .ok_or_else(|| parse_error(&format!("make_model {:?} has no model part", make_model)))?;
    let (colour, colour_confidence) = candidate(vehicle, "color")?;

    Ok(Some(Detection {
        plate: plate.to_ascii_uppercase(),
        plate_confidence: top["confidence"]
            .as_f64()
            .ok_or_else(|| parse_error("missing confidence field"))?,
        processing_time_ms: json["processing_time"]["plates"]
            .as_f64()
            .ok_or_else(|| parse_error("missing processing_time.plates field"))?,
        make: make.to_string(),
        make_confidence,
        model: model.to_string(),
        model_confidence,
        colour: colour.to_string(),
        colour_confidence,
    }))
}

// Top-ranked `{name, confidence}` guess for a vehicle attribute.
fn candidate<'a>(vehicle: &'a Value, field: &str) -> Result<(&'a str, f64), RecognitionError> {
    let top = &vehicle[field][0];
    let name = top["name"]
        .as_str()
        .ok_or_else(|| parse_error(&format!("missing vehicle.{} name", field)))?;
    let confidence = top["confidence"]
        .as_f64()
        .ok_or_else(|| parse_error(&format!("missing vehicle.{} confidence", field)))?;
    Ok((name, confidence))
}

fn parse_error(msg: &str) -> RecognitionError {
    RecognitionError::Parse(msg.to_string())
}

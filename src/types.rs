use bytes::Bytes;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Sentinel stored and reported when the registry publishes no colour.
pub const UNKNOWN_COLOUR: &str = "UNKNOWN";

/// One sampled still from the source video. The image itself stays on disk
/// until the frame is picked up for recognition.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
}

impl Frame {
    pub async fn read(&self) -> io::Result<Bytes> {
        tokio::fs::read(&self.path).await.map(Bytes::from)
    }
}

/// Top-ranked plate candidate the recognition service returned for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub plate: String,
    pub plate_confidence: f64,
    pub processing_time_ms: f64,
    pub make: String,
    pub make_confidence: f64,
    pub model: String,
    pub model_confidence: f64,
    pub colour: String,
    pub colour_confidence: f64,
}

impl Detection {
    /// The colour name without any finish qualifier, e.g. "silver" for
    /// "silver-metallic".
    pub fn base_colour(&self) -> &str {
        self.colour.split('-').next().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryColour {
    Known(String),
    Unknown,
}

impl RegistryColour {
    pub fn as_str(&self) -> &str {
        match self {
            RegistryColour::Known(colour) => colour,
            RegistryColour::Unknown => UNKNOWN_COLOUR,
        }
    }
}

impl fmt::Display for RegistryColour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Make, model and colour as published by the vehicle registry, lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRecord {
    pub make: String,
    pub model: String,
    pub colour: RegistryColour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourMatch {
    Matched,
    Mismatched,
    Unknown,
}

impl fmt::Display for ColourMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColourMatch::Matched => "true",
            ColourMatch::Mismatched => "false",
            ColourMatch::Unknown => UNKNOWN_COLOUR,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Correct => "Correct",
            Verdict::Incorrect => "Incorrect",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub make_match: bool,
    pub model_match: bool,
    pub colour_match: ColourMatch,
    pub verdict: Verdict,
}

/// The persisted row for a unique plate. `registry` is `None` when the
/// registry lookup failed and the plate was stored without cross-validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRecord {
    pub detection: Detection,
    pub registry: Option<RegistryRecord>,
}

impl PlateRecord {
    pub fn plate(&self) -> &str {
        &self.detection.plate
    }
}

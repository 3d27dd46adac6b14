use crate::types::{PlateRecord, ValidationOutcome};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameId {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Checked(ValidationOutcome),
    /// The registry lookup failed; the reason is kept for the report.
    Unavailable(String),
}

/// A newly persisted plate, as reported at the end of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub frame: FrameId,
    pub record: PlateRecord,
    pub validation: Validation,
}

/// Why a frame produced no new row.
#[derive(Debug, Clone, PartialEq)]
pub enum Skip {
    Rejected(FrameId),
    AlreadySeen { frame: FrameId, plate: String },
    Failed { frame: FrameId, reason: String },
}

impl Skip {
    fn frame(&self) -> &FrameId {
        match self {
            Skip::Rejected(frame)
            | Skip::AlreadySeen { frame, .. }
            | Skip::Failed { frame, .. } => frame,
        }
    }
}

/// Where a frame's journey through the pipeline ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Persisted(ReportEntry),
    Skipped(Skip),
}

impl From<Skip> for FrameOutcome {
    fn from(skip: Skip) -> Self {
        FrameOutcome::Skipped(skip)
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub total_frames: usize,
    /// Persisted plates, sorted by plate text.
    pub entries: Vec<ReportEntry>,
    /// Frames that stored nothing, sorted by frame index.
    pub skipped: Vec<Skip>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn new(total_frames: usize, outcomes: Vec<FrameOutcome>, cancelled: bool) -> Self {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                FrameOutcome::Persisted(entry) => entries.push(entry),
                FrameOutcome::Skipped(skip) => skipped.push(skip),
            }
        }
        entries.sort_by(|a, b| a.record.plate().cmp(b.record.plate()));
        skipped.sort_by_key(|skip| skip.frame().index);
        RunReport {
            total_frames,
            entries,
            skipped,
            cancelled,
        }
    }

    pub fn processed(&self) -> usize {
        self.entries.len() + self.skipped.len()
    }

    pub fn rejected(&self) -> usize {
        self.count(|s| matches!(s, Skip::Rejected(_)))
    }

    pub fn already_seen(&self) -> usize {
        self.count(|s| matches!(s, Skip::AlreadySeen { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, Skip::Failed { .. }))
    }

    fn count<F: Fn(&Skip) -> bool>(&self, f: F) -> usize {
        self.skipped.iter().filter(|s| f(s)).count()
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.record.detection;
        writeln!(f, "Image: {}", self.frame.name)?;
        writeln!(
            f,
            "plate: {} confidence: {} processing time: {}",
            d.plate, d.plate_confidence, d.processing_time_ms
        )?;
        writeln!(f, "make: {} confidence: {}", d.make, d.make_confidence)?;
        writeln!(f, "model: {} confidence: {}", d.model, d.model_confidence)?;
        writeln!(f, "colour: {} confidence: {}", d.colour, d.colour_confidence)?;
        if let Some(registry) = &self.record.registry {
            writeln!(
                f,
                "registry: make: {} model: {} colour: {}",
                registry.make, registry.model, registry.colour
            )?;
        }
        match &self.validation {
            Validation::Checked(outcome) => write!(
                f,
                "Details vs registry: make: {} model: {} colour: {} verdict: {}",
                outcome.make_match, outcome.model_match, outcome.colour_match, outcome.verdict
            ),
            Validation::Unavailable(reason) => {
                write!(f, "Details vs registry: unavailable ({})", reason)
            }
        }
    }
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Skip::Rejected(frame) => write!(f, "{}: no licence plate found", frame.name),
            Skip::AlreadySeen { frame, plate } => {
                write!(f, "{}: plate {} already seen", frame.name, plate)
            }
            Skip::Failed { frame, reason } => write!(f, "{}: {}", frame.name, reason),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}\n", entry)?;
        }
        if !self.skipped.is_empty() {
            writeln!(f, "Skipped frames:")?;
            for skip in &self.skipped {
                writeln!(f, "  {}", skip)?;
            }
        }
        write!(
            f,
            "Frames: {} sampled, {} processed, {} stored, {} without plate, {} already seen, {} failed",
            self.total_frames,
            self.processed(),
            self.entries.len(),
            self.rejected(),
            self.already_seen(),
            self.failed()
        )?;
        if self.cancelled {
            write!(
                f,
                "\nRun cancelled: {} frames not processed",
                self.total_frames.saturating_sub(self.processed())
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColourMatch, Detection, RegistryColour, RegistryRecord, Verdict};

    fn frame(index: usize) -> FrameId {
        FrameId {
            index,
            name: format!("{}.jpg", index),
        }
    }

    fn entry(index: usize, plate: &str, validation: Validation) -> ReportEntry {
        let registry = match validation {
            Validation::Checked(_) => Some(RegistryRecord {
                make: "toyota".to_string(),
                model: "corolla".to_string(),
                colour: RegistryColour::Unknown,
            }),
            Validation::Unavailable(_) => None,
        };
        ReportEntry {
            frame: frame(index),
            record: PlateRecord {
                detection: Detection {
                    plate: plate.to_string(),
                    plate_confidence: 94.5,
                    processing_time_ms: 41.5,
                    make: "toyota".to_string(),
                    make_confidence: 88.0,
                    model: "corolla".to_string(),
                    model_confidence: 71.0,
                    colour: "white".to_string(),
                    colour_confidence: 65.0,
                },
                registry,
            },
            validation,
        }
    }

    fn correct() -> Validation {
        Validation::Checked(ValidationOutcome {
            make_match: true,
            model_match: true,
            colour_match: ColourMatch::Unknown,
            verdict: Verdict::Correct,
        })
    }

    #[test]
    fn entries_sort_by_plate_and_skips_by_frame() {
        let report = RunReport::new(
            6,
            vec![
                Skip::Failed {
                    frame: frame(5),
                    reason: "recognition request timed out".to_string(),
                }
                .into(),
                FrameOutcome::Persisted(entry(3, "ZZZ999", correct())),
                Skip::Rejected(frame(0)).into(),
                FrameOutcome::Persisted(entry(1, "ABC123", correct())),
                Skip::AlreadySeen {
                    frame: frame(2),
                    plate: "ABC123".to_string(),
                }
                .into(),
            ],
            false,
        );
        let plates: Vec<&str> = report.entries.iter().map(|e| e.record.plate()).collect();
        assert_eq!(plates, vec!["ABC123", "ZZZ999"]);
        let skipped: Vec<usize> = report.skipped.iter().map(|s| s.frame().index).collect();
        assert_eq!(skipped, vec![0, 2, 5]);
        assert_eq!(report.processed(), 5);
        assert_eq!(report.rejected(), 1);
        assert_eq!(report.already_seen(), 1);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn rendered_entry_shows_confidences_and_verdict() {
        let text = entry(3, "ABC123", correct()).to_string();
        assert!(text.starts_with("Image: 3.jpg\n"));
        assert!(text.contains("plate: ABC123 confidence: 94.5 processing time: 41.5"));
        assert!(text.contains("colour: white confidence: 65"));
        assert!(text.contains("registry: make: toyota model: corolla colour: UNKNOWN"));
        assert!(text.contains("make: true model: true colour: UNKNOWN verdict: Correct"));
    }

    #[test]
    fn rendered_entry_without_registry_explains_why() {
        let text = entry(
            1,
            "ABC123",
            Validation::Unavailable("registry page has no vehicle table".to_string()),
        )
        .to_string();
        assert!(text.contains("unavailable (registry page has no vehicle table)"));
        assert!(!text.contains("verdict"));
    }

    #[test]
    fn summary_notes_cancellation() {
        let report = RunReport::new(4, vec![Skip::Rejected(frame(0)).into()], true);
        let text = report.to_string();
        assert!(text.contains("Skipped frames:\n  0.jpg: no licence plate found"));
        assert!(text.contains("Frames: 4 sampled, 1 processed, 0 stored"));
        assert!(text.ends_with("Run cancelled: 3 frames not processed"));
    }

    #[test]
    fn stored_plates_never_appear_among_skipped_frames() {
        let report = RunReport::new(
            2,
            vec![
                FrameOutcome::Persisted(entry(0, "ABC123", correct())),
                Skip::AlreadySeen {
                    frame: frame(1),
                    plate: "ABC123".to_string(),
                }
                .into(),
            ],
            false,
        );
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        let text = report.to_string();
        let skipped = &text[text.find("Skipped frames:").unwrap()..];
        assert!(skipped.starts_with("Skipped frames:\n  1.jpg: plate ABC123 already seen\n"));
        assert!(!skipped.contains("0.jpg"));
    }
}

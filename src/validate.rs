use crate::types::{ColourMatch, Detection, RegistryColour, RegistryRecord, ValidationOutcome, Verdict};

/// Compares what the recognition service saw against the registry.
///
/// Make and model must match exactly after trimming and lower-casing. The
/// recognised colour is compared without its finish qualifier. A colour the
/// registry does not publish cannot make an otherwise matching read incorrect.
pub fn reconcile(detection: &Detection, registry: &RegistryRecord) -> ValidationOutcome {
    let make_match = normalize(&detection.make) == normalize(&registry.make);
    let model_match = normalize(&detection.model) == normalize(&registry.model);
    let colour_match = match &registry.colour {
        RegistryColour::Unknown => ColourMatch::Unknown,
        RegistryColour::Known(colour) if normalize(colour) == normalize(detection.base_colour()) => {
            ColourMatch::Matched
        }
        RegistryColour::Known(_) => ColourMatch::Mismatched,
    };
    let verdict = if make_match && model_match && colour_match != ColourMatch::Mismatched {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    };
    ValidationOutcome {
        make_match,
        model_match,
        colour_match,
        verdict,
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

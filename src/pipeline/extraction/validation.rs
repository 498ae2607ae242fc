//! Validation of prescription details a person entered or corrected after
//! reviewing an extraction.

use serde::{Deserialize, Serialize};

/// Prescription details as typed by the reviewer. Every field is free text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualPrescriptionInput {
    pub medicine_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
}

/// Returns one message per problem; empty means the input is acceptable.
pub fn validate_prescription_input(input: &ManualPrescriptionInput) -> Vec<String> {
    let mut errors = Vec::new();

    let name = non_blank(&input.medicine_name);
    let dosage = non_blank(&input.dosage);
    let frequency = non_blank(&input.frequency);
    let duration = non_blank(&input.duration);

    if name.is_none() {
        errors.push("Medicine name is required".to_string());
    }
    if dosage.is_none() {
        errors.push("Dosage is required".to_string());
    }
    if frequency.is_none() {
        errors.push("Frequency is required".to_string());
    }

    if let Some(d) = dosage {
        if d.parse::<f64>().map_or(true, |v| !v.is_finite()) {
            errors.push("Dosage must be a number".to_string());
        }
    }
    if let Some(d) = duration {
        if d.parse::<u32>().is_err() {
            errors.push("Duration must be a number of days".to_string());
        }
    }

    errors
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

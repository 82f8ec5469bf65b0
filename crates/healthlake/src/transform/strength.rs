//! Strength scoring: estimated one-rep max and DOTS

use serde::{Deserialize, Serialize};

use crate::error::{HealthlakeError, Result};

/// Estimated 1RM with the Epley formula, rounded to 0.1 kg.
///
/// A single rep is its own max; non-positive weight or reps give no estimate.
pub fn estimate_one_rep_max(weight_kg: f64, reps: u32) -> Option<f64> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 || reps == 0 {
        return None;
    }
    if reps == 1 {
        return Some(weight_kg);
    }
    let e1rm = weight_kg * (1.0 + f64::from(reps) / 30.0);
    Some((e1rm * 10.0).round() / 10.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl std::str::FromStr for Sex {
    type Err = HealthlakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Sex::Male),
            "female" | "f" => Ok(Sex::Female),
            other => Err(HealthlakeError::invalid_param(format!(
                "sex must be 'male' or 'female', got '{}'",
                other
            ))),
        }
    }
}

/// IPF DOTS score for a competition total, rounded to 2 decimals
pub fn dots_score(total_kg: f64, bodyweight_kg: f64, sex: Sex) -> Result<f64> {
    if !(bodyweight_kg > 0.0 && total_kg >= 0.0) {
        return Err(HealthlakeError::invalid_param(
            "DOTS needs a positive bodyweight and a non-negative total",
        ));
    }
    let (a, b, c, d, e) = match sex {
        Sex::Male => (
            47.461_788_54,
            8.472_061_379,
            0.073_694_103_46,
            -0.001_395_833_811,
            7.076_659_730e-6,
        ),
        Sex::Female => (
            -125.425_539_8,
            13.712_194_19,
            -0.033_072_506_31,
            0.000_048_401_167_67,
            -1.812_303_927e-8,
        ),
    };
    let bw = bodyweight_kg;
    let denominator = a + b * bw + c * bw.powi(2) + d * bw.powi(3) + e * bw.powi(4);
    Ok(((500.0 / denominator) * total_kg * 100.0).round() / 100.0)
}

//! Body composition measurement payload.
//!
//! Numbers are kept as `serde_json::Number` so that values echoed back keep
//! the representation they arrived with (`32` stays `32`, not `32.0`).

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::fit::WeightScale;

/// A body composition measurement. Every field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyComposition {
    pub weight: Number,
    pub body_fat_percent: Number,
    pub water_percent: Number,
    pub bone_mass: Number,
    pub muscle_mass: Number,
    pub visceral_fat: Number,
    pub physique_rating: Number,
    pub metabolic_age: Number,
    pub bmi: Number,
}

/// Fields reported back to the caller after a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub weight: Number,
    pub body_fat_percent: Number,
    pub muscle_mass: Number,
    pub visceral_fat: Number,
    pub physique_rating: Number,
}

impl BodyComposition {
    pub fn summary(&self) -> UploadSummary {
        UploadSummary {
            weight: self.weight.clone(),
            body_fat_percent: self.body_fat_percent.clone(),
            muscle_mass: self.muscle_mass.clone(),
            visceral_fat: self.visceral_fat.clone(),
            physique_rating: self.physique_rating.clone(),
        }
    }

    /// Convert to the FIT weight-scale message values.
    pub fn to_weight_scale(&self) -> WeightScale {
        WeightScale {
            weight: number(&self.weight),
            percent_fat: Some(number(&self.body_fat_percent)),
            percent_hydration: Some(number(&self.water_percent)),
            bone_mass: Some(number(&self.bone_mass)),
            muscle_mass: Some(number(&self.muscle_mass)),
            visceral_fat_rating: Some(number(&self.visceral_fat)),
            physique_rating: Some(number(&self.physique_rating)),
            metabolic_age: Some(number(&self.metabolic_age)),
            bmi: Some(number(&self.bmi)),
            ..WeightScale::default()
        }
    }
}

fn number(n: &Number) -> f64 {
    n.as_f64().unwrap_or_default()
}

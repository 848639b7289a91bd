//! Birth profile domain model.
//!
//! A BaZhi reading is cast from the four pillars of a birth moment: year,
//! month, day and hour, plus gender and birthplace. The profile is stored
//! in the per-user document and drives the guru system prompt and the
//! elemental analysis.

use crate::error::{GuruError, Result};
use serde::{Deserialize, Serialize};

/// Gender as recorded during profile setup.
///
/// Serialized capitalized (`"Male"` / `"Female"`), matching the values the
/// deployed clients already wrote into user documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Chinese label used when interpolating the guru prompt.
    pub fn label_zh(&self) -> &'static str {
        match self {
            Gender::Male => "男性",
            Gender::Female => "女性",
        }
    }
}

/// The user's birth data, complete once all five fields are captured.
///
/// Stored under the `birthInfo` key of the user document. A user without
/// a stored profile (or with a partially migrated document) is routed to
/// profile setup before anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthProfile {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// Hour of birth, 0-23. Mapped to the traditional double-hour by the
    /// guru itself, so stored as entered.
    pub hour: u8,
    pub gender: Gender,
    pub birthplace: String,
}

impl BirthProfile {
    /// Validates field ranges before the profile is accepted for saving.
    pub fn validate(&self) -> Result<()> {
        if !(1900..=2100).contains(&self.year) {
            return Err(GuruError::config(format!(
                "birth year out of range: {}",
                self.year
            )));
        }
        if !(1..=12).contains(&self.month) {
            return Err(GuruError::config(format!(
                "birth month out of range: {}",
                self.month
            )));
        }
        if !(1..=31).contains(&self.day) {
            return Err(GuruError::config(format!(
                "birth day out of range: {}",
                self.day
            )));
        }
        if self.hour > 23 {
            return Err(GuruError::config(format!(
                "birth hour out of range: {}",
                self.hour
            )));
        }
        if self.birthplace.trim().is_empty() {
            return Err(GuruError::config("birthplace must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> BirthProfile {
        BirthProfile {
            year: 1992,
            month: 4,
            day: 17,
            hour: 9,
            gender: Gender::Female,
            birthplace: "Guangzhou".to_string(),
        }
    }

    #[test]
    fn valid_profile_passes() {
        assert!(profile().validate().is_ok());
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        let mut p = profile();
        p.month = 13;
        assert!(p.validate().is_err());

        let mut p = profile();
        p.hour = 24;
        assert!(p.validate().is_err());

        let mut p = profile();
        p.birthplace = "   ".to_string();
        assert!(p.validate().is_err());
    }

    #[test]
    fn gender_matches_deployed_document_values() {
        let json = serde_json::to_string(&Gender::Male).unwrap();
        assert_eq!(json, "\"Male\"");
        let back: Gender = serde_json::from_str("\"Female\"").unwrap();
        assert_eq!(back, Gender::Female);
    }
}

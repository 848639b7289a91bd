//! Five-element (Wu Xing) domain model.
//!
//! The profile-generation flow distills a full BaZhi chart into counts of
//! the five elements across the four pillars. Each pillar contributes a
//! heavenly stem and an earthly branch, so the counts of a valid chart
//! always sum to eight.

use crate::error::{GuruError, Result};
use serde::{Deserialize, Serialize};

/// Stems and branches across the four pillars; two characters per pillar.
pub const PILLAR_CHARACTERS: u8 = 8;

/// One of the five elements.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    Wood,
    Fire,
    Earth,
    Metal,
    Water,
}

impl Element {
    /// Parses an element from model output, accepting any ASCII casing as
    /// well as the single-character Chinese names.
    pub fn from_alias(raw: &str) -> Option<Element> {
        let trimmed = raw.trim();
        if let Ok(element) = trimmed.parse::<Element>() {
            return Some(element);
        }
        match trimmed {
            "木" => Some(Element::Wood),
            "火" => Some(Element::Fire),
            "土" => Some(Element::Earth),
            "金" => Some(Element::Metal),
            "水" => Some(Element::Water),
            _ => None,
        }
    }

    /// Chinese character for the element.
    pub fn label_zh(&self) -> &'static str {
        match self {
            Element::Wood => "木",
            Element::Fire => "火",
            Element::Earth => "土",
            Element::Metal => "金",
            Element::Water => "水",
        }
    }
}

/// Element frequencies over the eight chart characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCounts {
    pub wood: u8,
    pub fire: u8,
    pub earth: u8,
    pub metal: u8,
    pub water: u8,
}

impl ElementCounts {
    pub fn get(&self, element: Element) -> u8 {
        match element {
            Element::Wood => self.wood,
            Element::Fire => self.fire,
            Element::Earth => self.earth,
            Element::Metal => self.metal,
            Element::Water => self.water,
        }
    }

    pub fn set(&mut self, element: Element, count: u8) {
        match element {
            Element::Wood => self.wood = count,
            Element::Fire => self.fire = count,
            Element::Earth => self.earth = count,
            Element::Metal => self.metal = count,
            Element::Water => self.water = count,
        }
    }

    pub fn total(&self) -> u32 {
        self.wood as u32
            + self.fire as u32
            + self.earth as u32
            + self.metal as u32
            + self.water as u32
    }

    /// A chart covers exactly [`PILLAR_CHARACTERS`] stem/branch characters;
    /// any other total means the extraction miscounted.
    pub fn validate(&self) -> Result<()> {
        if self.total() != PILLAR_CHARACTERS as u32 {
            return Err(GuruError::parse(format!(
                "element counts sum to {}, expected {}",
                self.total(),
                PILLAR_CHARACTERS
            )));
        }
        Ok(())
    }
}

/// The persisted elemental reading for a user.
///
/// The native analysis and the structured fields are written together when
/// the profile-generation flow completes; the English analysis arrives
/// later through a merge update once its background translation resolves,
/// and may stay absent indefinitely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementalProfile {
    pub elements: ElementCounts,
    pub description_zh: String,
    pub description_en: String,
    pub summary_zh: String,
    pub summary_en: String,
    pub full_analysis_zh: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_analysis_en: Option<String>,
    pub generated_at: String,
}

/// Merge patch for the elemental profile.
///
/// Absent fields leave the stored values untouched. The background
/// translation path writes `{full_analysis_en}` alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementalUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<ElementCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_analysis_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_analysis_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

impl ElementalUpdate {
    /// Patch carrying only the translated analysis.
    pub fn analysis_en(text: impl Into<String>) -> Self {
        Self {
            full_analysis_en: Some(text.into()),
            ..Self::default()
        }
    }

    /// Applies this patch over an existing profile, or materializes a new
    /// one when the patch carries every required field.
    ///
    /// A partial patch against an absent profile fails with `NotFound`;
    /// the translation merge must never create a half-empty record.
    pub fn apply_to(self, existing: Option<ElementalProfile>) -> Result<ElementalProfile> {
        match existing {
            Some(mut profile) => {
                if let Some(elements) = self.elements {
                    profile.elements = elements;
                }
                if let Some(v) = self.description_zh {
                    profile.description_zh = v;
                }
                if let Some(v) = self.description_en {
                    profile.description_en = v;
                }
                if let Some(v) = self.summary_zh {
                    profile.summary_zh = v;
                }
                if let Some(v) = self.summary_en {
                    profile.summary_en = v;
                }
                if let Some(v) = self.full_analysis_zh {
                    profile.full_analysis_zh = v;
                }
                if let Some(v) = self.full_analysis_en {
                    profile.full_analysis_en = Some(v);
                }
                if let Some(v) = self.generated_at {
                    profile.generated_at = v;
                }
                Ok(profile)
            }
            None => {
                let (
                    Some(elements),
                    Some(description_zh),
                    Some(description_en),
                    Some(summary_zh),
                    Some(summary_en),
                    Some(full_analysis_zh),
                    Some(generated_at),
                ) = (
                    self.elements,
                    self.description_zh,
                    self.description_en,
                    self.summary_zh,
                    self.summary_en,
                    self.full_analysis_zh,
                    self.generated_at,
                )
                else {
                    return Err(GuruError::not_found("elemental_profile", "partial update"));
                };
                Ok(ElementalProfile {
                    elements,
                    description_zh,
                    description_en,
                    summary_zh,
                    summary_en,
                    full_analysis_zh,
                    full_analysis_en: self.full_analysis_en,
                    generated_at,
                })
            }
        }
    }
}

impl From<ElementalProfile> for ElementalUpdate {
    fn from(profile: ElementalProfile) -> Self {
        Self {
            elements: Some(profile.elements),
            description_zh: Some(profile.description_zh),
            description_en: Some(profile.description_en),
            summary_zh: Some(profile.summary_zh),
            summary_en: Some(profile.summary_en),
            full_analysis_zh: Some(profile.full_analysis_zh),
            full_analysis_en: profile.full_analysis_en,
            generated_at: Some(profile.generated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> ElementCounts {
        ElementCounts {
            wood: 2,
            fire: 1,
            earth: 2,
            metal: 1,
            water: 2,
        }
    }

    fn profile() -> ElementalProfile {
        ElementalProfile {
            elements: counts(),
            description_zh: "木旺".into(),
            description_en: "Wood is strong".into(),
            summary_zh: "平衡".into(),
            summary_en: "Balanced".into(),
            full_analysis_zh: "完整分析".into(),
            full_analysis_en: None,
            generated_at: "2024-06-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn counts_must_cover_eight_characters() {
        assert!(counts().validate().is_ok());

        let short = ElementCounts {
            wood: 1,
            ..Default::default()
        };
        assert!(short.validate().is_err());
    }

    #[test]
    fn element_aliases_accept_casing_and_chinese() {
        assert_eq!(Element::from_alias("Wood"), Some(Element::Wood));
        assert_eq!(Element::from_alias("  FIRE "), Some(Element::Fire));
        assert_eq!(Element::from_alias("水"), Some(Element::Water));
        assert_eq!(Element::from_alias("plasma"), None);
    }

    #[test]
    fn partial_update_merges_into_existing() {
        let merged = ElementalUpdate::analysis_en("Full analysis")
            .apply_to(Some(profile()))
            .unwrap();
        assert_eq!(merged.full_analysis_en.as_deref(), Some("Full analysis"));
        assert_eq!(merged.summary_en, "Balanced");
    }

    #[test]
    fn partial_update_without_base_is_rejected() {
        let err = ElementalUpdate::analysis_en("late translation")
            .apply_to(None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn full_update_materializes_profile() {
        let update: ElementalUpdate = profile().into();
        let created = update.apply_to(None).unwrap();
        assert_eq!(created, profile());
    }
}

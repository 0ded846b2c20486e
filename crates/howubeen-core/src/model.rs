//! Shared records for users, contacts and check-ins.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A registered user. Owned by the account subsystem; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    /// Address the user's own reminders are delivered to.
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// Someone to alert when a user stops checking in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub address: String,
}

/// Mood scale shared by the user-declared status and the derived mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Negative,
    Neutral,
    Positive,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Negative => "negative",
            Mood::Neutral => "neutral",
            Mood::Positive => "positive",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Mood::Negative => "😞",
            Mood::Neutral => "😐",
            Mood::Positive => "🙂",
        }
    }
}

impl FromStr for Mood {
    type Err = ValidationError;

    /// Accepts the canonical names, a few common synonyms, and the emoji.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "negative" | "bad" | "down" | "😞" => Ok(Mood::Negative),
            "neutral" | "ok" | "okay" | "😐" => Ok(Mood::Neutral),
            "positive" | "good" | "happy" | "🙂" => Ok(Mood::Positive),
            other => Err(ValidationError::InvalidValue {
                field: "status".into(),
                message: format!("unknown mood '{other}'"),
            }),
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Life area a check-in talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FocusArea {
    Academics,
    Athletics,
    Social,
    #[serde(rename = "Personal Growth")]
    PersonalGrowth,
    /// The text did not point at any area.
    None,
    /// No analysis was possible.
    Unknown,
}

impl FocusArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusArea::Academics => "Academics",
            FocusArea::Athletics => "Athletics",
            FocusArea::Social => "Social",
            FocusArea::PersonalGrowth => "Personal Growth",
            FocusArea::None => "None",
            FocusArea::Unknown => "Unknown",
        }
    }

    /// Lenient parse used on capability output; unrecognized values are `None`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "academics" => FocusArea::Academics,
            "athletics" => FocusArea::Athletics,
            "social" => FocusArea::Social,
            "personal growth" | "personal_growth" => FocusArea::PersonalGrowth,
            "unknown" => FocusArea::Unknown,
            _ => FocusArea::None,
        }
    }
}

impl fmt::Display for FocusArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the user is moving toward their goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alignment {
    #[serde(rename = "On track")]
    OnTrack,
    Neutral,
    #[serde(rename = "Off track")]
    OffTrack,
}

impl Alignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::OnTrack => "On track",
            Alignment::Neutral => "Neutral",
            Alignment::OffTrack => "Off track",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "on track" | "on_track" => Alignment::OnTrack,
            "off track" | "off_track" => Alignment::OffTrack,
            _ => Alignment::Neutral,
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the enrichment step for a stored check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    /// Base record written, enrichment not applied yet.
    Pending,
    /// Insights came from the capability.
    Complete,
    /// Insights are the documented defaults.
    Degraded,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Complete => "complete",
            EnrichmentStatus::Degraded => "degraded",
        }
    }
}

impl FromStr for EnrichmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnrichmentStatus::Pending),
            "complete" => Ok(EnrichmentStatus::Complete),
            "degraded" => Ok(EnrichmentStatus::Degraded),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Voice,
}

/// Structured insight derived from a check-in's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub mood: Mood,
    pub focus_area: FocusArea,
    pub alignment: Alignment,
    pub takeaway: String,
}

/// One user's check-in for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinRecord {
    pub id: i64,
    pub user_id: String,
    pub date: NaiveDate,
    pub raw_input: Option<String>,
    pub voice_reference: Option<String>,
    pub transcript: Option<String>,
    /// Mood the user picked explicitly.
    pub status: Option<Mood>,
    /// Mood derived by enrichment (or the fallback).
    pub mood: Option<Mood>,
    pub focus_area: Option<FocusArea>,
    pub alignment: Option<Alignment>,
    pub takeaway: Option<String>,
    pub enrichment: EnrichmentStatus,
    pub created_at: DateTime<Utc>,
    /// Time of the latest submission for this day; enrichment does not move it.
    pub updated_at: DateTime<Utc>,
}

impl CheckinRecord {
    pub fn input_type(&self) -> InputType {
        if self.voice_reference.is_some() {
            InputType::Voice
        } else {
            InputType::Text
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.enrichment == EnrichmentStatus::Degraded
    }

    /// Last moment the user was demonstrably active through this record.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.updated_at.max(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_parses_names_and_emoji() {
        assert_eq!("good".parse::<Mood>().unwrap(), Mood::Positive);
        assert_eq!("😞".parse::<Mood>().unwrap(), Mood::Negative);
        assert_eq!(" Neutral ".parse::<Mood>().unwrap(), Mood::Neutral);
        assert!("ecstatic".parse::<Mood>().is_err());
    }

    #[test]
    fn focus_area_serializes_display_names() {
        let json = serde_json::to_string(&FocusArea::PersonalGrowth).unwrap();
        assert_eq!(json, "\"Personal Growth\"");
        assert_eq!(FocusArea::parse_lenient("Basket weaving"), FocusArea::None);
    }

    #[test]
    fn alignment_lenient_parse_defaults_to_neutral() {
        assert_eq!(Alignment::parse_lenient("On track"), Alignment::OnTrack);
        assert_eq!(Alignment::parse_lenient("sideways"), Alignment::Neutral);
    }
}

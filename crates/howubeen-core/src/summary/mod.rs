//! Weekly summaries of a user's check-ins.
//!
//! A week runs Monday through Sunday. The digest is computed locally from
//! the stored check-ins and always exists; the prose may come from the
//! enrichment capability or, without one, is built from the digest.

mod generator;

pub use generator::{DueReport, SummarizerSettings, WeeklySummarizer};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Alignment, CheckinRecord, EnrichmentStatus, FocusArea, Mood};

/// Direction the mood took over the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodTrend {
    Improving,
    Declining,
    Steady,
    /// Fewer than two days with a known mood.
    Insufficient,
}

impl MoodTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoodTrend::Improving => "improving",
            MoodTrend::Declining => "declining",
            MoodTrend::Steady => "steady",
            MoodTrend::Insufficient => "insufficient",
        }
    }
}

impl FromStr for MoodTrend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "improving" => Ok(MoodTrend::Improving),
            "declining" => Ok(MoodTrend::Declining),
            "steady" => Ok(MoodTrend::Steady),
            "insufficient" => Ok(MoodTrend::Insufficient),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for MoodTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the summary prose came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// Written by the enrichment capability.
    Generated,
    /// Built from the digest alone.
    Aggregate,
}

impl SummarySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummarySource::Generated => "generated",
            SummarySource::Aggregate => "aggregate",
        }
    }
}

impl FromStr for SummarySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(SummarySource::Generated),
            "aggregate" => Ok(SummarySource::Aggregate),
            other => Err(other.to_string()),
        }
    }
}

/// Alignment labels counted across the week's analyzed check-ins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentTally {
    pub on_track: u32,
    pub neutral: u32,
    pub off_track: u32,
}

impl AlignmentTally {
    fn record(&mut self, alignment: Alignment) {
        match alignment {
            Alignment::OnTrack => self.on_track += 1,
            Alignment::Neutral => self.neutral += 1,
            Alignment::OffTrack => self.off_track += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.on_track + self.neutral + self.off_track
    }
}

/// Numbers computed from one week of check-ins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekDigest {
    /// Monday of the week
    pub week_start: NaiveDate,
    /// Sunday of the week
    pub week_end: NaiveDate,
    pub checkin_count: u32,
    /// Known moods in date order
    pub moods: Vec<Mood>,
    pub mood_trend: MoodTrend,
    /// Most mentioned area; `None` when no analyzed check-in named one
    pub dominant_focus: Option<FocusArea>,
    pub alignment: AlignmentTally,
}

impl WeekDigest {
    /// Digest the check-ins of the week containing `week_start`.
    ///
    /// Records outside the week are ignored; order does not matter.
    pub fn from_checkins(week_start: NaiveDate, records: &[CheckinRecord]) -> Self {
        let (week_start, week_end) = week_bounds(week_start);
        let mut in_week: Vec<&CheckinRecord> = records
            .iter()
            .filter(|r| r.date >= week_start && r.date <= week_end)
            .collect();
        in_week.sort_by_key(|r| r.date);

        let moods: Vec<Mood> = in_week.iter().filter_map(|r| observed_mood(r)).collect();

        let mut alignment = AlignmentTally::default();
        let mut focus_counts: HashMap<FocusArea, (u32, usize)> = HashMap::new();
        for (position, record) in in_week.iter().enumerate() {
            if record.enrichment != EnrichmentStatus::Complete {
                continue;
            }
            if let Some(value) = record.alignment {
                alignment.record(value);
            }
            match record.focus_area {
                Some(FocusArea::None) | Some(FocusArea::Unknown) | None => {}
                Some(area) => {
                    let entry = focus_counts.entry(area).or_insert((0, position));
                    entry.0 += 1;
                }
            }
        }

        // Highest count wins; ties go to the area mentioned first.
        let dominant_focus = focus_counts
            .into_iter()
            .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                count_a.cmp(count_b).then(first_b.cmp(first_a))
            })
            .map(|(area, _)| area);

        Self {
            week_start,
            week_end,
            checkin_count: in_week.len() as u32,
            mood_trend: mood_trend(&moods),
            moods,
            dominant_focus,
            alignment,
        }
    }

    /// Summary prose built from the numbers alone.
    pub fn plain_text(&self) -> String {
        let mut text = format!(
            "Week of {} to {}: {} check-in{}.",
            self.week_start,
            self.week_end,
            self.checkin_count,
            if self.checkin_count == 1 { "" } else { "s" }
        );

        if !self.moods.is_empty() {
            let faces: Vec<&str> = self.moods.iter().map(Mood::emoji).collect();
            text.push_str(&format!(" Mood {}", faces.join(" ")));
            match self.mood_trend {
                MoodTrend::Insufficient => text.push('.'),
                trend => text.push_str(&format!(" ({trend}).")),
            }
        }

        if let Some(area) = self.dominant_focus {
            text.push_str(&format!(" Most talked about: {area}."));
        }

        if self.alignment.total() > 0 {
            text.push_str(&format!(
                " Alignment: {} on track, {} neutral, {} off track.",
                self.alignment.on_track, self.alignment.neutral, self.alignment.off_track
            ));
        }
        text
    }
}

/// A stored weekly summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySummary {
    /// Row id; ignored when writing.
    pub id: i64,
    pub user_id: String,
    #[serde(flatten)]
    pub digest: WeekDigest,
    pub summary_text: String,
    pub source: SummarySource,
    pub generated_at: DateTime<Utc>,
}

/// Monday and Sunday of the week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

/// Monday of the latest week that has ended by the close of `today`.
///
/// On a Sunday that is the current week.
pub fn last_complete_week(today: NaiveDate) -> NaiveDate {
    let (monday, sunday) = week_bounds(today);
    if sunday == today {
        monday
    } else {
        monday - Duration::days(7)
    }
}

/// Text handed to the summary capability: one block per check-in, oldest first.
pub fn summary_input(digest: &WeekDigest, records: &[CheckinRecord]) -> String {
    let mut in_week: Vec<&CheckinRecord> = records
        .iter()
        .filter(|r| r.date >= digest.week_start && r.date <= digest.week_end)
        .collect();
    in_week.sort_by_key(|r| r.date);

    let blocks: Vec<String> = in_week
        .iter()
        .map(|r| {
            let input = r
                .transcript
                .as_deref()
                .or(r.raw_input.as_deref())
                .unwrap_or("No input");
            format!(
                "Date: {}\nInput: {}\nMood: {}\nFocus: {}\nAlignment: {}",
                r.date,
                input,
                observed_mood(r).map_or("N/A", |m| m.as_str()),
                r.focus_area.map_or("N/A", |f| f.as_str()),
                r.alignment.map_or("N/A", |a| a.as_str()),
            )
        })
        .collect();

    format!(
        "Week: {} to {}\n\n{}",
        digest.week_start,
        digest.week_end,
        blocks.join("\n\n---\n\n")
    )
}

/// The analyzed mood, or the user's own pick when analysis did not run.
fn observed_mood(record: &CheckinRecord) -> Option<Mood> {
    if record.enrichment == EnrichmentStatus::Complete {
        record.mood.or(record.status)
    } else {
        record.status
    }
}

fn mood_score(mood: Mood) -> i32 {
    match mood {
        Mood::Negative => -1,
        Mood::Neutral => 0,
        Mood::Positive => 1,
    }
}

/// Compare the mean of the first half of the week with the second half.
fn mood_trend(moods: &[Mood]) -> MoodTrend {
    if moods.len() < 2 {
        return MoodTrend::Insufficient;
    }
    let half = moods.len() / 2;
    let mean = |slice: &[Mood]| {
        slice.iter().map(|m| mood_score(*m)).sum::<i32>() as f64 / slice.len() as f64
    };
    let shift = mean(&moods[moods.len() - half..]) - mean(&moods[..half]);
    if shift >= 0.5 {
        MoodTrend::Improving
    } else if shift <= -0.5 {
        MoodTrend::Declining
    } else {
        MoodTrend::Steady
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn analyzed(date: &str, mood: Mood, focus: FocusArea, alignment: Alignment) -> CheckinRecord {
        let at = Utc::now();
        CheckinRecord {
            id: 0,
            user_id: "u1".into(),
            date: day(date),
            raw_input: Some(format!("note for {date}")),
            voice_reference: None,
            transcript: None,
            status: None,
            mood: Some(mood),
            focus_area: Some(focus),
            alignment: Some(alignment),
            takeaway: None,
            enrichment: EnrichmentStatus::Complete,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn week_bounds_run_monday_to_sunday() {
        // 2026-03-04 is a Wednesday.
        assert_eq!(week_bounds(day("2026-03-04")), (day("2026-03-02"), day("2026-03-08")));
        assert_eq!(week_bounds(day("2026-03-02")), (day("2026-03-02"), day("2026-03-08")));
        assert_eq!(week_bounds(day("2026-03-08")), (day("2026-03-02"), day("2026-03-08")));
    }

    #[test]
    fn last_complete_week_includes_today_on_sunday() {
        assert_eq!(last_complete_week(day("2026-03-08")), day("2026-03-02"));
        assert_eq!(last_complete_week(day("2026-03-09")), day("2026-03-02"));
        assert_eq!(last_complete_week(day("2026-03-14")), day("2026-03-02"));
    }

    #[test]
    fn digest_tracks_trend_focus_and_alignment() {
        let records = vec![
            analyzed("2026-03-05", Mood::Positive, FocusArea::Social, Alignment::OnTrack),
            analyzed("2026-03-02", Mood::Negative, FocusArea::Academics, Alignment::OffTrack),
            analyzed("2026-03-03", Mood::Neutral, FocusArea::Academics, Alignment::Neutral),
            analyzed("2026-03-06", Mood::Positive, FocusArea::None, Alignment::OnTrack),
            // Next week; ignored.
            analyzed("2026-03-09", Mood::Negative, FocusArea::Social, Alignment::OffTrack),
        ];

        let digest = WeekDigest::from_checkins(day("2026-03-04"), &records);

        assert_eq!(digest.week_start, day("2026-03-02"));
        assert_eq!(digest.checkin_count, 4);
        assert_eq!(
            digest.moods,
            vec![Mood::Negative, Mood::Neutral, Mood::Positive, Mood::Positive]
        );
        assert_eq!(digest.mood_trend, MoodTrend::Improving);
        assert_eq!(digest.dominant_focus, Some(FocusArea::Academics));
        assert_eq!(
            digest.alignment,
            AlignmentTally {
                on_track: 2,
                neutral: 1,
                off_track: 1
            }
        );
    }

    #[test]
    fn focus_tie_goes_to_first_mentioned() {
        let records = vec![
            analyzed("2026-03-03", Mood::Neutral, FocusArea::Athletics, Alignment::Neutral),
            analyzed("2026-03-02", Mood::Neutral, FocusArea::Social, Alignment::Neutral),
        ];
        let digest = WeekDigest::from_checkins(day("2026-03-02"), &records);
        assert_eq!(digest.dominant_focus, Some(FocusArea::Social));
        assert_eq!(digest.mood_trend, MoodTrend::Steady);
    }

    #[test]
    fn degraded_checkins_count_only_declared_mood() {
        let mut record = analyzed("2026-03-02", Mood::Neutral, FocusArea::Unknown, Alignment::Neutral);
        record.enrichment = EnrichmentStatus::Degraded;
        record.status = Some(Mood::Negative);

        let digest = WeekDigest::from_checkins(day("2026-03-02"), &[record]);

        assert_eq!(digest.moods, vec![Mood::Negative]);
        assert_eq!(digest.mood_trend, MoodTrend::Insufficient);
        assert_eq!(digest.dominant_focus, None);
        assert_eq!(digest.alignment.total(), 0);
    }

    #[test]
    fn plain_text_shows_mood_faces() {
        let records = vec![
            analyzed("2026-03-02", Mood::Positive, FocusArea::Athletics, Alignment::OnTrack),
            analyzed("2026-03-03", Mood::Negative, FocusArea::Athletics, Alignment::OffTrack),
        ];
        let text = WeekDigest::from_checkins(day("2026-03-02"), &records).plain_text();
        assert_eq!(
            text,
            "Week of 2026-03-02 to 2026-03-08: 2 check-ins. Mood 🙂 😞 (declining). \
             Most talked about: Athletics. Alignment: 1 on track, 0 neutral, 1 off track."
        );
    }

    #[test]
    fn summary_input_prefers_transcript() {
        let mut record = analyzed("2026-03-02", Mood::Positive, FocusArea::Athletics, Alignment::OnTrack);
        record.transcript = Some("ran 5k".into());
        let digest = WeekDigest::from_checkins(day("2026-03-02"), std::slice::from_ref(&record));

        let input = summary_input(&digest, &[record]);
        assert!(input.starts_with("Week: 2026-03-02 to 2026-03-08"));
        assert!(input.contains("Input: ran 5k\nMood: positive\nFocus: Athletics\nAlignment: On track"));
    }
}

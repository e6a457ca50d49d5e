use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The milestone date fields this tool keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MilestoneField {
    PrdDueDate,
    PrdReviewDueDate,
    StartDate,
    CodeCompleteTarget,
    ReleaseCandidateTarget,
    PreviewEstDate,
    GaEstimatedDate,
}

impl MilestoneField {
    pub const ALL: [MilestoneField; 7] = [
        MilestoneField::PrdDueDate,
        MilestoneField::PrdReviewDueDate,
        MilestoneField::StartDate,
        MilestoneField::CodeCompleteTarget,
        MilestoneField::ReleaseCandidateTarget,
        MilestoneField::PreviewEstDate,
        MilestoneField::GaEstimatedDate,
    ];

    /// Display label as configured in Jira.
    pub fn label(self) -> &'static str {
        match self {
            MilestoneField::PrdDueDate => "PRD Due Date",
            MilestoneField::PrdReviewDueDate => "PRD Review Due Date",
            MilestoneField::StartDate => "Start date",
            MilestoneField::CodeCompleteTarget => "Code Complete Target",
            MilestoneField::ReleaseCandidateTarget => "Release candidate Target",
            MilestoneField::PreviewEstDate => "Preview Est. Date",
            MilestoneField::GaEstimatedDate => "GA Estimated Date",
        }
    }

    /// Case-insensitive exact match on the label.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for MilestoneField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Wire format of a date field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldFormat {
    /// Classic Jira date picker: `2024-06-01`.
    Date,
    /// Classic Jira date-time picker: `2024-06-01T12:00:00.000+0000`.
    DateTime,
    /// Product Discovery string field holding `{"start": .., "end": ..}`.
    JpdInterval,
}

impl FieldFormat {
    /// Picks a format from the `schema.type` reported by `GET /field`.
    pub fn from_schema_type(schema_type: &str) -> Self {
        match schema_type {
            "date" => FieldFormat::Date,
            "datetime" => FieldFormat::DateTime,
            _ => FieldFormat::JpdInterval,
        }
    }

    pub fn serialize(self, date: NaiveDate) -> Value {
        let day = date.format("%Y-%m-%d").to_string();
        match self {
            FieldFormat::Date => Value::String(day),
            // Noon UTC stays on the same calendar day for offsets -12:00..=+11:00
            FieldFormat::DateTime => Value::String(format!("{day}T12:00:00.000+0000")),
            FieldFormat::JpdInterval => {
                Value::String(json!({ "start": day, "end": day }).to_string())
            }
        }
    }
}

/// State of one milestone field on one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum FieldValue {
    /// The project has no such field.
    NotPresent,
    /// The field exists but is empty.
    Unset,
    Set { date: NaiveDate },
    /// The field holds something that is not a date.
    Invalid { raw: String, reason: String },
}

impl FieldValue {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Set { date } => Some(*date),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FieldValue::NotPresent => "Not present".to_string(),
            FieldValue::Unset => "Not set".to_string(),
            FieldValue::Set { date } => date.format("%B %d, %Y").to_string(),
            FieldValue::Invalid { raw, .. } => format!("Invalid ({raw})"),
        }
    }
}

/// Milestone values of one issue, keyed by the closed field enum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneDateSet {
    values: BTreeMap<MilestoneField, FieldValue>,
}

impl MilestoneDateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: MilestoneField, value: FieldValue) {
        self.values.insert(field, value);
    }

    /// Missing entries read as [`FieldValue::NotPresent`].
    pub fn get(&self, field: MilestoneField) -> &FieldValue {
        self.values.get(&field).unwrap_or(&FieldValue::NotPresent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MilestoneField, &FieldValue)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }

    pub fn populated(&self) -> impl Iterator<Item = (MilestoneField, NaiveDate)> + '_ {
        self.iter()
            .filter_map(|(field, value)| value.date().map(|date| (field, date)))
    }

    pub fn populated_count(&self) -> usize {
        self.populated().count()
    }
}

/// Parses a raw Jira field value into a [`FieldValue`].
///
/// Accepts plain dates, date-times (the day part is kept) and Product
/// Discovery interval JSON, either as a string or an embedded object.
pub fn parse_value(raw: &Value) -> FieldValue {
    match raw {
        Value::Null => FieldValue::Unset,
        Value::String(s) if s.trim().is_empty() => FieldValue::Unset,
        Value::String(s) => parse_text(s.trim()),
        Value::Object(_) => parse_interval(raw).unwrap_or_else(|| invalid(raw, "object without a start/end date")),
        _ => invalid(raw, "not a date value"),
    }
}

fn parse_text(text: &str) -> FieldValue {
    if text.starts_with('{') {
        return match serde_json::from_str::<Value>(text) {
            Ok(value) => parse_interval(&value)
                .unwrap_or_else(|| invalid_text(text, "interval without a start/end date")),
            Err(e) => invalid_text(text, &format!("malformed interval JSON: {e}")),
        };
    }

    match parse_day(text) {
        Some(date) => FieldValue::Set { date },
        None => invalid_text(text, "unrecognized date format"),
    }
}

/// Start date, falling back to the end date. `None` when the value is not an interval.
fn parse_interval(value: &Value) -> Option<FieldValue> {
    let bound = |key: &str| {
        value
            .get(key)
            .filter(|v| !v.is_null() && v.as_str().map_or(true, |s| !s.trim().is_empty()))
    };

    match bound("start").or_else(|| bound("end")) {
        Some(day) => day
            .as_str()
            .and_then(|s| parse_day(s.trim()))
            .map(|date| FieldValue::Set { date }),
        None if value.get("start").is_some() || value.get("end").is_some() => Some(FieldValue::Unset),
        None => None,
    }
}

/// `2024-06-01`, `2024-06-01T10:00:00.000+0000` or `2024-06-01 10:00`.
fn parse_day(text: &str) -> Option<NaiveDate> {
    let day = text.split(&['T', ' '][..]).next().unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn invalid(raw: &Value, reason: &str) -> FieldValue {
    invalid_text(&raw.to_string(), reason)
}

fn invalid_text(raw: &str, reason: &str) -> FieldValue {
    FieldValue::Invalid {
        raw: raw.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_from_label_is_case_insensitive_and_exact() {
        assert_eq!(
            MilestoneField::from_label("prd due date"),
            Some(MilestoneField::PrdDueDate)
        );
        assert_eq!(
            MilestoneField::from_label("GA ESTIMATED DATE"),
            Some(MilestoneField::GaEstimatedDate)
        );
        assert_eq!(MilestoneField::from_label("PRD Due"), None);
        assert_eq!(MilestoneField::from_label("Start date (old)"), None);
    }

    #[test]
    fn test_parse_classic_formats() {
        assert_eq!(
            parse_value(&json!("2024-06-01")),
            FieldValue::Set { date: day("2024-06-01") }
        );
        assert_eq!(
            parse_value(&json!("2024-06-01T23:30:00.000-0700")),
            FieldValue::Set { date: day("2024-06-01") }
        );
        assert_eq!(parse_value(&Value::Null), FieldValue::Unset);
        assert_eq!(parse_value(&json!("  ")), FieldValue::Unset);
    }

    #[test]
    fn test_parse_jpd_interval() {
        let raw = json!(r#"{"start":"2024-07-15","end":"2024-07-15"}"#);
        assert_eq!(parse_value(&raw), FieldValue::Set { date: day("2024-07-15") });

        let object = json!({ "start": "2024-08-01", "end": "2024-08-31" });
        assert_eq!(parse_value(&object), FieldValue::Set { date: day("2024-08-01") });
    }

    #[test]
    fn test_parse_jpd_interval_with_empty_bounds() {
        let open_start = json!(r#"{"start":null,"end":"2024-08-01"}"#);
        assert_eq!(parse_value(&open_start), FieldValue::Set { date: day("2024-08-01") });

        let blank_start = json!({ "start": "", "end": "2024-09-30" });
        assert_eq!(parse_value(&blank_start), FieldValue::Set { date: day("2024-09-30") });

        assert_eq!(parse_value(&json!(r#"{"start":null,"end":null}"#)), FieldValue::Unset);
        assert!(matches!(parse_value(&json!({ "due": "2024-08-01" })), FieldValue::Invalid { .. }));
        assert!(matches!(parse_value(&json!({ "start": 20240801 })), FieldValue::Invalid { .. }));
    }

    #[test]
    fn test_unparsable_values_are_invalid() {
        assert!(matches!(parse_value(&json!("next quarter")), FieldValue::Invalid { .. }));
        assert!(matches!(parse_value(&json!("{broken")), FieldValue::Invalid { .. }));
        assert!(matches!(parse_value(&json!(42)), FieldValue::Invalid { .. }));
    }

    #[test]
    fn test_serialize_per_format() {
        let date = day("2024-06-01");
        assert_eq!(FieldFormat::Date.serialize(date), json!("2024-06-01"));
        assert_eq!(
            FieldFormat::DateTime.serialize(date),
            json!("2024-06-01T12:00:00.000+0000")
        );
        let jpd = FieldFormat::JpdInterval.serialize(date);
        assert_eq!(parse_value(&jpd), FieldValue::Set { date });
    }

    #[test]
    fn test_datetime_keeps_its_day_in_other_time_zones() {
        use chrono::{DateTime, FixedOffset};

        let date = day("2024-06-01");
        let written = FieldFormat::DateTime.serialize(date);
        let instant = DateTime::parse_from_str(written.as_str().unwrap(), "%Y-%m-%dT%H:%M:%S%.3f%z").unwrap();

        // Jira answers in the reading user's zone
        for hours in [-12, -7, 0, 5, 11] {
            let zone = FixedOffset::east_opt(hours * 3600).unwrap();
            let shown = instant.with_timezone(&zone).format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string();
            assert_eq!(parse_value(&json!(shown)), FieldValue::Set { date }, "offset {hours}");
        }
        assert_eq!(
            parse_value(&json!("2024-06-01T05:00:00.000-0700")),
            FieldValue::Set { date }
        );
    }

    #[test]
    fn test_date_set_defaults_to_not_present() {
        let mut dates = MilestoneDateSet::new();
        dates.insert(MilestoneField::StartDate, FieldValue::Unset);
        dates.insert(
            MilestoneField::PrdDueDate,
            FieldValue::Set { date: day("2024-06-01") },
        );

        assert_eq!(dates.get(MilestoneField::GaEstimatedDate), &FieldValue::NotPresent);
        assert_eq!(dates.get(MilestoneField::StartDate), &FieldValue::Unset);
        assert_eq!(dates.populated_count(), 1);
    }
}

//! Textual casualty assessment as produced by the on-board evaluator, e.g.
//! `{"Severe Hemorrhage": "Absent", "Heart Rate": 72, "Motor": "Normal"}`.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::coord::Coordinate;
use crate::report::{SystemId, TriageReport};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssessmentError {
    #[error("unknown {field} label {label:?}")]
    UnknownLabel { field: &'static str, label: String },

    #[error("{field} = {value} is out of range")]
    InvalidNumber { field: &'static str, value: u32 },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Assessment {
    #[serde(rename = "Severe Hemorrhage")]
    pub severe_hemorrhage: Option<String>,
    #[serde(rename = "Respiratory Distress")]
    pub respiratory_distress: Option<String>,
    #[serde(rename = "Heart Rate")]
    pub heart_rate: Option<u32>,
    #[serde(rename = "Respiratory Rate")]
    pub respiratory_rate: Option<u32>,
    #[serde(rename = "Head")]
    pub head: Option<String>,
    #[serde(rename = "Torso")]
    pub torso: Option<String>,
    // the evaluator misspells these keys
    #[serde(rename = "Lower Extremities", alias = "Lower Extermities")]
    pub lower_extremities: Option<String>,
    #[serde(rename = "Upper Extremities", alias = "Upper Extermities")]
    pub upper_extremities: Option<String>,
    #[serde(rename = "Ocular")]
    pub ocular: Option<String>,
    #[serde(rename = "Verbal")]
    pub verbal: Option<String>,
    #[serde(rename = "Motor")]
    pub motor: Option<String>,
}

const PRESENCE: &[&str] = &["absent", "present"];
const TRAUMA: &[&str] = &["normal", "wound"];
const EXTREMITY: &[&str] = &["normal", "wound", "amputation"];
const OCULAR: &[&str] = &["open", "closed", "nt"];
const RESPONSE: &[&str] = &["normal", "abnormal", "absent", "nt"];

impl Assessment {
    pub fn into_report(
        self,
        system: SystemId,
        location: Option<Coordinate>,
    ) -> Result<TriageReport, AssessmentError> {
        let mut r = TriageReport::new(system, location);
        r.severe_hemorrhage = label("severe_hemorrhage", PRESENCE, self.severe_hemorrhage)?;
        r.respiratory_distress = label("respiratory_distress", PRESENCE, self.respiratory_distress)?;
        r.hr = number("hr", self.heart_rate)?;
        r.rr = number("rr", self.respiratory_rate)?;
        r.trauma_head = label("trauma_head", TRAUMA, self.head)?;
        r.trauma_torso = label("trauma_torso", TRAUMA, self.torso)?;
        r.trauma_lower_ext = label("trauma_lower_ext", EXTREMITY, self.lower_extremities)?;
        r.trauma_upper_ext = label("trauma_upper_ext", EXTREMITY, self.upper_extremities)?;
        r.alertness_ocular = label("alertness_ocular", OCULAR, self.ocular)?;
        r.alertness_verbal = label("alertness_verbal", RESPONSE, self.verbal)?;
        r.alertness_motor = label("alertness_motor", RESPONSE, self.motor)?;
        debug!("assessment: {} fields mapped", r.present_fields().count());
        Ok(r)
    }
}

fn label(
    field: &'static str,
    codes: &[&str],
    value: Option<String>,
) -> Result<Option<u8>, AssessmentError> {
    let Some(value) = value else { return Ok(None) };
    let key = match value.trim().to_ascii_lowercase().as_str() {
        "not testable" | "n/t" => "nt".to_string(),
        other => other.to_string(),
    };
    codes
        .iter()
        .position(|c| *c == key)
        .map(|i| Some(i as u8))
        .ok_or(AssessmentError::UnknownLabel { field, label: value })
}

fn number(field: &'static str, value: Option<u32>) -> Result<Option<u8>, AssessmentError> {
    value
        .map(|v| u8::try_from(v).map_err(|_| AssessmentError::InvalidNumber { field, value: v }))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_evaluator_labels() {
        let a: Assessment = serde_json::from_value(json!({
            "Head": "Normal",
            "Heart Rate": 0,
            "Lower Extermities": "Normal",
            "Motor": "Absent",
            "Ocular": "Open",
            "Respiratory Distress": "Absent",
            "Respiratory Rate": 13,
            "Severe Hemorrhage": "Absent",
            "Torso": "Normal",
            "Upper Extermities": "Normal",
            "Verbal": "Absent"
        }))
        .unwrap();
        let r = a
            .into_report(SystemId::new(1).unwrap(), Some(Coordinate::new(32.6570764, -83.7562508)))
            .unwrap();

        assert_eq!(r.severe_hemorrhage, Some(0));
        assert_eq!(r.respiratory_distress, Some(0));
        assert_eq!(r.hr, Some(0));
        assert_eq!(r.rr, Some(13));
        assert_eq!(r.trauma_head, Some(0));
        assert_eq!(r.trauma_torso, Some(0));
        assert_eq!(r.trauma_lower_ext, Some(0));
        assert_eq!(r.trauma_upper_ext, Some(0));
        assert_eq!(r.alertness_ocular, Some(0));
        assert_eq!(r.alertness_motor, Some(2));
        assert_eq!(r.alertness_verbal, Some(2));
    }

    #[test]
    fn wounds_and_untestable() {
        let a = Assessment {
            lower_extremities: Some("Amputation".into()),
            ocular: Some("Not Testable".into()),
            motor: Some("NT".into()),
            ..Default::default()
        };
        let r = a.into_report(SystemId::new(2).unwrap(), None).unwrap();
        assert_eq!(r.trauma_lower_ext, Some(2));
        assert_eq!(r.alertness_ocular, Some(2));
        assert_eq!(r.alertness_motor, Some(3));
        assert_eq!(r.hr, None);
    }

    #[test]
    fn unknown_label_fails() {
        let a = Assessment { head: Some("Bruised".into()), ..Default::default() };
        let err = a.into_report(SystemId::new(2).unwrap(), None).unwrap_err();
        assert_eq!(
            err,
            AssessmentError::UnknownLabel { field: "trauma_head", label: "Bruised".into() }
        );
    }

    #[test]
    fn heart_rate_must_fit_a_byte() {
        let a = Assessment { heart_rate: Some(300), ..Default::default() };
        assert!(matches!(
            a.into_report(SystemId::new(2).unwrap(), None),
            Err(AssessmentError::InvalidNumber { field: "hr", value: 300 })
        ));
    }
}

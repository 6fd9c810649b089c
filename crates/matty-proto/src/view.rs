//! JSON shape of a casualty report as submitted to the reporting API.
//!
//! Observations that vary over time carry `{ "value", "time_ago" }`; trauma
//! codes are bare integers. Absent fields are omitted.

use serde::{Deserialize, Serialize};

use crate::coord::Coordinate;
use crate::error::ViewError;
use crate::report::{SystemId, TriageReport, VitalField};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationView {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub time_ago: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timed {
    pub value: i64,
    #[serde(default)]
    pub time_ago: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub casualty_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub system: SystemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationView>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severe_hemorrhage: Option<Timed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_distress: Option<Timed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hr: Option<Timed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rr: Option<Timed>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trauma_head: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trauma_torso: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trauma_lower_ext: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trauma_upper_ext: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertness_ocular: Option<Timed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertness_verbal: Option<Timed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertness_motor: Option<Timed>,
}

impl ReportView {
    fn empty(system: SystemId) -> Self {
        Self {
            casualty_id: None,
            team: None,
            system,
            location: None,
            severe_hemorrhage: None,
            respiratory_distress: None,
            hr: None,
            rr: None,
            trauma_head: None,
            trauma_torso: None,
            trauma_lower_ext: None,
            trauma_upper_ext: None,
            alertness_ocular: None,
            alertness_verbal: None,
            alertness_motor: None,
        }
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn value(&self, field: VitalField) -> Option<i64> {
        let timed = |t: &Option<Timed>| t.map(|t| t.value);
        match field {
            VitalField::SevereHemorrhage => timed(&self.severe_hemorrhage),
            VitalField::RespiratoryDistress => timed(&self.respiratory_distress),
            VitalField::Hr => timed(&self.hr),
            VitalField::Rr => timed(&self.rr),
            VitalField::TraumaHead => self.trauma_head,
            VitalField::TraumaTorso => self.trauma_torso,
            VitalField::TraumaLowerExt => self.trauma_lower_ext,
            VitalField::TraumaUpperExt => self.trauma_upper_ext,
            VitalField::AlertnessOcular => timed(&self.alertness_ocular),
            VitalField::AlertnessVerbal => timed(&self.alertness_verbal),
            VitalField::AlertnessMotor => timed(&self.alertness_motor),
        }
    }

    fn set(&mut self, field: VitalField, value: i64, time_ago: u32) {
        let timed = Some(Timed { value, time_ago });
        match field {
            VitalField::SevereHemorrhage => self.severe_hemorrhage = timed,
            VitalField::RespiratoryDistress => self.respiratory_distress = timed,
            VitalField::Hr => self.hr = timed,
            VitalField::Rr => self.rr = timed,
            VitalField::TraumaHead => self.trauma_head = Some(value),
            VitalField::TraumaTorso => self.trauma_torso = Some(value),
            VitalField::TraumaLowerExt => self.trauma_lower_ext = Some(value),
            VitalField::TraumaUpperExt => self.trauma_upper_ext = Some(value),
            VitalField::AlertnessOcular => self.alertness_ocular = timed,
            VitalField::AlertnessVerbal => self.alertness_verbal = timed,
            VitalField::AlertnessMotor => self.alertness_motor = timed,
        }
    }
}

impl TriageReport {
    /// API representation; `time_ago` is seconds since the observation.
    pub fn to_view(&self, time_ago: u32) -> ReportView {
        let mut view = ReportView::empty(self.system);
        view.casualty_id = self.casualty_id;
        view.location = self.location.map(|c| LocationView {
            latitude: c.lat,
            longitude: c.lon,
            time_ago,
        });
        for (field, value) in self.present_fields() {
            view.set(field, i64::from(value), time_ago);
        }
        view
    }
}

impl TryFrom<ReportView> for TriageReport {
    type Error = ViewError;

    fn try_from(view: ReportView) -> Result<Self, Self::Error> {
        let location = view.location.map(|l| Coordinate::new(l.latitude, l.longitude));
        let mut report = TriageReport::new(view.system, location);
        report.casualty_id = view.casualty_id;
        for field in VitalField::ALL {
            if let Some(value) = view.value(field) {
                let value = u8::try_from(value)
                    .map_err(|_| ViewError::InvalidValue { field: field.name(), value })?;
                *field.slot(&mut report) = Some(value);
            }
        }
        Ok(report)
    }
}

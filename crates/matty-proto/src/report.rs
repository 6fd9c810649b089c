use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::coord::Coordinate;
use crate::error::ViewError;

/// Robot identifier, rendered as `"Matty M0<N>"`.
///
/// On the wire this is the letter code `'M' - 'A'` in 5 bits followed by the
/// serial number in 3 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SystemId(u8);

impl SystemId {
    pub const LETTER_CODE: u8 = b'M' - b'A';
    pub const SERIALS: std::ops::RangeInclusive<u8> = 1..=5;
    const NAME_PREFIX: &'static str = "Matty M0";

    pub fn new(serial: u8) -> Option<Self> {
        Self::SERIALS.contains(&serial).then_some(Self(serial))
    }

    pub fn serial(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::NAME_PREFIX, self.0)
    }
}

impl FromStr for SystemId {
    type Err = ViewError;

    /// Accepts the canonical name and the short robot tag (`m03`, `m03-`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ViewError::UnknownSystem(s.to_string());
        let digits = if let Some(rest) = s.strip_prefix(Self::NAME_PREFIX) {
            rest
        } else {
            let tag = s.trim_end_matches('-');
            tag.strip_prefix("m0")
                .or_else(|| tag.strip_prefix("M0"))
                .ok_or_else(unknown)?
        };
        let serial: u8 = digits.parse().map_err(|_| unknown())?;
        Self::new(serial).ok_or_else(unknown)
    }
}

impl TryFrom<String> for SystemId {
    type Error = ViewError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SystemId> for String {
    fn from(id: SystemId) -> Self {
        id.to_string()
    }
}

/// Optional casualty observations in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VitalField {
    SevereHemorrhage,
    RespiratoryDistress,
    Hr,
    Rr,
    TraumaHead,
    TraumaTorso,
    TraumaLowerExt,
    TraumaUpperExt,
    AlertnessOcular,
    AlertnessVerbal,
    AlertnessMotor,
}

impl VitalField {
    pub const ALL: [VitalField; 11] = [
        VitalField::SevereHemorrhage,
        VitalField::RespiratoryDistress,
        VitalField::Hr,
        VitalField::Rr,
        VitalField::TraumaHead,
        VitalField::TraumaTorso,
        VitalField::TraumaLowerExt,
        VitalField::TraumaUpperExt,
        VitalField::AlertnessOcular,
        VitalField::AlertnessVerbal,
        VitalField::AlertnessMotor,
    ];

    /// Width of the value in the packed report.
    pub const fn bits(self) -> u32 {
        match self {
            VitalField::SevereHemorrhage | VitalField::RespiratoryDistress => 1,
            VitalField::Hr => 8,
            VitalField::Rr => 6,
            _ => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            VitalField::SevereHemorrhage => "severe_hemorrhage",
            VitalField::RespiratoryDistress => "respiratory_distress",
            VitalField::Hr => "hr",
            VitalField::Rr => "rr",
            VitalField::TraumaHead => "trauma_head",
            VitalField::TraumaTorso => "trauma_torso",
            VitalField::TraumaLowerExt => "trauma_lower_ext",
            VitalField::TraumaUpperExt => "trauma_upper_ext",
            VitalField::AlertnessOcular => "alertness_ocular",
            VitalField::AlertnessVerbal => "alertness_verbal",
            VitalField::AlertnessMotor => "alertness_motor",
        }
    }

    /// Largest value the field can carry.
    pub const fn max_value(self) -> u32 {
        (1 << self.bits()) - 1
    }

    pub fn get(self, r: &TriageReport) -> Option<u8> {
        match self {
            VitalField::SevereHemorrhage => r.severe_hemorrhage,
            VitalField::RespiratoryDistress => r.respiratory_distress,
            VitalField::Hr => r.hr,
            VitalField::Rr => r.rr,
            VitalField::TraumaHead => r.trauma_head,
            VitalField::TraumaTorso => r.trauma_torso,
            VitalField::TraumaLowerExt => r.trauma_lower_ext,
            VitalField::TraumaUpperExt => r.trauma_upper_ext,
            VitalField::AlertnessOcular => r.alertness_ocular,
            VitalField::AlertnessVerbal => r.alertness_verbal,
            VitalField::AlertnessMotor => r.alertness_motor,
        }
    }

    pub fn slot(self, r: &mut TriageReport) -> &mut Option<u8> {
        match self {
            VitalField::SevereHemorrhage => &mut r.severe_hemorrhage,
            VitalField::RespiratoryDistress => &mut r.respiratory_distress,
            VitalField::Hr => &mut r.hr,
            VitalField::Rr => &mut r.rr,
            VitalField::TraumaHead => &mut r.trauma_head,
            VitalField::TraumaTorso => &mut r.trauma_torso,
            VitalField::TraumaLowerExt => &mut r.trauma_lower_ext,
            VitalField::TraumaUpperExt => &mut r.trauma_upper_ext,
            VitalField::AlertnessOcular => &mut r.alertness_ocular,
            VitalField::AlertnessVerbal => &mut r.alertness_verbal,
            VitalField::AlertnessMotor => &mut r.alertness_motor,
        }
    }
}

/// Casualty triage report as produced by one scanning session.
#[derive(Debug, Clone, PartialEq)]
pub struct TriageReport {
    pub system: SystemId,
    /// Assigned by the receiving side, never transmitted over the radio.
    pub casualty_id: Option<u32>,
    /// `None` when no GPS fix was available; packed as (0, 0).
    pub location: Option<Coordinate>,

    pub severe_hemorrhage: Option<u8>,    // 0, 1
    pub respiratory_distress: Option<u8>, // 0, 1
    pub hr: Option<u8>,                   // beats per minute
    pub rr: Option<u8>,                   // breaths per minute
    pub trauma_head: Option<u8>,
    pub trauma_torso: Option<u8>,
    pub trauma_lower_ext: Option<u8>,
    pub trauma_upper_ext: Option<u8>,
    pub alertness_ocular: Option<u8>,
    pub alertness_verbal: Option<u8>,
    pub alertness_motor: Option<u8>,
}

impl TriageReport {
    pub fn new(system: SystemId, location: Option<Coordinate>) -> Self {
        Self {
            system,
            casualty_id: None,
            location,
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

    pub fn with(mut self, field: VitalField, value: u8) -> Self {
        *field.slot(&mut self) = Some(value);
        self
    }

    /// Present optional fields in wire order.
    pub fn present_fields(&self) -> impl Iterator<Item = (VitalField, u8)> + '_ {
        VitalField::ALL
            .into_iter()
            .filter_map(move |f| f.get(self).map(|v| (f, v)))
    }
}

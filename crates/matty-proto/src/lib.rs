//! Casualty report types and the compact LoRa wire format.
//!
//! [`codec`] turns a [`TriageReport`] into the bit-packed radio payload and
//! back; [`view`] produces the JSON shape used by the reporting API.

pub mod assessment;
pub mod codec;
mod coord;
mod error;
pub mod report;
pub mod view;

pub use assessment::{Assessment, AssessmentError};
pub use codec::{decode, encode};
pub use coord::{Coordinate, UNITS_PER_DEGREE};
pub use error::{CodecError, ViewError};
pub use report::{SystemId, TriageReport, VitalField};
pub use view::ReportView;

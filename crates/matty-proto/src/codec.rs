//! Bit-packed report format for the LoRa link.
//!
//! Layout, most significant bit first:
//!
//! ```text
//! letter code  5 bits   always 'M' - 'A'
//! serial       3 bits   1..=5
//! latitude    32 bits   signed, degrees * 3_600_000
//! longitude   32 bits   signed, degrees * 3_600_000
//! per optional field, in `VitalField::ALL` order:
//!   presence   1 bit
//!   value      VitalField::bits() bits, only when present
//! ```
//!
//! The stream stops after the last present field and is zero padded to a
//! whole byte, so a report without observations is exactly
//! [`HEADER_LEN`] bytes. A decoder that runs out of bits where a presence
//! flag is expected treats the remaining fields as absent.

use bytes::{BufMut, Bytes, BytesMut};

use crate::coord::Coordinate;
use crate::error::CodecError;
use crate::report::{SystemId, TriageReport, VitalField};

/// System byte plus both coordinates.
pub const HEADER_LEN: usize = 9;

/// Size of a report carrying every optional field.
pub const MAX_LEN: usize = 15;

pub fn encode(report: &TriageReport) -> Result<Bytes, CodecError> {
    let mut w = BitWriter::with_capacity(MAX_LEN);

    w.write(u32::from(SystemId::LETTER_CODE), 5);
    w.write(u32::from(report.system.serial()), 3);

    let (lat, lon) = match report.location {
        Some(c) => {
            finite("latitude", c.lat)?;
            finite("longitude", c.lon)?;
            c.to_units()
        }
        None => (0, 0),
    };
    w.write(coordinate_bits("latitude", lat)?, 32);
    w.write(coordinate_bits("longitude", lon)?, 32);

    let last_present = VitalField::ALL
        .iter()
        .rposition(|f| f.get(report).is_some());

    if let Some(last) = last_present {
        for field in &VitalField::ALL[..=last] {
            match field.get(report) {
                Some(value) => {
                    let value = u32::from(value);
                    if value > field.max_value() {
                        return Err(CodecError::OutOfRange {
                            field: field.name(),
                            value: i64::from(value),
                            bits: field.bits(),
                        });
                    }
                    w.write(1, 1);
                    w.write(value, field.bits());
                }
                None => w.write(0, 1),
            }
        }
    }

    Ok(w.finish())
}

pub fn decode(packet: &[u8]) -> Result<TriageReport, CodecError> {
    if packet.len() < HEADER_LEN {
        return Err(CodecError::malformed(format!(
            "{} bytes, need at least {}",
            packet.len(),
            HEADER_LEN
        )));
    }
    let mut r = BitReader::new(packet);

    let letter = r.read(5).ok_or_else(|| CodecError::malformed("truncated header"))?;
    let serial = r.read(3).ok_or_else(|| CodecError::malformed("truncated header"))?;
    if letter != u32::from(SystemId::LETTER_CODE) {
        return Err(CodecError::malformed(format!("unknown system letter code {}", letter)));
    }
    let system = SystemId::new(serial as u8)
        .ok_or_else(|| CodecError::malformed(format!("unknown system serial {}", serial)))?;

    let lat = r.read(32).ok_or_else(|| CodecError::malformed("truncated latitude"))? as i32;
    let lon = r.read(32).ok_or_else(|| CodecError::malformed("truncated longitude"))? as i32;

    let mut report = TriageReport::new(
        system,
        Some(Coordinate::from_units(i64::from(lat), i64::from(lon))),
    );

    for field in VitalField::ALL {
        // End of stream: this and all following fields were elided.
        let Some(flag) = r.read(1) else { break };
        if flag == 0 {
            continue;
        }
        let value = r.read(field.bits()).ok_or_else(|| {
            CodecError::malformed(format!("truncated value for {}", field.name()))
        })?;
        *field.slot(&mut report) = Some(value as u8);
    }

    Ok(report)
}

fn finite(field: &'static str, deg: f64) -> Result<(), CodecError> {
    if deg.is_finite() {
        Ok(())
    } else {
        Err(CodecError::NonFinite { field })
    }
}

fn coordinate_bits(field: &'static str, units: i64) -> Result<u32, CodecError> {
    i32::try_from(units)
        .map(|v| v as u32)
        .map_err(|_| CodecError::OutOfRange { field, value: units, bits: 32 })
}

struct BitWriter {
    buf: BytesMut,
    acc: u8,
    pending: u32,
}

impl BitWriter {
    fn with_capacity(bytes: usize) -> Self {
        Self { buf: BytesMut::with_capacity(bytes), acc: 0, pending: 0 }
    }

    /// Appends the low `bits` bits of `value`, MSB first.
    fn write(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            self.acc = (self.acc << 1) | ((value >> i) & 1) as u8;
            self.pending += 1;
            if self.pending == 8 {
                self.buf.put_u8(self.acc);
                self.acc = 0;
                self.pending = 0;
            }
        }
    }

    fn finish(mut self) -> Bytes {
        if self.pending > 0 {
            self.buf.put_u8(self.acc << (8 - self.pending));
        }
        self.buf.freeze()
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    fn read(&mut self, bits: u32) -> Option<u32> {
        if self.remaining() < bits as usize {
            return None;
        }
        let mut out = 0u32;
        for _ in 0..bits {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            out = (out << 1) | u32::from(bit);
            self.pos += 1;
        }
        Some(out)
    }
}

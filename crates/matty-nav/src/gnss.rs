use anyhow::{Context, Result};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace};

use matty_proto::Coordinate;

#[derive(Debug, Clone, PartialEq)]
pub struct FixQuality {
    pub sats: u8,
    pub hdop: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GnssFix {
    pub position: Coordinate,
    pub quality: Option<FixQuality>,
    pub ts: OffsetDateTime,
}

enum Reader {
    Serial(BufReader<SerialStream>),
    File(BufReader<File>),
}

/// Position fixes from an NMEA 0183 stream.
pub struct GnssSource {
    reader: Reader,
    parser: NmeaParser,
}

impl GnssSource {
    pub fn serial(dev: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(dev, baud)
            .open_native_async()
            .with_context(|| format!("open serial {}", dev))?;
        Ok(Self { reader: Reader::Serial(BufReader::new(port)), parser: NmeaParser::default() })
    }

    pub async fn file(path: &str) -> Result<Self> {
        let f = File::open(path).await.with_context(|| format!("open nmea file {}", path))?;
        Ok(Self { reader: Reader::File(BufReader::new(f)), parser: NmeaParser::default() })
    }

    /// Next valid fix; `None` once a recorded file is exhausted.
    pub async fn next_fix(&mut self) -> Result<Option<GnssFix>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = match &mut self.reader {
                Reader::Serial(r) => r.read_until(b'\n', &mut buf).await.context("read serial nmea")?,
                Reader::File(r) => r.read_until(b'\n', &mut buf).await.context("read nmea file")?,
            };
            if n == 0 {
                return Ok(None);
            }
            // noise from a baud mismatch or a receiver starting up
            let Ok(line) = std::str::from_utf8(&buf) else {
                debug!("gnss: skipping non-UTF-8 line ({} bytes)", n);
                continue;
            };
            if let Some(fix) = self.parser.parse_line(line.trim()) {
                return Ok(Some(fix));
            }
        }
    }
}

/// Minimal NMEA parsing:
/// - GGA: satellites + hdop, remembered for the next RMC
/// - RMC: position + UTC time
#[derive(Debug, Default)]
pub struct NmeaParser {
    last_gga: Option<FixQuality>,
}

impl NmeaParser {
    pub fn parse_line(&mut self, s: &str) -> Option<GnssFix> {
        let body = s.split('*').next().unwrap_or(s);
        let parts: Vec<&str> = body.split(',').collect();
        let kind = parts.first()?.get(3..)?;

        match kind {
            "GGA" if parts.len() > 8 => {
                let sats = parts[7].parse().unwrap_or(0);
                let hdop = parts[8].parse().unwrap_or(99.9);
                trace!("gnss: GGA sats={} hdop={}", sats, hdop);
                self.last_gga = Some(FixQuality { sats, hdop });
                None
            }
            "RMC" if parts.len() > 9 => {
                // parts[1]=hhmmss.ss, [2]=A/V, [3..6]=lat/lon, [9]=ddmmyy
                if parts[2] != "A" {
                    debug!("gnss: RMC without valid fix");
                    return None;
                }
                let lat = parse_deg_min(parts[3], parts[4])?;
                let lon = parse_deg_min(parts[5], parts[6])?;
                let ts = parse_utc(parts[1], parts[9]).unwrap_or_else(OffsetDateTime::now_utc);
                Some(GnssFix {
                    position: Coordinate::new(lat, lon),
                    quality: self.last_gga.clone(),
                    ts,
                })
            }
            _ => None,
        }
    }
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.').unwrap_or(v.len());
    let deg_len = dot.checked_sub(2)?;
    let deg: f64 = v[..deg_len].parse().ok()?;
    let min: f64 = v[deg_len..].parse().ok()?;
    let mut out = deg + (min / 60.0);
    if hemi == "S" || hemi == "W" {
        out = -out;
    }
    Some(out)
}

fn parse_utc(hms: &str, dmy: &str) -> Option<OffsetDateTime> {
    let num = |s: &str, r: std::ops::Range<usize>| s.get(r)?.parse::<u8>().ok();
    let day = num(dmy, 0..2)?;
    let month = Month::try_from(num(dmy, 2..4)?).ok()?;
    let year = 2000 + i32::from(num(dmy, 4..6)?);
    let date = Date::from_calendar_date(year, month, day).ok()?;

    let frac: f64 = hms.get(6..).filter(|f| !f.is_empty()).map_or(Some(0.0), |f| f.parse().ok())?;
    let time = Time::from_hms_milli(
        num(hms, 0..2)?,
        num(hms, 2..4)?,
        num(hms, 4..6)?,
        (frac * 1000.0).round() as u16,
    )
    .ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use time::macros::datetime;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519.20,A,4807.038,N,01131.000,E,022.4,084.4,230324,003.1,W*6A";

    #[test]
    fn rmc_after_gga() {
        let mut p = NmeaParser::default();
        assert!(p.parse_line(GGA).is_none());
        let fix = p.parse_line(RMC).unwrap();
        assert_abs_diff_eq!(fix.position.lat, 48.1173, epsilon = 1e-9);
        assert_abs_diff_eq!(fix.position.lon, 11.516_666_666, epsilon = 1e-8);
        assert_eq!(fix.quality, Some(FixQuality { sats: 8, hdop: 0.9 }));
        assert_eq!(fix.ts, datetime!(2024-03-23 12:35:19.2 UTC));
    }

    #[test]
    fn southern_western_hemisphere() {
        let mut p = NmeaParser::default();
        let fix = p
            .parse_line("$GNRMC,000000,A,3230.0321,N,08345.5014,W,0.0,0.0,010125,,,A*00")
            .unwrap();
        assert_abs_diff_eq!(fix.position.lat, 32.500535, epsilon = 1e-6);
        assert_abs_diff_eq!(fix.position.lon, -83.75835667, epsilon = 1e-6);
        assert!(fix.quality.is_none());
        let fix = p.parse_line("$GNRMC,000000,A,3230.0321,S,08345.5014,W,0,0,010125,,").unwrap();
        assert!(fix.position.lat < 0.0);
    }

    #[test]
    fn invalid_rmc_is_skipped() {
        let mut p = NmeaParser::default();
        assert!(p.parse_line("$GPRMC,123519,V,,,,,,,230394,,*00").is_none());
        assert!(p.parse_line("$GPRMC,123519,A,,N,,E,,,230394,,*00").is_none());
        assert!(p.parse_line("garbage").is_none());
        assert!(p.parse_line("").is_none());
    }

    #[test]
    fn non_ascii_coordinates_are_skipped() {
        let mut p = NmeaParser::default();
        assert!(p.parse_line("$GPRMC,123519,A,\u{e9}1.0,N,01131.000,E,0,0,230324,,").is_none());
        assert!(p.parse_line("$GPRMC,123519,A,4807.038,N,0113\u{e9}.000,E,0,0,230324,,").is_none());
        assert!(p.parse_line("$GPRMC,123519,A,-4807.038,N,01131.000,E,0,0,230324,,").is_none());
        assert!(p.parse_line(RMC).is_some());
    }

    #[tokio::test]
    async fn file_source_ends_at_eof() {
        let path = std::env::temp_dir().join(format!("matty-gnss-{}.nmea", std::process::id()));
        std::fs::write(&path, format!("{}\n{}\n{}\n", GGA, RMC, RMC)).unwrap();

        let mut src = GnssSource::file(path.to_str().unwrap()).await.unwrap();
        assert!(src.next_fix().await.unwrap().is_some());
        assert!(src.next_fix().await.unwrap().is_some());
        assert!(src.next_fix().await.unwrap().is_none());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn line_noise_does_not_end_the_stream() {
        let path = std::env::temp_dir().join(format!("matty-gnss-noise-{}.nmea", std::process::id()));
        let mut data = b"\xff\xfe noise\n".to_vec();
        data.extend_from_slice(format!("{}\n", RMC).as_bytes());
        std::fs::write(&path, data).unwrap();

        let mut src = GnssSource::file(path.to_str().unwrap()).await.unwrap();
        let fix = src.next_fix().await.unwrap().unwrap();
        assert_abs_diff_eq!(fix.position.lat, 48.1173, epsilon = 1e-9);
        assert!(src.next_fix().await.unwrap().is_none());
        std::fs::remove_file(path).ok();
    }
}

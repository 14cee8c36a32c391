//! GPS line extraction.
//!
//! The microcontroller prints position lines shaped `lat,<latitude>,long,<longitude>`.
//! Fields are taken by position (1 and 3); this is not an NMEA parser.

use super::TelemetryRecord;
use thiserror::Error;

const GPS_MARKER: &[u8] = b"lat";
const LATITUDE_FIELD: usize = 1;
const LONGITUDE_FIELD: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("GPS line has {found} fields, expected at least {expected}")]
    MissingField { expected: usize, found: usize },

    #[error("GPS field {0} is empty")]
    EmptyField(usize),
}

/// Extracts a position from one raw serial line.
///
/// `Ok(None)` means the line is not a GPS line at all.
pub fn parse(raw: &[u8], rover: &str) -> Result<Option<TelemetryRecord>, TelemetryError> {
    if !raw.windows(GPS_MARKER.len()).any(|w| w == GPS_MARKER) {
        return Ok(None);
    }

    let fields: Vec<&[u8]> = raw.split(|b| *b == b',').collect();
    if fields.len() <= LONGITUDE_FIELD {
        return Err(TelemetryError::MissingField {
            expected: LONGITUDE_FIELD + 1,
            found: fields.len(),
        });
    }

    let latitude = String::from_utf8_lossy(fields[LATITUDE_FIELD])
        .trim()
        .to_string();
    let longitude: String = String::from_utf8_lossy(fields[LONGITUDE_FIELD])
        .chars()
        .filter(|c| !c.is_control() && *c != '\'' && *c != '"')
        .collect::<String>()
        .trim()
        .to_string();

    if latitude.is_empty() {
        return Err(TelemetryError::EmptyField(LATITUDE_FIELD));
    }
    if longitude.is_empty() {
        return Err(TelemetryError::EmptyField(LONGITUDE_FIELD));
    }

    Ok(Some(TelemetryRecord {
        latitude,
        longitude,
        rover: rover.to_string(),
    }))
}

//! The field set extracted from a logger contact document.
//!
//! A contact document is the XML fragment a contest logger broadcasts after
//! each QSO is logged, for example:
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?>
//! <contactinfo>
//!     <timestamp>2024-05-01 12:30:45</timestamp>
//!     <call>W1AW</call>
//!     <rxfreq>1402500</rxfreq>
//!     ...
//! </contactinfo>
//! ```

use serde::Serialize;

use crate::extract::extract_field;

/// Marker that identifies a payload as a contact document.
pub const CONTACT_MARKER: &str = "<contactinfo>";

/// Returns true if the payload carries the contact document marker.
#[inline]
pub fn is_contact_document(payload: &str) -> bool {
    payload.contains(CONTACT_MARKER)
}

/// The fields of one contact, as raw strings straight from the document.
///
/// Every field is optional: a missing or empty element leaves the field as
/// `None`, which means "omit from output" rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactFields {
    /// Callsign of the worked station.
    pub call: Option<String>,

    /// Operating mode (CW, SSB, FT8, ...).
    pub mode: Option<String>,

    /// Band in meters without the unit suffix, e.g. `20`.
    pub band: Option<String>,

    /// Receive frequency in units of 10 Hz.
    pub rxfreq: Option<String>,

    /// Transmit frequency in units of 10 Hz.
    pub txfreq: Option<String>,

    /// UTC timestamp formatted as `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: Option<String>,

    /// Signal report received.
    pub rcv: Option<String>,

    /// Signal report sent.
    pub snt: Option<String>,

    /// Operator name.
    pub name: Option<String>,

    /// Maidenhead grid square.
    pub gridsquare: Option<String>,

    /// Location of the worked station.
    pub qth: Option<String>,

    /// Free-text comment.
    pub comment: Option<String>,
}

impl ContactFields {
    /// Pull every known field out of a contact document.
    pub fn from_xml(payload: &str) -> Self {
        let field = |name: &str| extract_field(payload, name).map(str::to_string);

        Self {
            call: field("call"),
            mode: field("mode"),
            band: field("band"),
            rxfreq: field("rxfreq"),
            txfreq: field("txfreq"),
            timestamp: field("timestamp"),
            rcv: field("rcv"),
            snt: field("snt"),
            name: field("name"),
            gridsquare: field("gridsquare"),
            qth: field("qth"),
            comment: field("comment"),
        }
    }
}

//! ADIF encoding of logger contacts.
//!
//! ADIF records are a flat run of length-prefixed tags terminated by an
//! end-of-record marker:
//!
//! ```text
//! <call:4>W1AW<mode:2>CW<freq:6>14.025<qso_date:8>20240501<eor>
//! ```
//!
//! Because every value carries its own length, no escaping is needed.

use chrono::NaiveDateTime;
use std::fmt;
use thiserror::Error;

use crate::contact::{ContactFields, is_contact_document};

/// Format of the logger's `<timestamp>` element.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Logger frequencies are integers in units of 10 Hz; dividing by this
/// yields MHz.
const FREQ_DIVISOR: f64 = 100_000.0;

/// End-of-record marker.
pub const EOR: &str = "<eor>";

/// Errors that drop a single contact record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("Invalid frequency in <{field}>: {value:?}")]
    InvalidFrequency { field: &'static str, value: String },

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// Knobs for the encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Emit a `band` tag (e.g. `20m`) after `call`. Off by default: Wavelog
    /// derives the band from the frequency.
    pub emit_band: bool,
}

/// An ordered ADIF record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdifRecord {
    fields: Vec<(&'static str, String)>,
}

impl AdifRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tag. Tags are serialized in insertion order.
    pub fn push(&mut self, tag: &'static str, value: impl Into<String>) {
        self.fields.push((tag, value.into()));
    }

    /// The `(tag, value)` pairs in output order.
    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    /// Look up the value of a tag.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, value)| value.as_str())
    }

    /// Number of tags, not counting the end-of-record marker.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no tags.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for AdifRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (tag, value) in &self.fields {
            write!(f, "<{}:{}>{}", tag, value.chars().count(), value)?;
        }
        f.write_str(EOR)
    }
}

/// Convert a logger frequency (10 Hz units) to a MHz string.
fn convert_frequency(field: &'static str, raw: &str) -> Result<String, EncodeError> {
    let invalid = || EncodeError::InvalidFrequency {
        field,
        value: raw.to_string(),
    };

    let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }

    Ok((value / FREQ_DIVISOR).to_string())
}

/// Encode an already-extracted field set.
///
/// Tags are emitted in canonical order: call, [band], mode, freq_rx, freq,
/// qso_date, time_on, time_off, rst_rcvd, rst_sent, name, gridsquare, qth,
/// comment. Absent fields produce no tag.
pub fn encode_fields(
    contact: &ContactFields,
    options: &EncoderOptions,
) -> Result<AdifRecord, EncodeError> {
    let mut record = AdifRecord::new();

    if let Some(call) = &contact.call {
        record.push("call", call.as_str());
    }

    if options.emit_band
        && let Some(band) = &contact.band
    {
        record.push("band", format!("{}m", band));
    }

    if let Some(mode) = &contact.mode {
        record.push("mode", mode.as_str());
    }

    if let Some(rxfreq) = &contact.rxfreq {
        record.push("freq_rx", convert_frequency("rxfreq", rxfreq)?);
    }

    if let Some(txfreq) = &contact.txfreq {
        record.push("freq", convert_frequency("txfreq", txfreq)?);
    }

    if let Some(timestamp) = &contact.timestamp {
        let dt = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map_err(|_| EncodeError::InvalidTimestamp(timestamp.clone()))?;
        let time = dt.format("%H%M%S").to_string();

        record.push("qso_date", dt.format("%Y%m%d").to_string());
        record.push("time_on", time.as_str());
        // The logger does not track an end time separately
        record.push("time_off", time);
    }

    let passthrough = [
        ("rst_rcvd", &contact.rcv),
        ("rst_sent", &contact.snt),
        ("name", &contact.name),
        ("gridsquare", &contact.gridsquare),
        ("qth", &contact.qth),
        ("comment", &contact.comment),
    ];
    for (tag, value) in passthrough {
        if let Some(value) = value {
            record.push(tag, value.as_str());
        }
    }

    Ok(record)
}

/// Encode a raw contact document into an ADIF record.
///
/// Returns `Ok(None)` if the payload is not a contact document at all.
/// Returns an error if a frequency or the timestamp cannot be parsed; the
/// caller should drop the record.
///
/// # Example
///
/// ```
/// use wavelog_relay::adif::{EncoderOptions, encode};
///
/// let xml = "<contactinfo><call>W1AW</call><txfreq>1402500</txfreq></contactinfo>";
/// let record = encode(xml, &EncoderOptions::default()).unwrap().unwrap();
/// assert_eq!(record.to_string(), "<call:4>W1AW<freq:6>14.025<eor>");
/// ```
pub fn encode(payload: &str, options: &EncoderOptions) -> Result<Option<AdifRecord>, EncodeError> {
    if !is_contact_document(payload) {
        return Ok(None);
    }

    encode_fields(&ContactFields::from_xml(payload), options).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FULL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<contactinfo>
    <timestamp>2024-05-01 12:30:45</timestamp>
    <band>20</band>
    <rxfreq>1400000</rxfreq>
    <txfreq>1400000</txfreq>
    <call>W1AW</call>
    <mode>CW</mode>
    <snt>599</snt>
    <rcv>579</rcv>
    <name>Hiram</name>
    <gridsquare>FN31</gridsquare>
    <qth>Newington</qth>
    <comment>tnx qso</comment>
</contactinfo>"#;

    /// Split serialized ADIF back into (tag, declared length, value) triples,
    /// taking exactly `length` characters for each value.
    fn split_tags(adif: &str) -> Vec<(String, usize, String)> {
        let mut out = Vec::new();
        let mut rest = adif;
        while let Some(stripped) = rest.strip_prefix('<') {
            let close = stripped.find('>').expect("unterminated tag");
            let header = &stripped[..close];
            rest = &stripped[close + 1..];
            let Some((name, len)) = header.split_once(':') else {
                assert_eq!(header, "eor");
                assert!(rest.is_empty(), "data after <eor>");
                return out;
            };
            let len: usize = len.parse().expect("bad length");
            let value: String = rest.chars().take(len).collect();
            rest = &rest[value.len()..];
            out.push((name.to_string(), len, value));
        }
        panic!("missing <eor>");
    }

    #[test]
    fn test_full_record() {
        let record = encode(FULL, &EncoderOptions::default()).unwrap().unwrap();
        assert_eq!(
            record.to_string(),
            "<call:4>W1AW<mode:2>CW<freq_rx:2>14<freq:2>14\
             <qso_date:8>20240501<time_on:6>123045<time_off:6>123045\
             <rst_rcvd:3>579<rst_sent:3>599<name:5>Hiram<gridsquare:4>FN31\
             <qth:9>Newington<comment:7>tnx qso<eor>"
        );
    }

    #[test]
    fn test_canonical_order() {
        let record = encode(FULL, &EncoderOptions::default()).unwrap().unwrap();
        let tags: Vec<&str> = record.fields().iter().map(|(t, _)| *t).collect();
        assert_eq!(
            tags,
            [
                "call",
                "mode",
                "freq_rx",
                "freq",
                "qso_date",
                "time_on",
                "time_off",
                "rst_rcvd",
                "rst_sent",
                "name",
                "gridsquare",
                "qth",
                "comment"
            ]
        );
    }

    #[test]
    fn test_not_a_contact_document() {
        let xml = r#"<?xml version="1.0"?><RadioInfo><Freq>1400000</Freq></RadioInfo>"#;
        assert_eq!(encode(xml, &EncoderOptions::default()), Ok(None));
    }

    #[test]
    fn test_frequency_conversion() {
        assert_eq!(convert_frequency("rxfreq", "1400000").unwrap(), "14");
        assert_eq!(convert_frequency("rxfreq", "1402500").unwrap(), "14.025");
        assert_eq!(convert_frequency("rxfreq", "352000").unwrap(), "3.52");
        assert_eq!(convert_frequency("rxfreq", "0").unwrap(), "0");
    }

    #[test]
    fn test_invalid_frequency_fails_record() {
        let xml = "<contactinfo><call>W1AW</call><rxfreq>abc</rxfreq></contactinfo>";
        assert_eq!(
            encode(xml, &EncoderOptions::default()),
            Err(EncodeError::InvalidFrequency {
                field: "rxfreq",
                value: "abc".to_string()
            })
        );

        let xml = "<contactinfo><txfreq>NaN</txfreq></contactinfo>";
        assert!(matches!(
            encode(xml, &EncoderOptions::default()),
            Err(EncodeError::InvalidFrequency { field: "txfreq", .. })
        ));
    }

    #[test]
    fn test_timestamp_tags() {
        let xml = "<contactinfo><timestamp>2024-05-01 12:30:45</timestamp></contactinfo>";
        let record = encode(xml, &EncoderOptions::default()).unwrap().unwrap();
        assert_eq!(record.get("qso_date"), Some("20240501"));
        assert_eq!(record.get("time_on"), Some("123045"));
        assert_eq!(record.get("time_off"), Some("123045"));
    }

    #[test]
    fn test_invalid_timestamp_fails_record() {
        for bad in ["2024/05/01 12:30:45", "2024-05-01", "2024-13-01 12:30:45", "yesterday"] {
            let xml = format!("<contactinfo><call>W1AW</call><timestamp>{bad}</timestamp></contactinfo>");
            assert_eq!(
                encode(&xml, &EncoderOptions::default()),
                Err(EncodeError::InvalidTimestamp(bad.to_string())),
                "timestamp {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_timestamp_omits_time_tags() {
        let xml = "<contactinfo><call>W1AW</call><mode>SSB</mode></contactinfo>";
        let record = encode(xml, &EncoderOptions::default()).unwrap().unwrap();
        assert_eq!(record.get("qso_date"), None);
        assert_eq!(record.get("time_on"), None);
        assert_eq!(record.get("time_off"), None);
        assert_eq!(record.to_string(), "<call:4>W1AW<mode:3>SSB<eor>");
    }

    #[test]
    fn test_band_suppressed_by_default() {
        let record = encode(FULL, &EncoderOptions::default()).unwrap().unwrap();
        assert_eq!(record.get("band"), None);
    }

    #[test]
    fn test_band_emitted_when_enabled() {
        let options = EncoderOptions { emit_band: true };
        let record = encode(FULL, &options).unwrap().unwrap();
        assert_eq!(record.get("band"), Some("20m"));
        assert_eq!(record.fields()[0].0, "call");
        assert_eq!(record.fields()[1].0, "band");
    }

    #[test]
    fn test_empty_contact_is_only_eor() {
        let record = encode("<contactinfo></contactinfo>", &EncoderOptions::default())
            .unwrap()
            .unwrap();
        assert!(record.is_empty());
        assert_eq!(record.to_string(), "<eor>");
    }

    #[test]
    fn test_multibyte_length_is_character_count() {
        let xml = "<contactinfo><name>王小明</name><qth>Zürich</qth></contactinfo>";
        let record = encode(xml, &EncoderOptions::default()).unwrap().unwrap();
        assert_eq!(record.to_string(), "<name:3>王小明<qth:6>Zürich<eor>");
    }

    proptest! {
        #[test]
        fn prop_one_tag_per_present_field(
            call in proptest::option::of("[A-Z0-9/]{1,10}"),
            mode in proptest::option::of("[A-Z0-9]{1,6}"),
            rcv in proptest::option::of("[0-9]{2,3}"),
            name in proptest::option::of("[^<]{1,20}"),
            comment in proptest::option::of("[^<]{1,40}"),
        ) {
            let contact = ContactFields {
                call: call.clone(),
                mode: mode.clone(),
                rcv: rcv.clone(),
                name: name.clone(),
                comment: comment.clone(),
                ..Default::default()
            };
            let record = encode_fields(&contact, &EncoderOptions::default()).unwrap();

            let expected: Vec<(&str, String)> = [
                ("call", call),
                ("mode", mode),
                ("rst_rcvd", rcv),
                ("name", name),
                ("comment", comment),
            ]
            .into_iter()
            .filter_map(|(tag, value)| value.map(|v| (tag, v)))
            .collect();

            let actual: Vec<(&str, String)> = record
                .fields()
                .iter()
                .map(|(tag, value)| (*tag, value.clone()))
                .collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn prop_length_prefix_matches_value(
            name in "[^<]{1,20}",
            qth in "[^<]{1,20}",
            comment in "[^<]{1,60}",
            freq in 0u32..30_000_000,
        ) {
            let contact = ContactFields {
                call: Some("W1AW".to_string()),
                rxfreq: Some(freq.to_string()),
                name: Some(name),
                qth: Some(qth),
                comment: Some(comment),
                ..Default::default()
            };
            let record = encode_fields(&contact, &EncoderOptions::default()).unwrap();
            let adif = record.to_string();

            let parsed = split_tags(&adif);
            prop_assert_eq!(parsed.len(), record.len());
            for ((tag, len, value), (expected_tag, expected_value)) in parsed.iter().zip(record.fields()) {
                prop_assert_eq!(tag.as_str(), *expected_tag);
                prop_assert_eq!(*len, value.chars().count());
                prop_assert_eq!(value, expected_value);
            }
        }
    }
}

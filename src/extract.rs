//! Tag-delimited field extraction from logger XML payloads.
//!
//! Logging programs broadcast each contact as a small XML fragment. Rather
//! than validating the whole document, fields are pulled out by scanning for
//! `<name>value</name>` pairs, which keeps the relay tolerant of partial,
//! truncated, or otherwise malformed payloads.
//!
//! # Example
//!
//! ```
//! use wavelog_relay::extract::extract_field;
//!
//! let xml = "<contactinfo><call>W1AW</call><mode>CW</mode></contactinfo>";
//! assert_eq!(extract_field(xml, "call"), Some("W1AW"));
//! assert_eq!(extract_field(xml, "band"), None);
//! ```

use nom::{
    IResult, Parser,
    bytes::complete::{tag, take_until},
    sequence::{preceded, terminated},
};

/// Skip ahead to the first `open` tag and capture everything up to the
/// following `close` tag.
fn tagged_value<'a>(input: &'a str, open: &str, close: &str) -> IResult<&'a str, &'a str> {
    preceded(
        (take_until(open), tag(open)),
        terminated(take_until(close), tag(close)),
    )
    .parse(input)
}

/// Extract the text enclosed by the first `<name>` ... `</name>` pair.
///
/// The capture stops at the first closing tag, so it never spans two
/// same-named elements. Newlines inside the value are kept as-is.
///
/// Returns `None` when the opening tag is missing, the closing tag is
/// missing, or the enclosed text is empty.
pub fn extract_field<'a>(payload: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);

    match tagged_value(payload, &open, &close) {
        Ok((_, value)) if !value.is_empty() => Some(value),
        _ => None,
    }
}

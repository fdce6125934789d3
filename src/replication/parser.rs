//! Replication payload decoding: gzip + changeset XML
//!
//! A delta resource is a gzip-compressed XML document whose root holds zero
//! or more `changeset` elements:
//!
//! ```text
//! <osm version="0.6" generator="replicate_changesets.rb">
//!   <changeset id="1" created_at="2024-05-01T11:58:12Z" closed_at="..." open="false"
//!              num_changes="4" user="mapper" uid="42"
//!              min_lat="10.0" max_lat="10.1" min_lon="20.0" max_lon="20.1">
//!     <tag k="comment" v="..."/>
//!   </changeset>
//! </osm>
//! ```
//!
//! Only closed, non-empty, bounded changesets are accepted. A single
//! malformed accepted element fails the whole resource.

use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::str::FromStr;

use super::ReplicationError;
use crate::config::defaults::CREATED_AT_FORMAT;
use crate::types::Changeset;

const CHANGESET_ELEMENT: &[u8] = b"changeset";
const BBOX_ATTRIBUTES: [&str; 4] = ["min_lat", "max_lat", "min_lon", "max_lon"];

/// Payload parse failures.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("changeset is missing required attribute '{attribute}'")]
    MissingAttribute { attribute: &'static str },

    #[error("invalid value '{value}' for attribute '{attribute}'")]
    InvalidField {
        attribute: &'static str,
        value: String,
    },

    #[error("document has no root element")]
    NoRoot,

    #[error("document ends with {open} unclosed element(s)")]
    Truncated { open: usize },
}

/// Gunzip and parse one fetched resource.
///
/// Decompression failures are reported as `Fetch`, content failures as
/// `Parse`.
pub fn decode_resource(path: &str, compressed: &[u8]) -> Result<Vec<Changeset>, ReplicationError> {
    let mut xml = Vec::new();
    GzDecoder::new(compressed)
        .read_to_end(&mut xml)
        .map_err(|e| ReplicationError::Fetch {
            path: path.to_string(),
            reason: format!("gzip decode failed: {e}"),
        })?;

    parse_changesets(xml.as_slice()).map_err(|source| ReplicationError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Parse every accepted `changeset` element of an XML document.
///
/// The document must have a root element and close every element it opens;
/// an empty, non-XML or cut-off payload is an error, never an empty batch.
pub fn parse_changesets<R: BufRead>(input: R) -> Result<Vec<Changeset>, ParseError> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    let mut changesets = Vec::new();
    let mut depth = 0usize;
    let mut root_seen = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) => {
                root_seen = true;
                depth += 1;
                accept(&element, &mut changesets)?;
            }
            Event::Empty(element) => {
                root_seen = true;
                accept(&element, &mut changesets)?;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !root_seen {
        return Err(ParseError::NoRoot);
    }
    if depth != 0 {
        return Err(ParseError::Truncated { open: depth });
    }
    Ok(changesets)
}

fn accept(element: &BytesStart<'_>, changesets: &mut Vec<Changeset>) -> Result<(), ParseError> {
    if element.name().as_ref() != CHANGESET_ELEMENT {
        return Ok(());
    }
    let attrs = collect_attributes(element)?;
    if is_accepted(&attrs) {
        changesets.push(to_changeset(&attrs)?);
    }
    Ok(())
}

fn collect_attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>, ParseError> {
    let mut attrs = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

/// Acceptance filter: explicitly closed, at least one change, full bbox.
fn is_accepted(attrs: &HashMap<String, String>) -> bool {
    attrs.get("open").map(String::as_str) == Some("false")
        && attrs.get("num_changes").is_some_and(|n| n != "0")
        && BBOX_ATTRIBUTES.iter().all(|key| attrs.contains_key(*key))
}

fn to_changeset(attrs: &HashMap<String, String>) -> Result<Changeset, ParseError> {
    Ok(Changeset {
        id: parse_field(attrs, "id")?,
        created_at: parse_created_at(attrs)?,
        num_changes: parse_field(attrs, "num_changes")?,
        user: attrs.get("user").cloned().unwrap_or_default(),
        uid: parse_field(attrs, "uid")?,
        min_lat: parse_coordinate(attrs, "min_lat")?,
        max_lat: parse_coordinate(attrs, "max_lat")?,
        min_lon: parse_coordinate(attrs, "min_lon")?,
        max_lon: parse_coordinate(attrs, "max_lon")?,
    })
}

fn required<'a>(
    attrs: &'a HashMap<String, String>,
    attribute: &'static str,
) -> Result<&'a str, ParseError> {
    attrs
        .get(attribute)
        .map(String::as_str)
        .ok_or(ParseError::MissingAttribute { attribute })
}

fn parse_field<T: FromStr>(
    attrs: &HashMap<String, String>,
    attribute: &'static str,
) -> Result<T, ParseError> {
    let raw = required(attrs, attribute)?;
    raw.trim().parse().map_err(|_| ParseError::InvalidField {
        attribute,
        value: raw.to_string(),
    })
}

/// Coordinates must be finite; `NaN`/`inf` would poison every distance.
fn parse_coordinate(
    attrs: &HashMap<String, String>,
    attribute: &'static str,
) -> Result<f64, ParseError> {
    let value: f64 = parse_field(attrs, attribute)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::InvalidField {
            attribute,
            value: value.to_string(),
        })
    }
}

fn parse_created_at(attrs: &HashMap<String, String>) -> Result<i64, ParseError> {
    let raw = required(attrs, "created_at")?;
    NaiveDateTime::parse_from_str(raw.trim(), CREATED_AT_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| ParseError::InvalidField {
            attribute: "created_at",
            value: raw.to_string(),
        })
}

use crate::{ArcStr, CnesId, Date8, Management, YearMonth};
use serde::{de, Deserialize, Deserializer};
use std::{cmp::Ordering, fs, io, path::Path};

/// Sentinel used when a contact field is missing from the facility registry.
pub const NOT_APPLICABLE: &str = "Não se aplica";

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

// Helpers for serde to parse fields with quirks.

/// Parse an 8-digit `yyyymmdd` date as recorded in the hospitalization extract.
pub fn date8<'de, D>(d: D) -> Result<Date8, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    Date8::try_from(s.trim()).map_err(de::Error::custom)
}

/// Parse a 6-digit `yyyymm` competency key.
pub fn year_month<'de, D>(d: D) -> Result<YearMonth, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    YearMonth::try_from(s.trim()).map_err(de::Error::custom)
}

/// Parse a CNES identifier. The registry zero-pads these to 7 digits.
pub fn cnes<'de, D>(d: D) -> Result<CnesId, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    s.trim()
        .parse::<CnesId>()
        .map_err(|_| de::Error::custom(format!("invalid CNES id \"{}\"", s)))
}

/// Parse a string, but map "" to `None`
pub fn optional_string<'de, D>(d: D) -> Result<Option<ArcStr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(d)?;
    if s.is_empty() {
        Ok(None)
    } else {
        Ok(Some(s.into()))
    }
}

/// parse a '1' to `true` and a '0' to `false`
pub fn bool_01<'de, D>(d: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let s: u8 = Deserialize::deserialize(d)?;
    match s {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::custom("expected '0' or '1'")),
    }
}

/// Parse a bed count. Empty means the count is unknown for that month, and
/// some registry exports format whole numbers as floats ("12.0").
pub fn bed_count<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let s: &str = Deserialize::deserialize(d)?;
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if let Ok(v) = s.parse::<i64>() {
        return Ok(Some(v));
    }
    match s.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(Some(v as i64)),
        _ => Err(Error::custom(format!("invalid bed count \"{}\"", s))),
    }
}

/// Parse a management code, preserving unmapped codes verbatim.
pub fn management<'de, D>(d: D) -> Result<Management, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    Ok(Management::from_code(s.trim()))
}

/// The facility registry is exported as ISO-8859-1; every byte maps to the
/// Unicode code point of the same value.
pub fn latin1_to_utf8(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Round to 2 decimal places, the precision used for all percentage columns.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn sort_f64(left: &f64, right: &f64) -> Ordering {
    if !(left.is_finite() && right.is_finite()) {
        panic!("only finite numbers expected");
    }
    if left < right {
        Ordering::Less
    } else if left == right {
        Ordering::Equal
    } else if left > right {
        Ordering::Greater
    } else {
        unreachable!()
    }
}

pub fn header(header: &str) {
    let len = header.len();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}

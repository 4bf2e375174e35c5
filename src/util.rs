use crate::Result;
use nom::number::complete;
use scraper::{ElementRef, Selector};
use serde::Serialize;
use std::io::Write;

pub fn sel(selector: &str) -> Selector {
    Selector::parse(selector).unwrap()
}

/// All text below the given element, with runs of whitespace collapsed to a single space
pub fn element_text(e: &ElementRef) -> String {
    reduce_whitespace(&e.text().collect::<String>())
}

pub fn reduce_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Parses the leading number of a table cell, e.g. "340.0", "12 g" or "1,100 kcal".
/// Anything that doesn't start with a number gives None, so missing values are never turned into
/// zeroes.
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace(',', "");
    if !cleaned.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == '-') {
        return None;
    }
    match complete::double::<_, ()>(cleaned.as_str()) {
        Ok((_, v)) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// Serialize a value as JSON followed by a newline, then flush the writer
pub fn write_json<W: Write, T: Serialize>(mut w: W, value: &T, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut w, value)?;
    } else {
        serde_json::to_writer(&mut w, value)?;
    }
    writeln!(w)?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use scraper::Html;
    use serde_json::json;
    use std::io;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_lines() {
        let mut out = Vec::new();
        write_json(&mut out, &json!([{"unitId": "5"}]), false).unwrap();
        assert_eq!("[{\"unitId\":\"5\"}]\n", String::from_utf8(out).unwrap());

        let mut out = Vec::new();
        write_json(&mut out, &json!({"a": 1}), true).unwrap();
        assert_eq!("{\n  \"a\": 1\n}\n", String::from_utf8(out).unwrap());
    }

    #[test]
    fn write_errors_are_reported() {
        // serde_json wraps io errors in its own type on the way out
        let err = write_json(BrokenPipe, &json!({"a": 1}), false).unwrap_err();
        assert!(matches!(err, Error::Json(ref e) if e.is_io()), "{err:?}");

        let mut out = io::BufWriter::with_capacity(64, BrokenPipe);
        let err = write_json(&mut out, &json!(null), false).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err:?}");
    }

    #[test]
    fn parse_number_plain() {
        assert_eq!(Some(340.0), parse_number("340.0"));
        assert_eq!(Some(24.0), parse_number(" 24 "));
        assert_eq!(Some(0.5), parse_number(".5"));
    }

    #[test]
    fn parse_number_strips_suffixes() {
        assert_eq!(Some(12.0), parse_number("12g"));
        assert_eq!(Some(340.0), parse_number("340.0 kcal"));
        assert_eq!(Some(1100.0), parse_number("1,100"));
    }

    #[test]
    fn parse_number_rejects_non_numeric() {
        assert_eq!(None, parse_number(""));
        assert_eq!(None, parse_number("-"));
        assert_eq!(None, parse_number("n/a"));
        assert_eq!(None, parse_number("<1g"));
        assert_eq!(None, parse_number("\u{a0}"));
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!("Daily Menu", reduce_whitespace("  Daily \n\t Menu\u{a0}"));
    }

    #[test]
    fn element_text_joins_nested_nodes() {
        let html = Html::parse_fragment("<p><b>Sunday</b>,\n  October 18, 2026</p>");
        let p = html.select(&sel("p")).next().unwrap();
        assert_eq!("Sunday, October 18, 2026", element_text(&p));
    }
}

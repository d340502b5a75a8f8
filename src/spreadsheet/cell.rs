use crate::error::SplitterError;
use chrono::Duration;
use chrono::NaiveDate;
use std::borrow::Cow;

/// Types of raw cell data in SpreadsheetML worksheets.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values (true/false)
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// Inline string values (including formula string results)
    InlineString,
    /// Shared string table references
    SharedString,
    /// Error values
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Analyzes format codes for date/time patterns.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_color = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_escaped => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_literal && !is_color => is_literal = true,

                ']' if is_color => is_color = false,
                '[' if !is_color && !is_literal => is_color = true,
                _ if is_literal || is_color => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// A cell value as seen by the catalog engine.
///
/// Numbers keep their lexical form so a rewritten workbook carries exactly the digits it was given.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(String),
    Boolean(bool),
}

impl CellValue {
    /// Text rendering of the value; empty cells render as an empty string.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Empty => Cow::Borrowed(""),
            CellValue::Text(value) | CellValue::Number(value) => Cow::Borrowed(value.as_str()),
            CellValue::Boolean(true) => Cow::Borrowed("TRUE"),
            CellValue::Boolean(false) => Cow::Borrowed("FALSE"),
        }
    }

    /// True for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(value) => value.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_owned())
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }
}

/// A raw cell read from a worksheet part, before shared strings and number formats are applied.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    /// Cell data type
    pub(crate) kind: CellType,
    /// Cell value as string
    pub(crate) value: String,
}

impl Cell {
    /// Resolves the raw cell into its engine value.
    /// Date/time numbers are rendered as ISO text; a value that fails to parse is kept as a number.
    pub(crate) fn resolve(&self, shared_strings: &[String]) -> CellValue {
        match self.kind {
            CellType::Empty => CellValue::Empty,
            CellType::Boolean => CellValue::Boolean(self.value == "1" || self.value.eq_ignore_ascii_case("true")),
            CellType::Number => CellValue::Number(self.value.trim().to_owned()),
            CellType::InlineString | CellType::Error => CellValue::from(self.value.as_str()),
            CellType::SharedString => self.value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|index| shared_strings.get(index))
                .map(|value| CellValue::from(value.as_str()))
                .unwrap_or_default(),
            CellType::NumberDate1900 => self.render(to_date_string(&self.value, false)),
            CellType::NumberDate1904 => self.render(to_date_string(&self.value, true)),
            CellType::NumberDateTime1900 => self.render(to_datetime_string(&self.value, false)),
            CellType::NumberDateTime1904 => self.render(to_datetime_string(&self.value, true)),
            CellType::NumberTime1900 | CellType::NumberTime1904 => self.render(to_time_string(&self.value)),
        }
    }

    fn render(&self, rendered: Result<String, SplitterError>) -> CellValue {
        match rendered {
            Ok(text) => CellValue::Text(text),
            Err(_) => CellValue::Number(self.value.trim().to_owned()),
        }
    }
}

/// Converts Excel numeric date to ISO date string.
/// Handles Lotus 1-2-3 leap year bug for 1900 epoch.
fn to_date_string(value: &str, is_1904: bool) -> Result<String, SplitterError> {
    let days = value.trim().parse::<f64>()?.trunc() as i64;
    let duration = Duration::days(
        days + if is_1904 {
            1462
        } else if days < 60 {
            1
        } else {
            0
        },
    );
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    let date = epoch + duration;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Converts Excel numeric time (fraction of a day) to ISO time string.
fn to_time_string(value: &str) -> Result<String, SplitterError> {
    let factor = value.trim().parse::<f64>()?.fract();
    let mut hours = (factor * 86_400_000f64).round() as i64;
    let milliseconds = hours % 1_000; hours /= 1_000;
    let seconds = hours % 60; hours /= 60;
    let minutes = hours % 60; hours /= 60;
    let timestamp = if milliseconds > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    };
    Ok(timestamp)
}

/// Converts Excel numeric datetime to ISO datetime string.
fn to_datetime_string(value: &str, is_1904: bool) -> Result<String, SplitterError> {
    let date = to_date_string(value, is_1904)?;
    let time = to_time_string(value)?;
    Ok(format!("{date} {time}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell { row: 0, col: 0, kind, value: value.to_owned() }
    }

    #[test]
    fn custom_formats_detect_dates_outside_literals() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("hh:mm", true), CellType::NumberTime1904);
        assert_eq!(CellType::parse_custom_number_format("\"days\" 0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("[Red]#,##0", false), CellType::Number);
    }

    #[test]
    fn resolves_shared_strings_and_dates() {
        let strings = vec!["Net Revenues".to_owned()];
        assert_eq!(cell(CellType::SharedString, "0").resolve(&strings), CellValue::Text("Net Revenues".to_owned()));
        assert_eq!(cell(CellType::SharedString, "7").resolve(&strings), CellValue::Empty);
        assert_eq!(cell(CellType::NumberDate1900, "45291").resolve(&strings), CellValue::Text("2023-12-31".to_owned()));
        assert_eq!(cell(CellType::NumberDateTime1900, "45291.5").resolve(&strings), CellValue::Text("2023-12-31 12:00:00".to_owned()));
        assert_eq!(cell(CellType::NumberDate1900, "n/a").resolve(&strings), CellValue::Number("n/a".to_owned()));
        assert_eq!(cell(CellType::Boolean, "1").resolve(&strings), CellValue::Boolean(true));
    }

    #[test]
    fn blank_detection_ignores_whitespace() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::from("  \t").is_blank());
        assert!(!CellValue::Number("0".to_owned()).is_blank());
        assert_eq!(CellValue::Boolean(false).text(), "FALSE");
    }
}

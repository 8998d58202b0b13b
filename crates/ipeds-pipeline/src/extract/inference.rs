//! Cell typing, column type inference and column-name normalization

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::fmt;

use super::models::{ColumnDescriptor, DataType};

/// Number of non-missing values inspected when deciding if text is a date
pub const DATE_SAMPLE_SIZE: usize = 10;

/// Accepted timestamp layouts; the last is the `mdb-export` default
const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%y %H:%M:%S"];

/// Literal date shapes, `9` standing for any digit
const DATE_SHAPES: [&str; 3] = ["9999-99-99", "99/99/9999", "99-99-9999"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y"];

/// One typed cell of an exported table
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Missing,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Type one raw field of delimited text
pub fn parse_cell(raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::Missing;
    }
    if raw.eq_ignore_ascii_case("true") {
        return CellValue::Boolean(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return CellValue::Boolean(false);
    }
    if let Ok(v) = raw.parse::<i64>() {
        return CellValue::Integer(v);
    }
    if raw.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(v) = raw.parse::<f64>() {
            return CellValue::Float(v);
        }
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return CellValue::Timestamp(ts);
        }
    }
    CellValue::Text(raw.to_string())
}

/// Named column of typed cells plus the exported text they came from
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
    pub raw: Vec<String>,
}

impl Column {
    /// Column from already typed cells; the text form is their display
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        let raw = values.iter().map(CellValue::to_string).collect();
        Self {
            name: name.into(),
            values,
            raw,
        }
    }

    /// Column from exported fields, typing each one with [`parse_cell`]
    pub fn from_text(name: impl Into<String>, raw: Vec<String>) -> Self {
        let values = raw.iter().map(|field| parse_cell(field)).collect();
        Self {
            name: name.into(),
            values,
            raw,
        }
    }

    /// Exported text of each cell, `None` where the cell is missing
    pub fn text_cells(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.values
            .iter()
            .zip(&self.raw)
            .map(|(value, raw)| (!value.is_missing()).then_some(raw.as_str()))
    }
}

/// True if `value` has one of the shapes `YYYY-MM-DD`, `MM/DD/YYYY`, `MM-DD-YYYY`
pub fn is_date_string(value: &str) -> bool {
    DATE_SHAPES.iter().any(|shape| {
        value.len() == shape.len()
            && value.bytes().zip(shape.bytes()).all(|(v, s)| match s {
                b'9' => v.is_ascii_digit(),
                literal => v == literal,
            })
    })
}

/// Best-effort parse of a date-shaped string
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

pub fn infer_column_type(values: &[CellValue]) -> DataType {
    let present: Vec<&CellValue> = values.iter().filter(|v| !v.is_missing()).collect();

    // All-missing columns default to float
    if present.is_empty() {
        return DataType::Float;
    }
    if present.iter().all(|v| matches!(v, CellValue::Integer(_))) {
        return DataType::Integer;
    }
    if present
        .iter()
        .all(|v| matches!(v, CellValue::Integer(_) | CellValue::Float(_)))
    {
        return DataType::Float;
    }
    if present.iter().all(|v| matches!(v, CellValue::Boolean(_))) {
        return DataType::Boolean;
    }
    if present.iter().all(|v| matches!(v, CellValue::Timestamp(_))) {
        return DataType::Timestamp;
    }

    let sample_is_dates = present
        .iter()
        .take(DATE_SAMPLE_SIZE)
        .all(|v| is_date_string(&v.to_string()));

    if sample_is_dates {
        DataType::Date
    } else {
        DataType::String
    }
}

pub fn infer_column_types(columns: &[Column]) -> Vec<ColumnDescriptor> {
    columns
        .iter()
        .map(|column| ColumnDescriptor {
            name: column.name.clone(),
            data_type: infer_column_type(&column.values),
            nullable: column.values.iter().any(CellValue::is_missing),
        })
        .collect()
}

/// Collapse every run of characters other than letters, digits and `_` into
/// one underscore, then trim underscores from both ends
pub fn normalize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_alphanumeric() || c == '_' { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// Normalize a header row, naming blanks `column_<index>` and suffixing
/// collisions with `_2`, `_3`, ...
pub fn normalize_column_names(headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());

    for (index, header) in headers.iter().enumerate() {
        let mut base = normalize_column_name(header);
        if base.is_empty() {
            base = format!("column_{}", index);
        }

        let mut candidate = base.clone();
        let mut n = 2;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        names.push(candidate);
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|v| parse_cell(v)).collect()
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell(""), CellValue::Missing);
        assert_eq!(parse_cell("42"), CellValue::Integer(42));
        assert_eq!(parse_cell("-7"), CellValue::Integer(-7));
        assert_eq!(parse_cell("3.25"), CellValue::Float(3.25));
        assert_eq!(parse_cell("TRUE"), CellValue::Boolean(true));
        assert_eq!(parse_cell("nan"), CellValue::Text("nan".to_string()));
        assert!(matches!(parse_cell("01/15/23 00:00:00"), CellValue::Timestamp(_)));
        assert!(matches!(parse_cell("2023-01-15T08:30:00"), CellValue::Timestamp(_)));
        assert_eq!(parse_cell("2023-01-15"), CellValue::Text("2023-01-15".to_string()));
    }

    #[test]
    fn test_infer_date_column() {
        assert_eq!(infer_column_type(&text(&["2023-01-01", "2023-02-01"])), DataType::Date);
        assert_eq!(infer_column_type(&text(&["01/31/2023", "12-01-2022"])), DataType::Date);
        assert_eq!(infer_column_type(&text(&["2023-01-01", "not a date"])), DataType::String);
    }

    #[test]
    fn test_date_sample_is_first_ten_values() {
        let mut values = text(&["2023-01-01"; 10]);
        values.push(parse_cell("later text"));
        assert_eq!(infer_column_type(&values), DataType::Date);
    }

    #[test]
    fn test_infer_scalar_columns() {
        let ints = vec![CellValue::Integer(1), CellValue::Integer(2), CellValue::Integer(3)];
        assert_eq!(infer_column_type(&ints), DataType::Integer);

        let mixed = vec![
            CellValue::Integer(1),
            CellValue::Text("a".to_string()),
            CellValue::Missing,
        ];
        assert_eq!(infer_column_type(&mixed), DataType::String);

        assert_eq!(infer_column_type(&text(&["1", "2.5"])), DataType::Float);
        assert_eq!(infer_column_type(&text(&["true", "False", ""])), DataType::Boolean);
        assert_eq!(
            infer_column_type(&text(&["2023-01-01 00:00:00", "2023-06-30 12:00:00"])),
            DataType::Timestamp
        );
        assert_eq!(infer_column_type(&text(&["", ""])), DataType::Float);
    }

    #[test]
    fn test_nullable_flag() {
        let columns = vec![
            Column::new("UNITID", text(&["100654", "100663"])),
            Column::new("ALIAS", text(&["AAMU", ""])),
        ];
        let described = infer_column_types(&columns);
        assert!(!described[0].nullable);
        assert_eq!(described[0].data_type, DataType::Integer);
        assert!(described[1].nullable);
        assert_eq!(described[1].data_type, DataType::String);
    }

    #[test]
    fn test_from_text_keeps_exported_text() {
        let column = Column::from_text("ZIP", vec!["02139".to_string(), String::new(), "1e5".to_string()]);
        assert_eq!(column.values[0], CellValue::Integer(2139));
        let cells: Vec<Option<&str>> = column.text_cells().collect();
        assert_eq!(cells, vec![Some("02139"), None, Some("1e5")]);
    }

    #[test]
    fn test_is_date_string() {
        assert!(is_date_string("2023-01-01"));
        assert!(is_date_string("01/31/2023"));
        assert!(is_date_string("01-31-2023"));
        assert!(!is_date_string("2023/01/01"));
        assert!(!is_date_string("2023-01-01 00:00:00"));
        assert!(!is_date_string("1/1/2023"));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2023-02-01"), NaiveDate::from_ymd_opt(2023, 2, 1));
        assert_eq!(parse_date("02/01/2023"), NaiveDate::from_ymd_opt(2023, 2, 1));
        assert_eq!(parse_date("13/45/2023"), None);
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("Column@With#Special$Chars"), "Column_With_Special_Chars");
        assert_eq!(normalize_column_name("Column   With   Spaces"), "Column_With_Spaces");
        assert_eq!(normalize_column_name("  (Total)  "), "Total");
        assert_eq!(normalize_column_name("__a__b__"), "a_b");
    }

    #[test]
    fn test_normalize_column_names_dedupes() {
        let headers: Vec<String> = ["Total Men", "Total-Men", "???", "Total_Men"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            normalize_column_names(&headers),
            vec!["Total_Men", "Total_Men_2", "column_2", "Total_Men_3"]
        );
    }
}

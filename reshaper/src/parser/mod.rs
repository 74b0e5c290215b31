//! Data-loading collaborator: delimited text to an immutable [`RecordSet`].
//!
//! The whole file is read into memory, its encoding and delimiter are
//! auto-detected (both can be overridden), and every row is checked against
//! the [`DatasetSchema`]. Nothing downstream reads the file again.

use std::path::Path;

use crate::config::DatasetSchema;
use crate::error::{CsvError, CsvResult, LoadResult, SchemaError};
use crate::logs::{log_info, log_success, log_warning};
use crate::models::{Record, RecordSet};

/// Result of loading with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed records
    pub records: RecordSet,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
    /// Rows skipped because their value cell was empty
    pub skipped: usize,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "windows-1251" | "cp1251" => "windows-1251".to_string(),
        "koi8-r" => "koi8-r".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let codec = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => encoding_rs::UTF_8,
        "windows-1251" | "cp1251" => encoding_rs::WINDOWS_1251,
        "koi8-r" => encoding_rs::KOI8_R,
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15,
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252,
        label => encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| CsvError::EncodingError(format!("unsupported encoding '{}'", label)))?,
    };

    let (text, used, had_errors) = codec.decode(bytes);
    if had_errors {
        log_warning(format!("Some bytes were not valid {} and were replaced", used.name()));
    }
    Ok(text.into_owned())
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Load a dataset file with auto-detection of encoding and, unless given, delimiter.
pub fn load_records<P: AsRef<Path>>(
    path: P,
    schema: &DatasetSchema,
    delimiter: Option<char>,
) -> LoadResult<ParseResult> {
    log_info(format!("Reading {}", path.as_ref().display()));
    let bytes = std::fs::read(path.as_ref()).map_err(CsvError::IoError)?;
    parse_bytes(&bytes, schema, delimiter)
}

/// Parse raw bytes with auto-detection of encoding and, unless given, delimiter.
pub fn parse_bytes(bytes: &[u8], schema: &DatasetSchema, delimiter: Option<char>) -> LoadResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));

    let mut result = parse_str(&content, delimiter, schema)?;
    result.encoding = encoding;

    log_success(format!(
        "Read {} records (encoding {}, delimiter '{}')",
        result.records.len(),
        result.encoding,
        format_delimiter(result.delimiter)
    ));
    if result.skipped > 0 {
        log_warning(format!("Skipped {} rows with an empty value", result.skipped));
    }
    Ok(result)
}

/// Parse decoded text with an explicit delimiter.
pub fn parse_str(content: &str, delimiter: char, schema: &DatasetSchema) -> LoadResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile.into());
    }
    if !delimiter.is_ascii() {
        return Err(CsvError::InvalidDelimiter(delimiter).into());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(CsvError::from)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders.into());
    }

    let layout = ColumnLayout::resolve(&headers, schema)?;

    let mut records = Vec::new();
    let mut skipped = 0;

    for (row_idx, row) in reader.records().enumerate() {
        let line = row_idx + 2; // 1-indexed, after the header
        let row = row.map_err(CsvError::from)?;

        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let cell = |pos: usize| row.get(pos).unwrap_or("");

        let raw_value = cell(layout.value);
        if raw_value.is_empty() {
            skipped += 1;
            continue;
        }

        let value = raw_value.parse::<f64>().map_err(|_| SchemaError::InvalidValue {
            line,
            column: schema.value_column.clone(),
            value: raw_value.to_string(),
            expected: "a number",
        })?;

        let raw_period = cell(layout.period);
        let period = parse_integral(raw_period)
            .and_then(|p| i32::try_from(p).ok())
            .ok_or_else(|| SchemaError::InvalidValue {
                line,
                column: schema.period_column.clone(),
                value: raw_period.to_string(),
                expected: "an integer period",
            })?;

        let mut record = Record::new(cell(layout.entity), cell(layout.category), period, value);

        for (name, pos) in &layout.codes {
            let raw = cell(*pos);
            if raw.is_empty() {
                continue;
            }
            let code = parse_integral(raw).ok_or_else(|| SchemaError::InvalidValue {
                line,
                column: name.clone(),
                value: raw.to_string(),
                expected: "an integer code",
            })?;
            record.codes.insert(name.clone(), code);
        }

        records.push(record);
    }

    Ok(ParseResult {
        records: RecordSet::new(records, headers.clone()),
        encoding: "utf-8".to_string(),
        delimiter,
        headers,
        skipped,
    })
}

/// Positions of the schema columns in a header row.
struct ColumnLayout {
    entity: usize,
    category: usize,
    period: usize,
    value: usize,
    codes: Vec<(String, usize)>,
}

impl ColumnLayout {
    fn resolve(headers: &[String], schema: &DatasetSchema) -> Result<Self, SchemaError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))
        };

        let codes = schema
            .code_columns
            .iter()
            .map(|c| find(c).map(|pos| (c.clone(), pos)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            entity: find(&schema.entity_column)?,
            category: find(&schema.category_column)?,
            period: find(&schema.period_column)?,
            value: find(&schema.value_column)?,
            codes,
        })
    }
}

/// Parse an integer, accepting integral floats such as `2011.0`.
fn parse_integral(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let v = raw.parse::<f64>().ok()?;
    (v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64).then_some(v as i64)
}

pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

//! Plain-text record format.
//!
//! One record per line. Tokens are separated by commas when the line contains
//! any, otherwise by whitespace. A trailing empty token (a line ending in a
//! comma) is dropped.

use super::schema::{AttributeType, Schema};
use super::value::{Record, Value, decimal_places, is_missing_token};
use super::Dataset;
use crate::error::{ImputationError, Result, ResultExt};
use std::fs;
use std::path::Path;
use tracing::debug;

pub(crate) fn split_tokens(line: &str) -> Vec<&str> {
    if line.contains(',') {
        let mut tokens: Vec<&str> = line.split(',').map(str::trim).collect();
        if tokens.len() > 1 && tokens.last().is_some_and(|t| t.is_empty()) {
            tokens.pop();
        }
        tokens
    } else {
        line.split_whitespace().collect()
    }
}

fn parse_value(
    token: &str,
    kind: AttributeType,
    line: usize,
    attribute: &str,
) -> Result<Value> {
    if is_missing_token(token) {
        return Ok(Value::Missing);
    }
    match kind {
        AttributeType::Categorical => Ok(Value::Category(token.to_string())),
        AttributeType::Numeric => match token.parse::<f64>() {
            Ok(v) if v.is_nan() => Ok(Value::Missing),
            Ok(v) if v.is_finite() => Ok(Value::Number(v)),
            _ => Err(ImputationError::UnparsableNumber {
                line,
                attribute: attribute.to_string(),
                token: token.to_string(),
            }),
        },
    }
}

impl Dataset {
    /// Parse records in the plain-text format against `schema`.
    ///
    /// Blank lines are skipped. Line numbers in errors are 1-based.
    pub fn parse_text(schema: Schema, text: &str) -> Result<Dataset> {
        let mut records = Vec::new();
        let mut precision = vec![0usize; schema.len()];

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let line_no = index + 1;
            let tokens = split_tokens(line);
            if tokens.len() != schema.len() {
                return Err(ImputationError::AttributeCountMismatch {
                    line: line_no,
                    expected: schema.len(),
                    found: tokens.len(),
                });
            }

            let mut values = Vec::with_capacity(tokens.len());
            for (position, (token, attribute)) in
                tokens.iter().zip(schema.attributes()).enumerate()
            {
                let value = parse_value(token, attribute.kind, line_no, &attribute.name)?;
                if value.as_number().is_some() {
                    precision[position] = precision[position].max(decimal_places(token));
                }
                values.push(value);
            }
            records.push(Record::new(records.len(), values));
        }

        debug!(
            records = records.len(),
            attributes = schema.len(),
            "Parsed text dataset"
        );
        Ok(Dataset::new(schema, records)?.with_precision(precision))
    }

    /// Load a data file together with its attribute-metadata file.
    pub fn load_text(data_path: &Path, attributes_path: &Path) -> Result<Dataset> {
        let metadata = fs::read_to_string(attributes_path)
            .context(format!("Reading {}", attributes_path.display()))?;
        let schema = Schema::parse_metadata(&metadata)
            .context(format!("Parsing {}", attributes_path.display()))?;
        let text = fs::read_to_string(data_path)
            .context(format!("Reading {}", data_path.display()))?;
        Dataset::parse_text(schema, &text).context(format!("Parsing {}", data_path.display()))
    }

    /// Render every record in the plain-text format.
    ///
    /// Values are joined with `", "`. Numbers are written with the largest
    /// number of decimal places observed for their attribute in the input.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for record in self.records() {
            let line: Vec<String> = record
                .values
                .iter()
                .enumerate()
                .map(|(attribute, value)| match value {
                    Value::Number(v) => format!("{:.*}", self.precision(attribute), v),
                    other => other.to_string(),
                })
                .collect();
            out.push_str(&line.join(", "));
            out.push('\n');
        }
        out
    }

    pub fn write_text(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_text()).context(format!("Writing {}", path.display()))
    }
}

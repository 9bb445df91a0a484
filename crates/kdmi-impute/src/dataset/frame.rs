//! Conversion between [`Dataset`] and polars `DataFrame`s, plus CSV IO.

use super::schema::{Attribute, AttributeType, Schema};
use super::value::{Record, Value, decimal_places, is_missing_token};
use super::Dataset;
use crate::error::{ImputationError, Result, ResultExt};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::debug;

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Raw column contents before the schema is fixed.
enum RawColumn {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Dataset {
    /// Build a dataset from a `DataFrame`.
    ///
    /// Numeric dtypes become numeric attributes. String columns become numeric
    /// when every non-missing token parses as a number, categorical otherwise.
    /// Nulls and the usual missing tokens become [`Value::Missing`]. The last
    /// column is the class attribute.
    pub fn from_dataframe(df: &DataFrame) -> Result<Dataset> {
        if df.width() == 0 {
            return Err(ImputationError::InvalidConfig(
                "data frame has no columns".to_string(),
            ));
        }

        let mut names = Vec::with_capacity(df.width());
        let mut raw = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            names.push(column.name().to_string());
            if is_numeric_dtype(column.dtype()) {
                let floats = column.cast(&DataType::Float64)?;
                raw.push(RawColumn::Numeric(floats.f64()?.into_iter().collect()));
            } else {
                let strings = column.cast(&DataType::String)?;
                let values = strings
                    .str()?
                    .into_iter()
                    .map(|v| v.map(|s| s.trim().to_string()))
                    .collect();
                raw.push(RawColumn::Text(values));
            }
        }

        let text_columns: Vec<Vec<Option<String>>> = raw
            .iter()
            .map(|column| match column {
                RawColumn::Text(values) => values.clone(),
                RawColumn::Numeric(_) => Vec::new(),
            })
            .collect();
        let inferred = Schema::infer(&names, &text_columns);
        let schema = Schema::new(
            raw.iter()
                .enumerate()
                .map(|(i, column)| match column {
                    RawColumn::Numeric(_) => Attribute::numeric(names[i].clone()),
                    RawColumn::Text(_) => inferred.attribute(i).clone(),
                })
                .collect(),
        );

        let mut precision = vec![0usize; schema.len()];
        let mut rows: Vec<Vec<Value>> = vec![Vec::with_capacity(schema.len()); df.height()];
        for (attribute, column) in raw.iter().enumerate() {
            let kind = schema.attribute(attribute).kind;
            for (row, cell) in rows.iter_mut().enumerate() {
                let value = match column {
                    RawColumn::Numeric(values) => match values[row] {
                        Some(v) if v.is_finite() => {
                            precision[attribute] =
                                precision[attribute].max(decimal_places(&v.to_string()));
                            Value::Number(v)
                        }
                        _ => Value::Missing,
                    },
                    RawColumn::Text(values) => match values[row].as_deref() {
                        None => Value::Missing,
                        Some(token) if is_missing_token(token) => Value::Missing,
                        Some(token) => match kind {
                            AttributeType::Categorical => Value::Category(token.to_string()),
                            AttributeType::Numeric => {
                                precision[attribute] =
                                    precision[attribute].max(decimal_places(token));
                                token
                                    .parse::<f64>()
                                    .ok()
                                    .filter(|v| v.is_finite())
                                    .map(Value::Number)
                                    .unwrap_or(Value::Missing)
                            }
                        },
                    },
                };
                cell.push(value);
            }
        }

        let records = rows
            .into_iter()
            .enumerate()
            .map(|(id, values)| Record::new(id, values))
            .collect();
        debug!(
            rows = df.height(),
            columns = df.width(),
            "Converted data frame to dataset"
        );
        Ok(Dataset::new(schema, records)?.with_precision(precision))
    }

    /// Convert to a `DataFrame`: numeric attributes become `Float64` columns,
    /// categorical attributes `String` columns. Missing cells become nulls.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let columns: Vec<Column> = self
            .schema()
            .attributes()
            .iter()
            .enumerate()
            .map(|(i, attribute)| match attribute.kind {
                AttributeType::Numeric => {
                    let values: Vec<Option<f64>> = self
                        .records()
                        .iter()
                        .map(|r| r.value(i).as_number())
                        .collect();
                    Column::new(attribute.name.as_str().into(), values)
                }
                AttributeType::Categorical => {
                    let values: Vec<Option<&str>> = self
                        .records()
                        .iter()
                        .map(|r| r.value(i).as_category())
                        .collect();
                    Column::new(attribute.name.as_str().into(), values)
                }
            })
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    /// Load a CSV file with a header row.
    pub fn load_csv(path: &Path) -> Result<Dataset> {
        let df = CsvReadOptions::default()
            .with_infer_schema_length(Some(100))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .context(format!("Opening {}", path.display()))?
            .finish()
            .context(format!("Reading {}", path.display()))?;
        Dataset::from_dataframe(&df)
    }

    /// Write a CSV file with a header row.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path).context(format!("Creating {}", path.display()))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .finish(&mut df)
            .context(format!("Writing {}", path.display()))?;
        Ok(())
    }
}

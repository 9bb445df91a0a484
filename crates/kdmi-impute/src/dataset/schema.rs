//! Attribute metadata.

use crate::error::{ImputationError, Result};
use serde::{Deserialize, Serialize};

/// Type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Categorical,
    Numeric,
}

impl AttributeType {
    /// Single-letter code of the metadata format (`c` / `n`).
    pub fn code(&self) -> char {
        match self {
            Self::Categorical => 'c',
            Self::Numeric => 'n',
        }
    }

    /// Role code used in rule-file headers (0 = categorical, 1 = numeric).
    pub fn role_code(&self) -> u8 {
        match self {
            Self::Categorical => 0,
            Self::Numeric => 1,
        }
    }
}

/// Role code of the class attribute in rule-file headers.
pub const CLASS_ROLE_CODE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Categorical)
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Numeric)
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == AttributeType::Numeric
    }
}

/// Ordered attribute list of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    attributes: Vec<Attribute>,
    /// Class attribute declared by the metadata file, if any.
    declared_class: Option<usize>,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self {
            attributes,
            declared_class: None,
        }
    }

    pub fn with_declared_class(mut self, class_index: usize) -> Self {
        if class_index < self.attributes.len() {
            self.declared_class = Some(class_index);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, index: usize) -> &Attribute {
        &self.attributes[index]
    }

    pub fn declared_class(&self) -> Option<usize> {
        self.declared_class
    }

    /// Position of the attribute called `name`.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.attributes
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| ImputationError::AttributeNotFound(name.to_string()))
    }

    /// Copy of this schema with one attribute's type replaced.
    pub fn with_kind(&self, index: usize, kind: AttributeType) -> Schema {
        let mut schema = self.clone();
        schema.attributes[index].kind = kind;
        schema
    }

    /// Parse the attribute-metadata format.
    ///
    /// ```text
    /// <class index> <class value count>
    /// <record count> <attribute count>
    /// c, colour, 3, red, green, blue
    /// n, weight, 0.5, 9.0, 0.5, 18
    /// ```
    ///
    /// Only the type and name of each attribute are kept; domains are rebuilt
    /// from the data itself.
    pub fn parse_metadata(text: &str) -> Result<Schema> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());

        let (line_no, header) = lines.next().ok_or(ImputationError::MalformedMetadata {
            line: 1,
            reason: "missing class header line".to_string(),
        })?;
        let header = tokens(header);
        let class_index = header
            .first()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| ImputationError::MalformedMetadata {
                line: line_no,
                reason: "expected the class attribute index".to_string(),
            })?;

        let (line_no, counts) = lines.next().ok_or(ImputationError::MalformedMetadata {
            line: line_no + 1,
            reason: "missing record/attribute count line".to_string(),
        })?;
        let counts = tokens(counts);
        let declared_attrs = counts
            .get(1)
            .and_then(|t| t.parse::<usize>().ok())
            .ok_or_else(|| ImputationError::MalformedMetadata {
                line: line_no,
                reason: "expected '<record count> <attribute count>'".to_string(),
            })?;

        let mut attributes = Vec::with_capacity(declared_attrs);
        for (line_no, line) in lines {
            let fields = tokens(line);
            let kind = match fields.first().copied() {
                Some("c") | Some("C") => AttributeType::Categorical,
                Some("n") | Some("N") => AttributeType::Numeric,
                other => {
                    return Err(ImputationError::MalformedMetadata {
                        line: line_no,
                        reason: format!(
                            "attribute type must be 'c' or 'n', found '{}'",
                            other.unwrap_or_default()
                        ),
                    });
                }
            };
            let name = fields
                .get(1)
                .ok_or_else(|| ImputationError::MalformedMetadata {
                    line: line_no,
                    reason: "attribute name is missing".to_string(),
                })?;
            attributes.push(Attribute::new(*name, kind));
        }

        if attributes.len() != declared_attrs {
            return Err(ImputationError::AttributeCountMismatch {
                line: 2,
                expected: declared_attrs,
                found: attributes.len(),
            });
        }

        let schema = Schema::new(attributes);
        Ok(match usize::try_from(class_index) {
            Ok(index) => schema.with_declared_class(index),
            Err(_) => schema,
        })
    }

    /// Render the metadata format for this schema.
    ///
    /// Only type and name are written per attribute.
    pub fn to_metadata(&self, record_count: usize) -> String {
        let mut out = format!(
            "{} 0\n{} {}\n",
            self.declared_class.map(|c| c as i64).unwrap_or(-1),
            record_count,
            self.len()
        );
        for attribute in &self.attributes {
            out.push_str(&format!("{}, {}\n", attribute.kind.code(), attribute.name));
        }
        out
    }

    /// Infer a schema from header names and raw string columns.
    ///
    /// A column is numeric when every non-missing token parses as `f64`.
    pub fn infer(names: &[String], columns: &[Vec<Option<String>>]) -> Schema {
        let attributes = names
            .iter()
            .zip(columns)
            .map(|(name, column)| {
                let numeric = column
                    .iter()
                    .flatten()
                    .filter(|t| !super::is_missing_token(t))
                    .all(|t| t.trim().parse::<f64>().is_ok());
                if numeric {
                    Attribute::numeric(name.clone())
                } else {
                    Attribute::categorical(name.clone())
                }
            })
            .collect();
        Schema::new(attributes)
    }
}

fn tokens(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const METADATA: &str = "2 2\n10 3\nn, height, 1.0, 2.0, 0.1, 10\nc, colour, 2, red, blue\nc, label, 2, yes, no\n";

    #[test]
    fn test_parse_metadata() {
        let schema = Schema::parse_metadata(METADATA).unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.attribute(0), &Attribute::numeric("height"));
        assert_eq!(schema.attribute(1), &Attribute::categorical("colour"));
        assert_eq!(schema.declared_class(), Some(2));
        assert_eq!(schema.index_of("label").unwrap(), 2);
    }

    #[test]
    fn test_parse_metadata_count_mismatch() {
        let text = "0 2\n10 4\nc, a\nn, b\n";
        let err = Schema::parse_metadata(text).unwrap_err();
        assert!(matches!(
            err,
            ImputationError::AttributeCountMismatch {
                expected: 4,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_metadata_bad_type_reports_line() {
        let text = "0 2\n10 2\nc, a\nx, b\n";
        match Schema::parse_metadata(text).unwrap_err() {
            ImputationError::MalformedMetadata { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_attribute() {
        let schema = Schema::parse_metadata(METADATA).unwrap();
        assert!(matches!(
            schema.index_of("weight"),
            Err(ImputationError::AttributeNotFound(_))
        ));
    }

    #[test]
    fn test_infer_schema() {
        let names = vec!["x".to_string(), "y".to_string()];
        let columns = vec![
            vec![Some("1.5".to_string()), Some("?".to_string()), None],
            vec![Some("1".to_string()), Some("b".to_string()), None],
        ];
        let schema = Schema::infer(&names, &columns);
        assert!(schema.attribute(0).is_numeric());
        assert!(!schema.attribute(1).is_numeric());
    }

    #[test]
    fn test_metadata_round_trip_keeps_names_and_types() {
        let schema = Schema::parse_metadata(METADATA).unwrap();
        let reparsed = Schema::parse_metadata(&schema.to_metadata(10)).unwrap();
        assert_eq!(schema, reparsed);
    }
}

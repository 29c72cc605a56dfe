//! Which (stem, column) pairs a reduction processes.

use std::collections::{BTreeMap, BTreeSet};

use batchlab_core::{BatchError, ErrorInfo, ProductSpec};

/// Exhaustive reduction, or only the pairs downstream products consume.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Every column of every stem found in the inputs.
    #[default]
    Exhaustive,
    /// Declared columns per stem.
    Products(BTreeMap<String, BTreeSet<String>>),
}

impl Selection {
    /// Selection implied by configured products; none means exhaustive.
    pub fn from_products(products: &[ProductSpec]) -> Self {
        Self::from_pairs(
            products
                .iter()
                .flat_map(|product| product.columns.iter().map(|column| (product.stem.as_str(), column.as_str()))),
        )
    }

    /// Selection of explicit (stem, column) pairs.
    pub fn from_pairs<I, S, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: Into<String>,
        C: Into<String>,
    {
        let mut stems: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (stem, column) in pairs {
            stems.entry(stem.into()).or_default().insert(column.into());
        }
        if stems.is_empty() {
            Selection::Exhaustive
        } else {
            Selection::Products(stems)
        }
    }

    /// True when nothing narrows the reduction.
    pub fn is_exhaustive(&self) -> bool {
        matches!(self, Selection::Exhaustive)
    }

    /// Stems to process, given those present in the inputs. Declared stems
    /// are returned even when absent.
    pub fn stems(&self, available: &BTreeSet<String>) -> Vec<String> {
        match self {
            Selection::Exhaustive => available.iter().cloned().collect(),
            Selection::Products(stems) => stems.keys().cloned().collect(),
        }
    }

    /// Columns of `stem` to process, in table order.
    pub fn columns(&self, stem: &str, header: &[String]) -> Result<Vec<String>, BatchError> {
        let declared = match self {
            Selection::Exhaustive => return Ok(header.to_vec()),
            Selection::Products(stems) => match stems.get(stem) {
                Some(columns) => columns,
                None => return Ok(Vec::new()),
            },
        };
        if let Some(missing) = declared.iter().find(|column| !header.contains(column)) {
            return Err(BatchError::SchemaMismatch(
                ErrorInfo::new("reduce.column_missing", "declared column is absent from the table")
                    .with_context("stem", stem)
                    .with_context("column", missing.clone())
                    .with_hint(format!("available columns: {}", header.join(", "))),
            ));
        }
        Ok(header
            .iter()
            .filter(|column| declared.contains(*column))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        vec!["t".into(), "x".into(), "y".into()]
    }

    #[test]
    fn no_products_is_exhaustive() {
        let selection = Selection::from_products(&[]);
        assert!(selection.is_exhaustive());
        assert_eq!(selection.columns("pos", &header()).expect("columns"), header());
    }

    #[test]
    fn declared_columns_keep_table_order() {
        let selection = Selection::from_products(&[
            ProductSpec {
                stem: "pos".into(),
                columns: vec!["y".into()],
            },
            ProductSpec {
                stem: "pos".into(),
                columns: vec!["t".into()],
            },
        ]);
        assert_eq!(selection.columns("pos", &header()).expect("columns"), ["t", "y"]);
        assert!(selection.columns("energy", &header()).expect("columns").is_empty());
        let available = BTreeSet::from(["energy".to_string(), "pos".to_string()]);
        assert_eq!(selection.stems(&available), ["pos"]);
    }

    #[test]
    fn absent_declared_column_is_schema_mismatch() {
        let selection = Selection::from_pairs([("pos", "z")]);
        let err = selection.columns("pos", &header()).expect_err("missing column");
        assert!(matches!(err, BatchError::SchemaMismatch(_)));
    }
}

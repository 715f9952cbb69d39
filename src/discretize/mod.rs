//! Discretization of datasets into dense code tables
//!
//! ```text
//! Dataset ──discretize──> DiscretizedTable + Mapping + ReverseMapping
//! ```
//!
//! Codes are assigned per attribute in sorted value order, so the same data
//! always produces the same codes regardless of row order.

pub mod mapping;

pub use mapping::{build_codec, Code, Mapping, ReverseMapping};

use crate::dataset::Dataset;
use crate::{Error, Result};

/// Row-major matrix of codes, one column per retained attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscretizedTable {
    attributes: Vec<String>,
    domain_sizes: Vec<usize>,
    codes: Vec<Code>,
    num_rows: usize,
}

impl DiscretizedTable {
    /// Build a table from rows of codes
    ///
    /// # Errors
    /// Returns error if a row has the wrong width or a code falls outside its domain
    pub fn from_rows(
        attributes: Vec<String>,
        domain_sizes: Vec<usize>,
        rows: &[Vec<Code>],
    ) -> Result<Self> {
        if attributes.len() != domain_sizes.len() {
            return Err(Error::InvalidInput(format!(
                "{} attributes but {} domain sizes",
                attributes.len(),
                domain_sizes.len()
            )));
        }
        let width = attributes.len();
        let mut codes = Vec::with_capacity(rows.len() * width);
        for (row_index, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(Error::InvalidInput(format!(
                    "Row {row_index} has {} codes, expected {width}",
                    row.len()
                )));
            }
            for (attr, &code) in row.iter().enumerate() {
                if code as usize >= domain_sizes[attr] {
                    return Err(Error::UnknownCode {
                        attribute: attributes[attr].clone(),
                        code,
                    });
                }
            }
            codes.extend_from_slice(row);
        }
        Ok(Self {
            attributes,
            domain_sizes,
            codes,
            num_rows: rows.len(),
        })
    }

    /// Same shape, new codes (used by the randomizer)
    pub(crate) fn with_codes(&self, codes: Vec<Code>) -> Self {
        debug_assert_eq!(codes.len(), self.codes.len());
        Self {
            attributes: self.attributes.clone(),
            domain_sizes: self.domain_sizes.clone(),
            codes,
            num_rows: self.num_rows,
        }
    }

    /// Retained attribute names, in schema order
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Number of retained attributes
    #[must_use]
    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    /// Number of rows
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Domain size of every attribute
    #[must_use]
    pub fn domain_sizes(&self) -> &[usize] {
        &self.domain_sizes
    }

    /// Position of an attribute
    #[must_use]
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a == name)
    }

    /// Codes of one row
    #[must_use]
    pub fn row(&self, row: usize) -> &[Code] {
        let width = self.num_attributes();
        &self.codes[row * width..(row + 1) * width]
    }

    /// Iterate over rows
    pub fn rows(&self) -> impl Iterator<Item = &[Code]> {
        // chunks_exact(0) panics; a table without attributes has no rows to visit
        self.codes.chunks_exact(self.num_attributes().max(1))
    }

    /// Code at `(row, attribute)`
    #[must_use]
    pub fn code(&self, row: usize, attribute: usize) -> Code {
        self.codes[row * self.num_attributes() + attribute]
    }

    /// All codes, row-major
    #[must_use]
    pub fn codes(&self) -> &[Code] {
        &self.codes
    }
}

/// Discretize a dataset, dropping the attributes named in `exclude`
///
/// # Errors
/// - `UnknownAttribute` if `exclude` names an attribute the schema lacks
/// - `EmptyDomain` if no attribute remains
/// - storage errors from reading the columns
#[tracing::instrument(skip(dataset, exclude), fields(rows = dataset.num_rows()))]
pub fn discretize<S: AsRef<str>>(
    dataset: &Dataset,
    exclude: &[S],
) -> Result<(DiscretizedTable, Mapping, ReverseMapping)> {
    let schema = dataset.schema();
    for name in exclude {
        if schema.get(name.as_ref()).is_none() {
            return Err(Error::UnknownAttribute(name.as_ref().to_string()));
        }
    }

    let retained: Vec<&str> = schema
        .attributes()
        .iter()
        .map(|spec| spec.name.as_str())
        .filter(|name| !exclude.iter().any(|e| e.as_ref() == *name))
        .collect();
    if retained.is_empty() {
        return Err(Error::EmptyDomain);
    }

    let mut columns = Vec::with_capacity(retained.len());
    for name in &retained {
        columns.push(dataset.column_values(name)?);
    }

    let domains = retained
        .iter()
        .zip(&columns)
        .map(|(name, values)| ((*name).to_string(), values.clone()))
        .collect();
    let (mapping, reverse_mapping) = build_codec(domains)?;

    let num_rows = dataset.num_rows();
    let width = retained.len();
    let mut codes = vec![0 as Code; num_rows * width];
    for (attr, values) in columns.iter().enumerate() {
        for (row, value) in values.iter().enumerate() {
            codes[row * width + attr] = mapping.encode_at(attr, value)?;
        }
    }

    let domain_sizes = (0..width)
        .map(|attr| mapping.domain_size(attr).unwrap_or(0))
        .collect();

    tracing::debug!(attributes = width, rows = num_rows, "discretized dataset");

    Ok((
        DiscretizedTable {
            attributes: retained.into_iter().map(str::to_string).collect(),
            domain_sizes,
            codes,
            num_rows,
        },
        mapping,
        reverse_mapping,
    ))
}

//! Mapping codec: per-attribute `value <-> code` tables
//!
//! Codes are dense, start at zero, and follow the sorted order of the
//! distinct values observed for the attribute. The forward and reverse
//! tables are always built together from one sorted domain, which is what
//! makes decoding an exact inverse of encoding.

use crate::dataset::Value;
use crate::{Error, Result};
use rustc_hash::FxHashMap;

/// Discrete code for one attribute value
pub type Code = u32;

fn index_attributes(attributes: &[String]) -> FxHashMap<String, usize> {
    attributes
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

/// Forward table: value to code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    attributes: Vec<String>,
    index: FxHashMap<String, usize>,
    codes: Vec<FxHashMap<Value, Code>>,
}

/// Reverse table: code to value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseMapping {
    attributes: Vec<String>,
    index: FxHashMap<String, usize>,
    values: Vec<Vec<Value>>,
}

/// Build both directions of the codec from per-attribute domains
///
/// Each domain is sorted and deduplicated before codes are assigned.
///
/// # Errors
/// Returns error if an attribute name repeats or a domain exceeds the code space
#[allow(clippy::cast_possible_truncation)]
pub fn build_codec(domains: Vec<(String, Vec<Value>)>) -> Result<(Mapping, ReverseMapping)> {
    let mut attributes = Vec::with_capacity(domains.len());
    let mut codes = Vec::with_capacity(domains.len());
    let mut values = Vec::with_capacity(domains.len());

    for (name, mut domain) in domains {
        if attributes.contains(&name) {
            return Err(Error::InvalidInput(format!(
                "Duplicate attribute in mapping: {name}"
            )));
        }
        domain.sort_unstable();
        domain.dedup();
        if Code::try_from(domain.len()).is_err() {
            return Err(Error::InvalidInput(format!(
                "Attribute '{name}' has {} distinct values, exceeding the code space",
                domain.len()
            )));
        }

        let forward: FxHashMap<Value, Code> = domain
            .iter()
            .enumerate()
            .map(|(code, value)| (value.clone(), code as Code))
            .collect();

        attributes.push(name);
        codes.push(forward);
        values.push(domain);
    }

    let index = index_attributes(&attributes);
    Ok((
        Mapping {
            attributes: attributes.clone(),
            index: index.clone(),
            codes,
        },
        ReverseMapping {
            attributes,
            index,
            values,
        },
    ))
}

impl Mapping {
    /// Attribute names in mapping order
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Position of an attribute in mapping order
    #[must_use]
    pub fn attribute_index(&self, attribute: &str) -> Option<usize> {
        self.index.get(attribute).copied()
    }

    /// Number of codes assigned to the attribute at `index`
    #[must_use]
    pub fn domain_size(&self, index: usize) -> Option<usize> {
        self.codes.get(index).map(FxHashMap::len)
    }

    /// Encode a value of the named attribute
    ///
    /// # Errors
    /// Returns `UnknownAttribute` for unmapped attributes and `UnknownValue`
    /// for values never observed
    pub fn discretize(&self, value: &Value, attribute: &str) -> Result<Code> {
        let index = self
            .attribute_index(attribute)
            .ok_or_else(|| Error::UnknownAttribute(attribute.to_string()))?;
        self.encode_at(index, value)
    }

    /// Encode a value of the attribute at `index`
    ///
    /// # Errors
    /// Returns `UnknownValue` for values never observed
    pub fn encode_at(&self, index: usize, value: &Value) -> Result<Code> {
        let codes = self
            .codes
            .get(index)
            .ok_or_else(|| Error::UnknownAttribute(format!("#{index}")))?;
        codes.get(value).copied().ok_or_else(|| Error::UnknownValue {
            attribute: self.attributes[index].clone(),
            value: value.to_string(),
        })
    }
}

impl ReverseMapping {
    /// Attribute names in mapping order
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Position of an attribute in mapping order
    #[must_use]
    pub fn attribute_index(&self, attribute: &str) -> Option<usize> {
        self.index.get(attribute).copied()
    }

    /// Number of codes assigned to the attribute at `index`
    #[must_use]
    pub fn domain_size(&self, index: usize) -> Option<usize> {
        self.values.get(index).map(Vec::len)
    }

    /// Decoded domain of the attribute at `index`, in code order
    #[must_use]
    pub fn domain(&self, index: usize) -> Option<&[Value]> {
        self.values.get(index).map(Vec::as_slice)
    }

    /// Decode a code of the named attribute
    ///
    /// # Errors
    /// Returns `UnknownAttribute` for unmapped attributes and `UnknownCode`
    /// for codes never assigned
    pub fn reverse_lookup(&self, code: Code, attribute: &str) -> Result<&Value> {
        let index = self
            .attribute_index(attribute)
            .ok_or_else(|| Error::UnknownAttribute(attribute.to_string()))?;
        self.decode_at(index, code)
    }

    /// Decode a code of the attribute at `index`
    ///
    /// # Errors
    /// Returns `UnknownCode` for codes never assigned
    pub fn decode_at(&self, index: usize, code: Code) -> Result<&Value> {
        let values = self
            .values
            .get(index)
            .ok_or_else(|| Error::UnknownAttribute(format!("#{index}")))?;
        values
            .get(code as usize)
            .ok_or_else(|| Error::UnknownCode {
                attribute: self.attributes[index].clone(),
                code,
            })
    }
}

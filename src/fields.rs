//! Response field selection.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Field names the provider accepts in the `fields` parameter.
pub const AVAILABLE_FIELDS: [&str; 25] = [
    "status",
    "message",
    "continent",
    "continentCode",
    "country",
    "countryCode",
    "region",
    "regionName",
    "city",
    "district",
    "zip",
    "lat",
    "lon",
    "timezone",
    "offset",
    "currency",
    "isp",
    "org",
    "as",
    "asname",
    "reverse",
    "mobile",
    "proxy",
    "hosting",
    "query",
];

/// Which fields to ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fields {
    /// Named fields, each checked against [`AVAILABLE_FIELDS`].
    Names(Vec<String>),
    /// Numeric bit mask, passed through as-is.
    Mask(u64),
}

impl Fields {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Fields::Names(names.into_iter().map(Into::into).collect())
    }

    /// Serialize to the `fields` query value.
    pub fn to_param(&self) -> Result<String> {
        match self {
            Fields::Mask(mask) => Ok(mask.to_string()),
            Fields::Names(names) => {
                let invalid: BTreeSet<&str> = names
                    .iter()
                    .map(String::as_str)
                    .filter(|name| !AVAILABLE_FIELDS.contains(name))
                    .collect();
                if !invalid.is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "Invalid fields: {}",
                        invalid.into_iter().collect::<Vec<_>>().join(", ")
                    )));
                }
                Ok(names.join(","))
            }
        }
    }
}

impl From<u64> for Fields {
    fn from(mask: u64) -> Self {
        Fields::Mask(mask)
    }
}

impl From<Vec<String>> for Fields {
    fn from(names: Vec<String>) -> Self {
        Fields::Names(names)
    }
}

impl From<&[&str]> for Fields {
    fn from(names: &[&str]) -> Self {
        Fields::names(names.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Fields {
    fn from(names: [&str; N]) -> Self {
        Fields::names(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_keep_caller_order() {
        let fields = Fields::from(["query", "country", "as", "status"]);
        assert_eq!(fields.to_param().unwrap(), "query,country,as,status");
    }

    #[test]
    fn test_every_available_field_is_accepted() {
        let fields = Fields::from(&AVAILABLE_FIELDS[..]);
        assert_eq!(fields.to_param().unwrap(), AVAILABLE_FIELDS.join(","));
    }

    #[test]
    fn test_mask_passes_through() {
        assert_eq!(Fields::Mask(0).to_param().unwrap(), "0");
        assert_eq!(Fields::from(66846719u64).to_param().unwrap(), "66846719");
    }

    #[test]
    fn test_invalid_fields_are_named() {
        let fields = Fields::from(["country", "bogus", "Country"]);
        match fields.to_param() {
            Err(Error::InvalidArgument(msg)) => assert_eq!(msg, "Invalid fields: Country, bogus"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

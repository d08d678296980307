//! Listing Converter: flat `field:value` text used for embedding and storage.
//!
//! Layout, one field per line in fixed order, description last and unbounded:
//!
//! ```text
//! neighborhood:Green Oaks
//! price:$800,000
//! bedrooms:3
//! bathrooms:2
//! house size:2,000 sqft
//! description:Welcome to ...
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{format_house_size, format_price, validate, ListingRecord, ListingValidationError, RawListing};

static NEIGHBORHOOD: Lazy<Regex> = Lazy::new(|| line_pattern("neighborhood"));
static PRICE: Lazy<Regex> = Lazy::new(|| line_pattern("price"));
static BEDROOMS: Lazy<Regex> = Lazy::new(|| line_pattern("bedrooms"));
static BATHROOMS: Lazy<Regex> = Lazy::new(|| line_pattern("bathrooms"));
static HOUSE_SIZE: Lazy<Regex> = Lazy::new(|| line_pattern("house size"));
// Everything after the label to the end of the text, newlines included.
static DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?ms)^description:(.*)\z").expect("valid description pattern"));

fn line_pattern(label: &str) -> Regex {
    Regex::new(&format!(r"(?m)^{}:(.*)$", regex::escape(label))).expect("valid field pattern")
}

/// Serializes a record into its line-oriented text form.
pub fn to_text(record: &ListingRecord) -> String {
    format!(
        "neighborhood:{}\nprice:{}\nbedrooms:{}\nbathrooms:{}\nhouse size:{}\ndescription:{}",
        record.neighborhood(),
        format_price(record.price()),
        record.bedrooms(),
        record.bathrooms(),
        format_house_size(record.house_size()),
        record.description(),
    )
}

/// Parses the text form back into a validated record. A missing label or
/// an invalid value fails with the aggregated validation error.
pub fn from_text(text: &str) -> Result<ListingRecord, ListingValidationError> {
    let capture = |pattern: &Regex| {
        pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| Value::String(m.as_str().trim().to_string()))
    };

    validate(RawListing {
        neighborhood: capture(&NEIGHBORHOOD),
        price: capture(&PRICE),
        bedrooms: capture(&BEDROOMS),
        bathrooms: capture(&BATHROOMS),
        house_size: capture(&HOUSE_SIZE),
        description: capture(&DESCRIPTION),
        augmented_description: None,
    })
}

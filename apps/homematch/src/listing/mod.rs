//! Listing Schema: the canonical `ListingRecord`, its field-level validation,
//! and its JSON representation under capitalized display names.
//!
//! Every record, whether freshly generated or reconstructed from the vector
//! index, is built through `validate`. Each field has an explicit check that
//! returns `Result<_, FieldViolation>`; all violations are collected into a
//! single `ListingValidationError`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub mod converter;

pub use converter::{from_text, to_text};

pub const PRICE_PREFIX: &str = "$";
pub const HOUSE_SIZE_SUFFIX: &str = "sqft";

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// One violated invariant on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl FieldViolation {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every invariant a candidate listing violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid listing: {}", join_violations(.violations))]
pub struct ListingValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ListingValidationError {
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Unvalidated listing fields as they arrive from the model or from JSON.
/// Values stay loosely typed until `validate` inspects them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    #[serde(rename = "Neighborhood", alias = "neighborhood", default)]
    pub neighborhood: Option<Value>,
    #[serde(rename = "Price", alias = "price", default)]
    pub price: Option<Value>,
    #[serde(rename = "Bedrooms", alias = "bedrooms", default)]
    pub bedrooms: Option<Value>,
    #[serde(rename = "Bathrooms", alias = "bathrooms", default)]
    pub bathrooms: Option<Value>,
    #[serde(
        rename = "House Size",
        alias = "house_size",
        alias = "house size",
        default
    )]
    pub house_size: Option<Value>,
    #[serde(rename = "Description", alias = "description", default)]
    pub description: Option<Value>,
    #[serde(
        rename = "Augmented Description",
        alias = "augmented_description",
        default
    )]
    pub augmented_description: Option<Value>,
}

/// A validated property listing.
///
/// Fields are private so the invariants established by `validate` hold for
/// the record's lifetime; only the augmented description may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawListing", into = "RawListing")]
pub struct ListingRecord {
    neighborhood: String,
    price: u64,
    bedrooms: f64,
    bathrooms: f64,
    house_size: u64,
    description: String,
    augmented_description: Option<String>,
}

impl ListingRecord {
    /// Builds a record from typed values, enforcing the same invariants as
    /// `validate`.
    #[cfg(test)]
    pub fn new(
        neighborhood: &str,
        price: u64,
        bedrooms: f64,
        bathrooms: f64,
        house_size: u64,
        description: &str,
    ) -> Result<Self, ListingValidationError> {
        validate(RawListing {
            neighborhood: Some(json!(neighborhood)),
            price: Some(json!(format_price(price))),
            bedrooms: Some(json!(bedrooms)),
            bathrooms: Some(json!(bathrooms)),
            house_size: Some(json!(format_house_size(house_size))),
            description: Some(json!(description)),
            augmented_description: None,
        })
    }

    pub fn neighborhood(&self) -> &str {
        &self.neighborhood
    }

    /// Price in whole dollars.
    pub fn price(&self) -> u64 {
        self.price
    }

    pub fn bedrooms(&self) -> f64 {
        self.bedrooms
    }

    pub fn bathrooms(&self) -> f64 {
        self.bathrooms
    }

    /// House size in square feet.
    pub fn house_size(&self) -> u64 {
        self.house_size
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn augmented_description(&self) -> Option<&str> {
        self.augmented_description.as_deref()
    }

    pub fn set_augmented_description(&mut self, text: impl Into<String>) {
        self.augmented_description = Some(text.into());
    }
}

impl TryFrom<RawListing> for ListingRecord {
    type Error = ListingValidationError;

    fn try_from(raw: RawListing) -> Result<Self, Self::Error> {
        validate(raw)
    }
}

impl From<ListingRecord> for RawListing {
    fn from(record: ListingRecord) -> Self {
        RawListing {
            neighborhood: Some(Value::String(record.neighborhood)),
            price: Some(Value::String(format_price(record.price))),
            bedrooms: Some(json!(record.bedrooms)),
            bathrooms: Some(json!(record.bathrooms)),
            house_size: Some(Value::String(format_house_size(record.house_size))),
            description: Some(Value::String(record.description)),
            augmented_description: Some(
                record
                    .augmented_description
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            ),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

/// Validates raw fields into a `ListingRecord`, reporting every violation.
pub fn validate(raw: RawListing) -> Result<ListingRecord, ListingValidationError> {
    let neighborhood = check_neighborhood(raw.neighborhood.as_ref());
    let price = check_price(raw.price.as_ref());
    let bedrooms = check_rooms("Bedrooms", raw.bedrooms.as_ref());
    let bathrooms = check_rooms("Bathrooms", raw.bathrooms.as_ref());
    let house_size = check_house_size(raw.house_size.as_ref());
    let description = check_description(raw.description.as_ref());
    let augmented = check_augmented_description(raw.augmented_description.as_ref());

    match (
        neighborhood,
        price,
        bedrooms,
        bathrooms,
        house_size,
        description,
        augmented,
    ) {
        (Ok(n), Ok(p), Ok(bed), Ok(bath), Ok(size), Ok(d), Ok(a)) => Ok(ListingRecord {
            neighborhood: n,
            price: p,
            bedrooms: bed,
            bathrooms: bath,
            house_size: size,
            description: d,
            augmented_description: a,
        }),
        (n, p, bed, bath, size, d, a) => {
            let violations = [
                n.err(),
                p.err(),
                bed.err(),
                bath.err(),
                size.err(),
                d.err(),
                a.err(),
            ]
            .into_iter()
            .flatten()
            .collect();
            Err(ListingValidationError { violations })
        }
    }
}

fn require<'a>(field: &'static str, value: Option<&'a Value>) -> Result<&'a Value, FieldViolation> {
    match value {
        None | Some(Value::Null) => Err(FieldViolation::new(field, "is required")),
        Some(v) => Ok(v),
    }
}

fn require_str<'a>(field: &'static str, value: Option<&'a Value>) -> Result<&'a str, FieldViolation> {
    require(field, value)?
        .as_str()
        .ok_or_else(|| FieldViolation::new(field, "must be a string"))
}

fn check_neighborhood(value: Option<&Value>) -> Result<String, FieldViolation> {
    let neighborhood = require_str("Neighborhood", value)?.trim();
    // The text form stores it on one labelled line.
    if neighborhood.contains(|c| c == '\n' || c == '\r') {
        return Err(FieldViolation::new("Neighborhood", "must be a single line"));
    }
    Ok(neighborhood.to_string())
}

fn check_price(value: Option<&Value>) -> Result<u64, FieldViolation> {
    let text = require_str("Price", value)?.trim();
    let amount = text.strip_prefix(PRICE_PREFIX).ok_or_else(|| {
        FieldViolation::new("Price", format!("must start with \"{PRICE_PREFIX}\""))
    })?;
    parse_positive_integer(amount)
        .ok_or_else(|| FieldViolation::new("Price", "must be a positive integer amount"))
}

fn check_rooms(field: &'static str, value: Option<&Value>) -> Result<f64, FieldViolation> {
    let count = match require(field, value)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .ok_or_else(|| FieldViolation::new(field, "must be a number"))?;

    if count <= 0.0 {
        return Err(FieldViolation::new(field, "must be positive"));
    }
    Ok(count)
}

fn check_house_size(value: Option<&Value>) -> Result<u64, FieldViolation> {
    let text = require_str("House Size", value)?.trim();
    let size = text.strip_suffix(HOUSE_SIZE_SUFFIX).ok_or_else(|| {
        FieldViolation::new("House Size", format!("must end with \"{HOUSE_SIZE_SUFFIX}\""))
    })?;
    parse_positive_integer(size)
        .ok_or_else(|| FieldViolation::new("House Size", "must be a positive integer"))
}

fn check_description(value: Option<&Value>) -> Result<String, FieldViolation> {
    let text = require_str("Description", value)?.trim();
    if text.is_empty() {
        return Err(FieldViolation::new("Description", "must not be empty"));
    }
    Ok(text.to_string())
}

fn check_augmented_description(value: Option<&Value>) -> Result<Option<String>, FieldViolation> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(FieldViolation::new(
            "Augmented Description",
            "must be a string",
        )),
    }
}

/// Parses `1,200,000` / `1200000` into a strictly positive integer.
fn parse_positive_integer(text: &str) -> Option<u64> {
    let digits: String = text.trim().chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().filter(|n| *n > 0)
}

// ────────────────────────────────────────────────────────────────────────────
// Formatting
// ────────────────────────────────────────────────────────────────────────────

pub fn format_price(price: u64) -> String {
    format!("{PRICE_PREFIX}{}", group_thousands(price))
}

pub fn format_house_size(size: u64) -> String {
    format!("{} {HOUSE_SIZE_SUFFIX}", group_thousands(size))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// JSON schema of a generated listing, embedded in the generation prompt so
/// the model's output is self-describing.
pub fn listing_json_schema() -> Value {
    json!({
        "title": "HouseListing",
        "type": "object",
        "properties": {
            "Neighborhood": {"title": "Neighborhood", "type": "string"},
            "Price": {
                "title": "Price",
                "type": "string",
                "description": "Price in dollars, starting with \"$\", e.g. \"$800,000\""
            },
            "Bedrooms": {"title": "Bedrooms", "type": "number"},
            "Bathrooms": {"title": "Bathrooms", "type": "number"},
            "House Size": {
                "title": "House Size",
                "type": "string",
                "description": "House size in square feet, ending with \"sqft\", e.g. \"2,000 sqft\""
            },
            "Description": {
                "title": "Description",
                "type": "string",
                "description": "Description of the house"
            }
        },
        "required": ["Neighborhood", "Price", "Bedrooms", "Bathrooms", "House Size", "Description"]
    })
}

//! Wire rows of the `booths` and `favorites` tables.
//!
//! Ids, prices and booth locations may be stored as numbers or text depending
//! on the column type, so they are decoded as either and kept as strings.

use boothmark_core::{AnnotationRow, Item, ItemId, Price};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Columns selected from `booths`.
pub const BOOTH_COLUMNS: &str = "id,title,publisher,location,availability,msrp,bgg_id";

/// A row of the `booths` table.
#[derive(Debug, Clone, Deserialize)]
pub struct BoothRow {
    #[serde(deserialize_with = "scalar")]
    pub id: String,
    pub title: String,
    pub publisher: String,
    #[serde(default, deserialize_with = "optional_scalar")]
    pub location: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar")]
    pub msrp: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar")]
    pub bgg_id: Option<String>,
}

impl From<BoothRow> for Item {
    fn from(row: BoothRow) -> Self {
        Item {
            id: ItemId::new(row.id),
            title: row.title,
            external_ref: row.bgg_id.unwrap_or_default(),
            availability: row.availability.unwrap_or_default(),
            price: row.msrp.map_or(Price::NotAvailable, Price::from),
            publisher: row.publisher,
            location: row.location.filter(|l| !l.trim().is_empty()),
        }
    }
}

/// `favorites?select=booth_id,is_visited`
#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteRow {
    #[serde(deserialize_with = "scalar")]
    pub booth_id: String,
    #[serde(default)]
    pub is_visited: Option<bool>,
}

impl From<FavoriteRow> for AnnotationRow {
    fn from(row: FavoriteRow) -> Self {
        AnnotationRow {
            item_id: ItemId::new(row.booth_id),
            is_favorite: true,
            is_visited: row.is_visited.unwrap_or(false),
        }
    }
}

/// `favorites` with the referenced booth embedded.
#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteBoothRow {
    /// Null when the row points at a booth that no longer exists.
    #[serde(default)]
    pub booths: Option<BoothRow>,
    #[serde(default)]
    pub is_visited: Option<bool>,
}

/// Body of favorite inserts and upserts.
#[derive(Debug, Clone, Serialize)]
pub struct FavoriteWrite<'a> {
    pub user_id: &'a str,
    pub booth_id: &'a str,
    pub is_visited: bool,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    scalar_text(Value::deserialize(deserializer)?).ok_or_else(|| serde::de::Error::custom("unexpected null"))
}

fn optional_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

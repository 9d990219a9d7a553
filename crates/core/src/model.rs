//! Catalog data model.
//!
//! Items come from the remote catalog, annotations are a user's personal
//! favorite/visited flags, and a [`ViewModel`] is the merged, grouped
//! representation cached per `(resource, user)`.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Base URL for an item's external catalog page.
const EXTERNAL_BASE_URL: &str = "https://boardgamegeek.com/boardgame";

/// Sentinel the catalog uses for a missing price.
const PRICE_NOT_AVAILABLE: &str = "N/A";

/// Opaque identifier of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Identifier of a catalog item (a booth title).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ItemId(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(UserId);
string_id!(ItemId);

/// Listed price: a decimal amount kept as text, or the "N/A" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Price {
    Amount(String),
    NotAvailable,
}

impl From<String> for Price {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == PRICE_NOT_AVAILABLE {
            Price::NotAvailable
        } else {
            Price::Amount(trimmed.to_string())
        }
    }
}

impl From<Price> for String {
    fn from(price: Price) -> Self {
        match price {
            Price::Amount(amount) => amount,
            Price::NotAvailable => PRICE_NOT_AVAILABLE.to_string(),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Amount(amount) => write!(f, "${amount}"),
            Price::NotAvailable => f.write_str(PRICE_NOT_AVAILABLE),
        }
    }
}

/// A catalog entry: one title offered at a publisher's booth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    /// Catalog link id used to build [`Item::external_url`].
    pub external_ref: String,
    /// Free-text availability status ("Demo", "For sale", ...).
    pub availability: String,
    #[schemars(with = "String")]
    pub price: Price,
    pub publisher: String,
    /// Booth location; may start with a numeric booth number.
    pub location: Option<String>,
}

impl Item {
    /// Link to the item's page in the external catalog.
    pub fn external_url(&self) -> String {
        format!("{EXTERNAL_BASE_URL}/{}", self.external_ref)
    }
}

/// A user's flags for one item. A missing annotation means both false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Annotation {
    pub is_favorite: bool,
    pub is_visited: bool,
}

impl Annotation {
    pub const fn new(is_favorite: bool, is_visited: bool) -> Self {
        Self { is_favorite, is_visited }
    }
}

/// One annotation row as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRow {
    pub item_id: ItemId,
    pub is_favorite: bool,
    pub is_visited: bool,
}

impl AnnotationRow {
    pub fn annotation(&self) -> Annotation {
        Annotation::new(self.is_favorite, self.is_visited)
    }
}

/// An item together with the current user's annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnnotatedItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(flatten)]
    pub annotation: Annotation,
}

impl AnnotatedItem {
    pub fn new(item: Item, annotation: Annotation) -> Self {
        Self { item, annotation }
    }

    pub fn id(&self) -> &ItemId {
        &self.item.id
    }
}

/// Items bucketed under one publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Group {
    /// Publisher name.
    pub key: String,
    /// Display-only location, taken from the first item seen for the group.
    pub location: Option<String>,
    pub items: Vec<AnnotatedItem>,
}

impl Group {
    /// Header line shown above the group, e.g. `Stonemaier #1204`.
    pub fn heading(&self) -> String {
        match self.location.as_deref().filter(|loc| !loc.is_empty()) {
            Some(location) => format!("{} #{location}", self.key),
            None => self.key.clone(),
        }
    }
}

/// The merged, grouped view cached per `(resource, user)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ViewModel {
    pub groups: Vec<Group>,
}

impl ViewModel {
    pub fn new(groups: Vec<Group>) -> Self {
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }

    /// Find an item anywhere in the view.
    pub fn find(&self, id: &ItemId) -> Option<&AnnotatedItem> {
        self.groups.iter().flat_map(|g| g.items.iter()).find(|entry| entry.id() == id)
    }

    /// Build a copy with the given item's annotation rewritten.
    ///
    /// Returns `None` when the item is not part of this view. Only the group
    /// and item records containing the target are rebuilt; everything else is
    /// cloned unchanged.
    pub fn with_annotation(&self, id: &ItemId, patch: impl Fn(Annotation) -> Annotation) -> Option<ViewModel> {
        self.find(id)?;

        let groups = self
            .groups
            .iter()
            .map(|group| {
                if !group.items.iter().any(|entry| entry.id() == id) {
                    return group.clone();
                }
                let items = group
                    .items
                    .iter()
                    .map(|entry| {
                        if entry.id() == id {
                            AnnotatedItem::new(entry.item.clone(), patch(entry.annotation))
                        } else {
                            entry.clone()
                        }
                    })
                    .collect();
                Group { key: group.key.clone(), location: group.location.clone(), items }
            })
            .collect();

        Some(ViewModel { groups })
    }
}

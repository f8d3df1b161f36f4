use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ProductId);
id_newtype!(LabelId);

/// Shown whenever a product carries no usable image.
pub const PLACEHOLDER_IMAGE_URL: &str = "/static/placeholder-cocktail.png";

pub const MAX_RATING: f64 = 10.0;

/// Server-defined drink category such as `shot` or `long_drink`.
///
/// The vocabulary belongs to the remote API, so the tag is kept verbatim and
/// compared by exact equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrinkType(pub String);

impl DrinkType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DrinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    Rating,
    #[default]
    AlcoholContent,
}

impl SortKey {
    /// Value of the remote `order_by` query parameter.
    pub fn as_query_value(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Rating => "rating",
            SortKey::AlcoholContent => "alcohol_content",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown sort key '{0}', expected one of: name, rating, alcohol_content")]
pub struct UnknownSortKey(pub String);

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "rating" => Ok(SortKey::Rating),
            "alcohol_content" | "alcohol" | "abv" => Ok(SortKey::AlcoholContent),
            other => Err(UnknownSortKey(other.to_string())),
        }
    }
}

/// A label as the vocabulary endpoint or a product payload carries it.
///
/// Filtering matches on `name`; list payloads may omit the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LabelId>,
    pub name: String,
}

impl Label {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub url: String,
    pub is_thumbnail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub alcohol_content: f64,
    pub rating: Option<f64>,
    pub drink_type: Option<DrinkType>,
    pub in_stock: bool,
    pub images: Vec<ProductImage>,
    pub labels: Vec<Label>,
    pub recipe: Option<String>,
}

impl Product {
    pub fn display_image(&self) -> &str {
        select_display_image(&self.images)
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.name == name)
    }

    /// Unrated products rank as zero.
    pub fn rating_or_zero(&self) -> f64 {
        self.rating.unwrap_or(0.0)
    }

    /// The API stores recipes with a literal `\n` escape between steps.
    pub fn recipe_lines(&self) -> Vec<&str> {
        match &self.recipe {
            Some(recipe) => recipe
                .split("\\n")
                .flat_map(|chunk| chunk.split('\n'))
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// First thumbnail, else the first image, else the placeholder.
pub fn select_display_image(images: &[ProductImage]) -> &str {
    images
        .iter()
        .find(|image| image.is_thumbnail)
        .or_else(|| images.first())
        .map(|image| image.url.as_str())
        .filter(|url| !url.trim().is_empty())
        .unwrap_or(PLACEHOLDER_IMAGE_URL)
}

#[derive(Debug, Error, PartialEq)]
pub enum ProductValidationError {
    #[error("product {id} has an empty name")]
    EmptyName { id: ProductId },
    #[error("product {id} has negative alcohol content {value}")]
    NegativeAlcoholContent { id: ProductId, value: f64 },
    #[error("product {id} has rating {value} outside 0..={max}", max = MAX_RATING)]
    RatingOutOfRange { id: ProductId, value: f64 },
}

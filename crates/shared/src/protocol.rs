//! Payload shapes exactly as the catalog API sends them, and their one-time
//! conversion into domain types.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::{
    DrinkType, Label, LabelId, Product, ProductId, ProductImage, ProductValidationError,
    MAX_RATING,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LabelId>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_url: String,
    #[serde(default)]
    pub is_thumbnail: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub alcohol_content: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drink_type: Option<DrinkType>,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(default)]
    pub labels: Vec<LabelRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
}

/// Body of `GET /cocktails` and `GET /cocktails/search`. Only the paged
/// list carries `pages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductListResponse {
    pub items: Vec<ProductRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
}

impl From<LabelRecord> for Label {
    fn from(value: LabelRecord) -> Self {
        Self {
            id: value.id,
            name: value.name,
        }
    }
}

impl From<ImageRecord> for ProductImage {
    fn from(value: ImageRecord) -> Self {
        Self {
            url: value.image_url,
            is_thumbnail: value.is_thumbnail,
        }
    }
}

impl TryFrom<ProductRecord> for Product {
    type Error = ProductValidationError;

    fn try_from(value: ProductRecord) -> Result<Self, Self::Error> {
        let id = value.id;
        let name = value.name.trim().to_string();
        if name.is_empty() {
            return Err(ProductValidationError::EmptyName { id });
        }
        if value.alcohol_content < 0.0 {
            return Err(ProductValidationError::NegativeAlcoholContent {
                id,
                value: value.alcohol_content,
            });
        }
        if let Some(rating) = value.rating {
            if !(0.0..=MAX_RATING).contains(&rating) {
                return Err(ProductValidationError::RatingOutOfRange { id, value: rating });
            }
        }

        let mut seen = HashSet::new();
        let labels = value
            .labels
            .into_iter()
            .filter(|label| seen.insert(label.name.clone()))
            .map(Label::from)
            .collect();

        Ok(Self {
            id,
            name,
            description: value.description,
            alcohol_content: value.alcohol_content,
            rating: value.rating,
            drink_type: value.drink_type.filter(|tag| !tag.as_str().is_empty()),
            in_stock: value.in_stock,
            images: value.images.into_iter().map(ProductImage::from).collect(),
            labels,
            recipe: value.recipe,
        })
    }
}

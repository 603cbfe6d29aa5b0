//! Product field extraction from HTML (JSON-LD, microdata, dataLayer) and
//! the CSV row model every site writes.

pub mod datalayer;
pub mod jsonld;
pub mod microdata;

use serde::Serialize;
use std::collections::BTreeMap;

/// One output row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductRecord {
    pub product_url: String,
    pub product_id: String,
    pub variant_id: String,
    pub category: String,
    pub category_url: String,
    pub brand: String,
    pub name: String,
    pub sku: String,
    pub mpn: String,
    pub gtin: String,
    pub price: String,
    pub main_image: String,
    pub quantity: String,
    pub group_attr_1: String,
    pub group_attr_2: String,
    pub status: String,
    pub description: String,
    pub dimensions: String,
    pub scraped_date: String,
    /// Site-specific columns outside the common set.
    pub extra: BTreeMap<&'static str, String>,
}

/// Addressable field of a [`ProductRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ProductUrl,
    ProductId,
    VariantId,
    Category,
    CategoryUrl,
    Brand,
    Name,
    Sku,
    Mpn,
    Gtin,
    Price,
    MainImage,
    Quantity,
    GroupAttr1,
    GroupAttr2,
    Status,
    Description,
    Dimensions,
    ScrapedDate,
    Extra(&'static str),
}

impl ProductRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::ProductUrl => &self.product_url,
            Field::ProductId => &self.product_id,
            Field::VariantId => &self.variant_id,
            Field::Category => &self.category,
            Field::CategoryUrl => &self.category_url,
            Field::Brand => &self.brand,
            Field::Name => &self.name,
            Field::Sku => &self.sku,
            Field::Mpn => &self.mpn,
            Field::Gtin => &self.gtin,
            Field::Price => &self.price,
            Field::MainImage => &self.main_image,
            Field::Quantity => &self.quantity,
            Field::GroupAttr1 => &self.group_attr_1,
            Field::GroupAttr2 => &self.group_attr_2,
            Field::Status => &self.status,
            Field::Description => &self.description,
            Field::Dimensions => &self.dimensions,
            Field::ScrapedDate => &self.scraped_date,
            Field::Extra(key) => self.extra.get(key).map(String::as_str).unwrap_or(""),
        }
    }

    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::ProductUrl => &mut self.product_url,
            Field::ProductId => &mut self.product_id,
            Field::VariantId => &mut self.variant_id,
            Field::Category => &mut self.category,
            Field::CategoryUrl => &mut self.category_url,
            Field::Brand => &mut self.brand,
            Field::Name => &mut self.name,
            Field::Sku => &mut self.sku,
            Field::Mpn => &mut self.mpn,
            Field::Gtin => &mut self.gtin,
            Field::Price => &mut self.price,
            Field::MainImage => &mut self.main_image,
            Field::Quantity => &mut self.quantity,
            Field::GroupAttr1 => &mut self.group_attr_1,
            Field::GroupAttr2 => &mut self.group_attr_2,
            Field::Status => &mut self.status,
            Field::Description => &mut self.description,
            Field::Dimensions => &mut self.dimensions,
            Field::ScrapedDate => &mut self.scraped_date,
            Field::Extra(key) => self.extra.entry(key).or_default(),
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        *self.slot(field) = value.into();
    }

    /// Set only when the field is still empty.
    pub fn fill(&mut self, field: Field, value: impl Into<String>) {
        let slot = self.slot(field);
        if slot.is_empty() {
            *slot = value.into();
        }
    }

    /// Copy every non-empty field of `other` into the empty fields of `self`.
    pub fn merge_missing(&mut self, other: &ProductRecord) {
        for field in ALL_FIELDS {
            let value = other.get(*field);
            if !value.is_empty() {
                self.fill(*field, value.to_string());
            }
        }
        for (key, value) in &other.extra {
            if !value.is_empty() {
                self.fill(Field::Extra(*key), value.clone());
            }
        }
    }

    /// Render the record as one CSV row for `columns`.
    pub fn row(&self, columns: Columns) -> Vec<&str> {
        columns.iter().map(|(_, f)| self.get(*f)).collect()
    }
}

const ALL_FIELDS: &[Field] = &[
    Field::ProductUrl,
    Field::ProductId,
    Field::VariantId,
    Field::Category,
    Field::CategoryUrl,
    Field::Brand,
    Field::Name,
    Field::Sku,
    Field::Mpn,
    Field::Gtin,
    Field::Price,
    Field::MainImage,
    Field::Quantity,
    Field::GroupAttr1,
    Field::GroupAttr2,
    Field::Status,
    Field::Description,
    Field::Dimensions,
    Field::ScrapedDate,
];

/// An ordered CSV layout: header text and the field that fills it.
pub type Columns = &'static [(&'static str, Field)];

pub fn headers(columns: Columns) -> Vec<&'static str> {
    columns.iter().map(|(h, _)| *h).collect()
}

/// The shared 17-column "Ref" layout.
pub const STANDARD_COLUMNS: Columns = &[
    ("Ref Product URL", Field::ProductUrl),
    ("Ref Product ID", Field::ProductId),
    ("Ref Variant ID", Field::VariantId),
    ("Ref Category", Field::Category),
    ("Ref Category URL", Field::CategoryUrl),
    ("Ref Brand Name", Field::Brand),
    ("Ref Product Name", Field::Name),
    ("Ref SKU", Field::Sku),
    ("Ref MPN", Field::Mpn),
    ("Ref GTIN", Field::Gtin),
    ("Ref Price", Field::Price),
    ("Ref Main Image", Field::MainImage),
    ("Ref Quantity", Field::Quantity),
    ("Ref Group Attr 1", Field::GroupAttr1),
    ("Ref Group Attr 2", Field::GroupAttr2),
    ("Ref Status", Field::Status),
    ("Date Scrapped", Field::ScrapedDate),
];

/// "Ref" layout without the variant column.
pub const SINGLE_VARIANT_COLUMNS: Columns = &[
    ("Ref Product URL", Field::ProductUrl),
    ("Ref Product ID", Field::ProductId),
    ("Ref Category", Field::Category),
    ("Ref Category URL", Field::CategoryUrl),
    ("Ref Brand Name", Field::Brand),
    ("Ref Product Name", Field::Name),
    ("Ref SKU", Field::Sku),
    ("Ref MPN", Field::Mpn),
    ("Ref GTIN", Field::Gtin),
    ("Ref Price", Field::Price),
    ("Ref Main Image", Field::MainImage),
    ("Ref Quantity", Field::Quantity),
    ("Ref Group Attr 1", Field::GroupAttr1),
    ("Ref Group Attr 2", Field::GroupAttr2),
    ("Ref Status", Field::Status),
    ("Date Scrapped", Field::ScrapedDate),
];

/// Catalogue layout with description and dimensions.
pub const CATALOG_COLUMNS: Columns = &[
    ("Product URL", Field::ProductUrl),
    ("Product ID", Field::ProductId),
    ("Category", Field::Category),
    ("Category URL", Field::CategoryUrl),
    ("Brand", Field::Brand),
    ("Product Name", Field::Name),
    ("SKU", Field::Sku),
    ("MPN", Field::Mpn),
    ("GTIN", Field::Gtin),
    ("Price", Field::Price),
    ("Main Image", Field::MainImage),
    ("Quantity", Field::Quantity),
    ("group_attr_1", Field::GroupAttr1),
    ("group_attr_2", Field::GroupAttr2),
    ("Status", Field::Status),
    ("Description", Field::Description),
    ("Dimensions", Field::Dimensions),
    ("Date Scraped", Field::ScrapedDate),
];

/// UTC timestamp in the format written to every row.
pub fn scrape_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Render a JSON scalar as CSV text (`null` becomes empty).
pub fn json_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn squash_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_follows_layout() {
        let mut r = ProductRecord {
            product_url: "https://a/p/1".to_string(),
            name: "Chair".to_string(),
            ..Default::default()
        };
        r.set(Field::Price, "19.99");
        let row = r.row(STANDARD_COLUMNS);
        assert_eq!(row.len(), 17);
        assert_eq!(row[0], "https://a/p/1");
        assert_eq!(row[6], "Chair");
        assert_eq!(row[10], "19.99");
        assert_eq!(headers(STANDARD_COLUMNS)[16], "Date Scrapped");
        assert_eq!(headers(SINGLE_VARIANT_COLUMNS).len(), 16);
        assert_eq!(headers(CATALOG_COLUMNS).len(), 18);
    }

    #[test]
    fn test_merge_missing_keeps_primary() {
        let mut primary = ProductRecord {
            name: "Desk".to_string(),
            ..Default::default()
        };
        let mut secondary = ProductRecord {
            name: "Other".to_string(),
            brand: "Acme".to_string(),
            ..Default::default()
        };
        secondary.set(Field::Extra("color"), "Oak");
        primary.merge_missing(&secondary);
        assert_eq!(primary.name, "Desk");
        assert_eq!(primary.brand, "Acme");
        assert_eq!(primary.get(Field::Extra("color")), "Oak");
    }

    #[test]
    fn test_json_text() {
        assert_eq!(json_text(Some(&serde_json::json!(12.5))), "12.5");
        assert_eq!(json_text(Some(&serde_json::json!(" x "))), "x");
        assert_eq!(json_text(Some(&serde_json::Value::Null)), "");
        assert_eq!(json_text(None), "");
    }

    #[test]
    fn test_timestamp_format() {
        let ts = scrape_timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[13..14], ":");
    }
}

//! Product catalog loaded once at startup and shared read-only.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to parse catalog csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("duplicate product id `{0}` in catalog")]
    DuplicateId(String),

    #[error("catalog entry #{0} has an empty product id")]
    EmptyId(usize),
}

fn default_in_stock() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StockFlag {
    Bool(bool),
    Number(i64),
    Text(String),
    Empty,
}

/// Accepts JSON booleans as well as spreadsheet-style `true`/`1`/`yes`.
fn stock_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match StockFlag::deserialize(deserializer)? {
        StockFlag::Bool(flag) => flag,
        StockFlag::Number(n) => n != 0,
        StockFlag::Text(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        ),
        StockFlag::Empty => false,
    })
}

/// A catalog row. Tabular sources may use `product_name` for the id,
/// `section` for the shelf and `stock` for the in-stock flag; a missing
/// display name falls back to the id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Product {
    #[serde(alias = "product_name")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub aisle: String,
    #[serde(alias = "section")]
    pub shelf: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(
        default = "default_in_stock",
        alias = "stock",
        deserialize_with = "stock_flag"
    )]
    pub in_stock: bool,
}

impl Product {
    /// Human-readable shelf location, e.g. `Aisle 3, Shelf 2`.
    pub fn location(&self) -> String {
        format!("Aisle {}, Shelf {}", self.aisle, self.shelf)
    }
}

/// Identifiers are compared trimmed and ASCII-lowercased.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

#[derive(Debug, Default)]
pub struct Catalog {
    products: HashMap<String, Product>,
}

impl Catalog {
    pub fn from_products(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut map = HashMap::with_capacity(products.len());
        for (index, mut product) in products.into_iter().enumerate() {
            let key = normalize_id(&product.id);
            if key.is_empty() {
                return Err(CatalogError::EmptyId(index));
            }
            if product.name.trim().is_empty() {
                product.name = product.id.trim().to_string();
            }
            if map.contains_key(&key) {
                return Err(CatalogError::DuplicateId(key));
            }
            map.insert(key, product);
        }
        Ok(Self { products: map })
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let products: Vec<Product> = serde_json::from_str(raw)?;
        Self::from_products(products)
    }

    /// Reads a headered CSV table, one product per row.
    pub fn from_csv<R: io::Read>(reader: R) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let products = reader
            .deserialize()
            .collect::<Result<Vec<Product>, csv::Error>>()?;
        Self::from_products(products)
    }

    /// Loads `.csv` files as tables and anything else as a JSON array.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
        let catalog = if is_csv {
            Self::from_csv(raw.as_bytes())?
        } else {
            Self::from_json(&raw)?
        };
        log::info!(
            "Loaded {} products from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn lookup(&self, id: &str) -> Option<&Product> {
        self.products.get(&normalize_id(id))
    }

    /// Every product, ordered by aisle then id.
    pub fn all(&self) -> Vec<&Product> {
        let mut products: Vec<&Product> = self.products.values().collect();
        products.sort_by(|a, b| {
            a.aisle
                .cmp(&b.aisle)
                .then_with(|| normalize_id(&a.id).cmp(&normalize_id(&b.id)))
        });
        products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

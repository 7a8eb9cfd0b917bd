//! Seed the catalog from a YAML file.
//!
//! Catalog management lives outside this service; this command only exists
//! so a local database has something to sell.
//!
//! ```yaml
//! products:
//!   - id: 0b9c1f2e-6a43-4d1e-9c55-3f0e2b7d8a10
//!     name: Alphonso Mango
//!     category: Fruit
//!     price: 120
//!     offerPrice: 99
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use rygstore_storefront::db::{self, ProductRepository};
use rygstore_storefront::models::NewProduct;

use super::database_url;

/// Top-level YAML document.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<NewProduct>,
}

/// Problems that make a catalog file unusable.
fn validate(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for product in &catalog.products {
        if product.name.trim().is_empty() {
            errors.push(format!("{}: name is empty", product.id));
        }
        if product.offer_price > product.price {
            errors.push(format!(
                "{}: offer price {} exceeds price {}",
                product.id, product.offer_price, product.price
            ));
        }
        if !seen.insert(product.id) {
            errors.push(format!("{}: duplicate id", product.id));
        }
    }

    errors
}

/// Upsert every product in `file_path`.
///
/// The file is parsed and validated before connecting to the database.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation, or if a
/// database operation fails.
pub async fn products(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;
    info!(products = catalog.products.len(), "Parsed catalog");

    let errors = validate(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = db::create_pool(&database_url()?).await?;
    info!("Connected to database");

    let repo = ProductRepository::new(pool);
    for product in &catalog.products {
        repo.upsert(product).await?;
        info!(product_id = %product.id, name = %product.name, "Upserted product");
    }

    info!("Seeding complete! {} products", catalog.products.len());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATALOG: &str = r"
products:
  - id: 0b9c1f2e-6a43-4d1e-9c55-3f0e2b7d8a10
    name: Alphonso Mango
    category: Fruit
    price: 120
    offerPrice: 99
  - id: 5d2e8c71-3b4a-4f6e-8a90-1c2d3e4f5a6b
    name: Banana
    price: 40
    offerPrice: 40
";

    #[test]
    fn test_parse_catalog() {
        let catalog: CatalogFile = serde_yaml::from_str(CATALOG).unwrap();
        assert_eq!(catalog.products.len(), 2);
        assert_eq!(catalog.products[0].offer_price.amount(), 99);
        assert_eq!(catalog.products[1].category, "");
        assert!(validate(&catalog).is_empty());
    }

    #[test]
    fn test_negative_price_fails_to_parse() {
        let negative = CATALOG.replace("price: 40", "price: -40");
        let err = serde_yaml::from_str::<CatalogFile>(&negative).unwrap_err();
        assert!(err.to_string().contains("must not be negative"));
    }

    #[test]
    fn test_offer_above_price_is_rejected() {
        let mut catalog: CatalogFile = serde_yaml::from_str(CATALOG).unwrap();
        catalog.products[1].offer_price = catalog.products[0].price;
        assert_eq!(validate(&catalog).len(), 1);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut catalog: CatalogFile = serde_yaml::from_str(CATALOG).unwrap();
        catalog.products[1].id = catalog.products[0].id;
        assert!(validate(&catalog).iter().any(|e| e.contains("duplicate")));
    }
}

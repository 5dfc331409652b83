//! Product catalogue and stock.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Product, ProductError};
use crate::domain::aggregates::product::{NewProduct, ProductPatch};
use crate::repository::{Page, ProductFilter, ProductRepository, ProductSort};
use crate::{CommerceError, Result};

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: Option<ProductSort>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StockUpdate {
    #[validate(range(min = 0))]
    pub stock: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StockDecrement {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

fn not_found() -> CommerceError { CommerceError::NotFound("Product not found".to_string()) }

#[derive(Clone)]
pub struct CatalogService {
    products: Arc<dyn ProductRepository>,
}

impl CatalogService {
    pub fn new(products: Arc<dyn ProductRepository>) -> Self { Self { products } }

    /// Active products only unless `include_inactive` is set.
    pub async fn list(&self, params: ListParams, include_inactive: bool) -> Result<PaginatedResponse<Product>> {
        let page = Page::new(params.page, params.per_page);
        if let (Some(min), Some(max)) = (params.min_price, params.max_price) {
            if min > max {
                return Err(CommerceError::BadRequest("min_price cannot exceed max_price".to_string()));
            }
        }
        let filter = ProductFilter {
            search: params.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            include_inactive,
            min_price: params.min_price,
            max_price: params.max_price,
            sort: params.sort.unwrap_or_default(),
        };
        let (data, total) = self.products.list(&filter, page).await?;
        Ok(PaginatedResponse { data, total, page: page.page, per_page: page.per_page })
    }

    pub async fn get(&self, id: Uuid) -> Result<Product> {
        self.products.find(id).await?.ok_or_else(not_found)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Product> {
        self.products.find_by_slug(slug.trim()).await?.ok_or_else(not_found)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewProduct) -> Result<Product> {
        input.validate()?;
        let product = self.products.insert(&Product::create(input)?).await?;
        info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    pub async fn update(&self, id: Uuid, patch: ProductPatch) -> Result<Product> {
        patch.validate()?;
        let mut product = self.get(id).await?;
        product.apply_patch(patch)?;
        self.products.update(&product).await?.ok_or_else(not_found)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.products.delete(id).await? {
            return Err(not_found());
        }
        Ok(())
    }

    pub async fn set_stock(&self, id: Uuid, input: StockUpdate) -> Result<Product> {
        input.validate()?;
        let mut product = self.get(id).await?;
        product.set_stock(input.stock)?;
        self.products.set_stock(id, product.stock).await?.ok_or_else(not_found)
    }

    /// Refused without writing anything when the product has fewer than `quantity` units.
    /// The aggregate check reports shortage up front; the conditional write settles races.
    #[instrument(skip(self, input), fields(quantity = input.quantity))]
    pub async fn decrement_stock(&self, id: Uuid, input: StockDecrement) -> Result<Product> {
        input.validate()?;
        self.get(id).await?.remove_stock(input.quantity)?;
        if let Some(product) = self.products.decrement_stock(id, input.quantity).await? {
            return Ok(product);
        }
        let product = self.get(id).await?;
        Err(ProductError::InsufficientStock { name: product.name, available: product.stock }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repositories;

    fn new_product(name: &str, stock: i32) -> NewProduct {
        NewProduct {
            name: name.into(), sku: None, description: None, price: Decimal::new(500, 2),
            compare_at_price: None, stock: Some(stock), tags: None, status: None,
        }
    }

    #[tokio::test]
    async fn test_decrement_never_oversells() {
        let catalog = CatalogService::new(Repositories::in_memory().products);
        let product = catalog.create(new_product("Tea", 3)).await.unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let catalog = catalog.clone();
                tokio::spawn(async move { catalog.decrement_stock(product.id, StockDecrement { quantity: 1 }).await })
            })
            .collect();
        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() { succeeded += 1; }
        }
        assert_eq!(succeeded, 3);
        assert_eq!(catalog.get(product.id).await.unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_reports_availability() {
        let catalog = CatalogService::new(Repositories::in_memory().products);
        let product = catalog.create(new_product("Coffee", 2)).await.unwrap();
        let err = catalog.decrement_stock(product.id, StockDecrement { quantity: 5 }).await.unwrap_err();
        assert!(matches!(err, CommerceError::BadRequest(ref m) if m.contains("2 available")));
    }

    #[tokio::test]
    async fn test_set_stock_goes_through_the_product() {
        let catalog = CatalogService::new(Repositories::in_memory().products);
        let product = catalog.create(new_product("Cup", 0)).await.unwrap();
        let updated = catalog.set_stock(product.id, StockUpdate { stock: 12 }).await.unwrap();
        assert_eq!(updated.stock, 12);
        assert!(updated.updated_at >= product.updated_at);

        let err = catalog.set_stock(Uuid::now_v7(), StockUpdate { stock: 1 }).await.unwrap_err();
        assert!(matches!(err, CommerceError::NotFound(_)));
        assert!(matches!(
            catalog.set_stock(product.id, StockUpdate { stock: -1 }).await,
            Err(CommerceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_hides_drafts_and_searches() {
        let catalog = CatalogService::new(Repositories::in_memory().products);
        catalog.create(new_product("Green Tea", 1)).await.unwrap();
        catalog.create(new_product("Black Coffee", 1)).await.unwrap();
        let mut draft = new_product("Draft Tea", 1);
        draft.status = Some(crate::domain::aggregates::ProductStatus::Draft);
        catalog.create(draft).await.unwrap();

        let all = catalog.list(ListParams::default(), false).await.unwrap();
        assert_eq!(all.total, 2);
        let teas = catalog.list(ListParams { search: Some("tea".into()), ..ListParams::default() }, true).await.unwrap();
        assert_eq!(teas.total, 2);
    }

    #[tokio::test]
    async fn test_price_range_and_sort() {
        let catalog = CatalogService::new(Repositories::in_memory().products);
        for (name, cents) in [("Spoon", 300), ("Bowl", 1200), ("Pot", 4500)] {
            let mut input = new_product(name, 1);
            input.price = Decimal::new(cents, 2);
            catalog.create(input).await.unwrap();
        }

        let params = ListParams {
            min_price: Some(Decimal::new(3, 0)),
            max_price: Some(Decimal::new(12, 0)),
            sort: Some(ProductSort::PriceDesc),
            ..ListParams::default()
        };
        let listed = catalog.list(params, false).await.unwrap();
        let names: Vec<_> = listed.data.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Bowl", "Spoon"]);
        assert_eq!(listed.total, 2);

        let inverted = ListParams {
            min_price: Some(Decimal::new(10, 0)),
            max_price: Some(Decimal::ONE),
            ..ListParams::default()
        };
        assert!(matches!(catalog.list(inverted, false).await, Err(CommerceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_lookup_by_slug() {
        let catalog = CatalogService::new(Repositories::in_memory().products);
        let product = catalog.create(new_product("French Press", 2)).await.unwrap();
        assert_eq!(catalog.get_by_slug("french-press").await.unwrap().id, product.id);
        assert!(matches!(catalog.get_by_slug("kettle").await, Err(CommerceError::NotFound(_))));
    }
}

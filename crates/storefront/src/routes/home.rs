//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;
use tracing::instrument;

use mercato_core::Price;

use crate::error::AppError;
use crate::models::Product;
use crate::state::AppState;

/// Vite entry points loaded on every page.
const ENTRY_POINTS: &[&str] = &["src/main.js", "src/styles/main.css"];

/// Product display data for templates.
#[derive(Debug, Clone)]
pub struct ProductCard {
    pub id: i32,
    pub name: String,
    pub price: String,
    pub image_url: Option<String>,
    pub in_stock: bool,
}

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub products: Vec<ProductCard>,
    /// Pre-rendered `<link>`/`<script>` tags for the Vite bundles.
    pub asset_tags: String,
}

/// Display the catalog.
#[instrument(skip(state))]
pub async fn home(State(state): State<AppState>) -> Result<HomeTemplate, AppError> {
    let products = state.catalog().list_products().await?;
    let currency = state.config().stripe.currency;

    let cards = products
        .iter()
        .map(|product: &Product| ProductCard {
            id: product.id.as_i32(),
            name: product.name.clone(),
            price: Price::new(product.price, currency).display(),
            image_url: product.image_key.as_deref().map(|key| state.media().url(key)),
            in_stock: product.in_stock(),
        })
        .collect();

    Ok(HomeTemplate {
        products: cards,
        asset_tags: state.assets().render_tags(ENTRY_POINTS),
    })
}

pub mod boms;
pub mod common;
pub mod products;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::boms::BomService;
use crate::services::numbering::BomNumberGenerator;
use crate::services::products::ProductService;
use crate::services::structure::StructureResolver;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductService>,
    pub boms: Arc<BomService>,
    pub resolver: Arc<StructureResolver>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let number_generator = BomNumberGenerator::new(config.bom_number_prefix.clone());

        let products = Arc::new(ProductService::new(db_pool.clone(), event_sender.clone()));
        let boms = Arc::new(BomService::new(
            db_pool.clone(),
            event_sender,
            number_generator,
            config.rollup_policy(),
            config.max_bom_depth,
        ));
        let resolver = Arc::new(StructureResolver::new(
            db_pool,
            config.max_bom_depth,
            Duration::from_secs(config.resolve_timeout_secs),
        ));

        Self {
            products,
            boms,
            resolver,
        }
    }
}

// Write path
pub mod boms;
pub mod numbering;
pub mod products;

// Read path: structure resolution and cost rollup
pub mod costing;
pub mod structure;

pub use boms::BomService;
pub use products::ProductService;
pub use structure::StructureResolver;

pub mod bom_repository;

pub use bom_repository::BomRepository;

pub mod bom_component;
pub mod bom_header;
pub mod product;

pub mod document;
pub mod generator;

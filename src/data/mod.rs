pub mod datetime;
pub mod loader;
pub mod schema;
pub mod table;

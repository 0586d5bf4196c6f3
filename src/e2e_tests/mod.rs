//! End-to-end tests over a local share


// Test scenario modules
pub mod delete_operations;
pub mod directory_operations;
pub mod file_operations;
pub mod rename_operations;
pub mod scenarios;

pub use test_context::TestContext;

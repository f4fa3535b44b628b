// ============================================================================
// Storage Module - Entity persistence contract
// ============================================================================
//
// - repository/ - EntityRepository trait and the in-memory backend
// - errors/     - StorageError
//
// ============================================================================

mod errors;
mod repository;

pub use errors::StorageError;
pub use repository::{EntityRepository, InMemoryEntityRepository};

//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection handles and the startup registry
//! - Command execution under cancellation and deadlines
//! - Interrupting statements already running on the server
//! - Single-invocation transactions
//! - Table introspection
//! - Result shaping

#[macro_use]
pub mod macros;
pub mod executor;
pub(crate) mod interrupt;
pub(crate) mod params;
pub mod pool;
pub mod registry;
pub mod schema;
pub mod transaction;
pub mod types;

pub use executor::{CommandExecutor, CommandScope};
pub use pool::DbPool;
pub use registry::{ConnectionRegistry, RegistryBuild, RegistryMode};
pub use transaction::DbTransaction;
pub use types::{ShapeRow, TypeCategory, categorize_type, shape_rows};

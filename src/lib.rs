//! # Strata
//!
//! A dynamic view engine over hierarchical, polymorphic and bitemporal
//! relational entities.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────┐   ┌───────────────────────┐
//! │ Schema registry       │   │ Filter tree           │
//! │ (entities, attributes)│   │ (projections, preds)  │
//! └───────────────────────┘   └───────────────────────┘
//!             │                           │
//!             └─────────────┬─────────────┘
//!                           ▼ [view::compiler]
//! ┌─────────────────────────────────────────────────────────┐
//! │ primary SELECT + correlated collection sub-selects      │
//! └─────────────────────────────────────────────────────────┘
//!                           │ [executor]
//!                           ▼ [view::merger]
//! ┌─────────────────────────────────────────────────────────┐
//! │ View: nested rows, path addressed, mutations recorded   │
//! └─────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼ [view::planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │ UPDATE / close + INSERT / DELETE statements             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod filter;
pub mod schema;
pub mod sql;
pub mod value;
pub mod view;

pub use error::{ViewError, ViewResult};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{Settings, ViewSettings};
    pub use crate::context::QueryContext;
    pub use crate::error::{ViewError, ViewResult};
    pub use crate::executor::{SqlExecutor, SqliteExecutor, ViewSession};
    pub use crate::filter::{Aggregate, FilterNode, FilterTree, Operator, Predicate, ViewDefinition};
    pub use crate::schema::{AttributeDescriptor, EntitySchema, SchemaRegistry};
    pub use crate::sql::{Dialect, SqlBuilder};
    pub use crate::value::{JdbcType, Row, Value};
    pub use crate::view::{Page, View, ViewCompiler};
}

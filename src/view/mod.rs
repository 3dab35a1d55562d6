//! Dynamic views: compilation, result merging, path addressing and write-back.
//!
//! - [`compiler`] - filter tree → primary SELECT + collection sub-selects
//! - [`merger`] - raw result sets → nested rows keyed by the root key
//! - [`row`] - path-addressable [`View`] with recorded mutations
//! - [`planner`] - recorded mutations → UPDATE / INSERT / DELETE statements

pub mod compiler;
pub mod merger;
pub mod planner;
pub mod row;

pub use compiler::{
    ColumnBinding, ColumnKind, CompiledView, EnclosingCollection, JoinPlan, JoinPlanEntry,
    SubSelect, ViewCompiler,
};
pub use merger::ResultMerger;
pub use planner::{BoundParam, PlannedStatement, UpdatePlanner, WritePlan};
pub use row::{View, NEW_ROW_MARKER};

/// Optional trailing pagination of the primary query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Page {
    pub fn new(offset: Option<u64>, limit: Option<u64>) -> Self {
        Self { offset, limit }
    }

    pub fn limit(limit: u64) -> Self {
        Self {
            offset: None,
            limit: Some(limit),
        }
    }
}

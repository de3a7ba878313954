pub mod plan;


pub use plan::{
    AccessMode, BoundExpr, PlanNode, PlanRowMark, PlannedStmt, RangeTblEntry, RowMarkKind,
    RowWaitPolicy, RteKind, TargetEntry,
};

pub mod estate;
pub mod executor;
pub mod junk;
pub mod node;
pub mod perms;
pub mod region;
pub mod result_rel;
pub mod row_marks;
pub mod trigger;

mod init_plan;


pub use estate::{
    DestReceiver, DiscardDest, EState, ExecFlags, InstrumentOptions, ParamExecData, QueryDesc,
    QueryEnv,
};
pub use executor::{standard_start_query, Executor, StandardStart, StartStrategy};
pub use junk::JunkFilter;
pub use node::PlanState;
pub use result_rel::ResultRelInfo;
pub use row_marks::{ExecRowMark, RowMarkExtra};

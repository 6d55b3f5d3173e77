//! 工具层：固定目录 + 已确认动作的执行器

pub mod catalog;
pub mod executor;

pub use catalog::{
    catalog, DocArgs, EmailArgs, EventArgs, PendingAction, ToolCall, ToolDeclaration, ToolName, DATE_FORMAT,
    TIME_FORMAT,
};
pub use executor::ActionExecutor;

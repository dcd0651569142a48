//! Infrastructure-as-code executor wrapper.
//!
//! `Cmd` is the low-level invocation primitive; `CmdExecutor` layers the
//! apply workflow (template materialization, state capture on success or
//! failure) on top of it, and `CmdOutputter` extracts named outputs from
//! an emitted state.

pub mod cmd;
pub mod executor;
pub mod templates;

pub use cmd::{sink, Cmd, OutputSink};
pub use executor::{ApplyError, ApplyRequest, CmdExecutor, CmdOutputter, Executor, Outputter};
pub use templates::{select, TemplateSelection};

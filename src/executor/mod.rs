pub mod context;
pub mod errors;
pub mod eval;
pub mod executor;
pub mod invoker;
pub mod value;

pub use context::{Conector, Context, LogEntry, RequestEnv, LAST_ERROR_VAR};
pub use errors::ExecError;
pub use executor::{Flow, ScriptRun};

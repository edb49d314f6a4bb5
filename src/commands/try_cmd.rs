//! try: open an error-catching scope.

use async_trait::async_trait;

use crate::commands::types::{Bridge, Command, Task};
use crate::executor::errors::ExecError;

pub struct TryCommand;

#[async_trait]
impl Command for TryCommand {
    fn name(&self) -> &'static str {
        "try"
    }

    async fn run(&self, _task: &Task<'_>, bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        bridge.conector().try_level += 1;
        Ok(())
    }
}

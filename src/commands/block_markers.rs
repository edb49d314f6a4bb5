//! Block markers served by the catalog.
//!
//! `end()`, `else()` and `endLoop()` are consumed by the parser as block
//! delimiters and never reach the executor; the catalog still serves them,
//! so resolvable no-op handlers keep the caches consistent.

use async_trait::async_trait;

use crate::commands::types::{Bridge, Command, Task};
use crate::executor::errors::ExecError;

pub struct End;

#[async_trait]
impl Command for End {
    fn name(&self) -> &'static str {
        "end"
    }

    async fn run(&self, _task: &Task<'_>, _bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        Ok(())
    }
}

pub struct Else;

#[async_trait]
impl Command for Else {
    fn name(&self) -> &'static str {
        "else"
    }

    async fn run(&self, _task: &Task<'_>, _bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        Ok(())
    }
}

pub struct EndLoop;

#[async_trait]
impl Command for EndLoop {
    fn name(&self) -> &'static str {
        "endLoop"
    }

    async fn run(&self, _task: &Task<'_>, _bridge: &mut Bridge<'_, '_>) -> Result<(), ExecError> {
        Ok(())
    }
}

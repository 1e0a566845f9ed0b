use crate::env::Environment;
use crate::history::History;
use anyhow::Result;
use std::io::{Read, Write};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Interpreter state a builtin may read or change while it runs.
pub struct BuiltinContext<'a> {
    pub env: &'a mut Environment,
    pub history: &'a mut History,
}

/// Object-safe trait for a command that runs inside the interpreter process.
pub trait ExecutableCommand {
    /// Executes the command with the stage's resolved input and output.
    ///
    /// The handles are borrowed: whatever they wrap is closed by the caller,
    /// never by the command.
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        ctx: &mut BuiltinContext<'_>,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory {
    /// Name this factory answers to.
    fn name(&self) -> &'static str;

    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}

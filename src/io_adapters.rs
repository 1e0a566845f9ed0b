use std::fs::File;
use std::io::{self, PipeReader, PipeWriter, Read, Result as IoResult, Write};
use std::process::Stdio;

/// Where a pipeline stage reads from.
///
/// Builtins read through the `Read` impl; external commands receive the
/// handle itself via [`StageInput::into_stdio`]. Dropping the value closes the
/// underlying file or pipe end, except for `Inherit`, which only aliases the
/// interpreter's own standard input and never closes it.
#[derive(Debug)]
pub enum StageInput {
    Inherit,
    File(File),
    Pipe(PipeReader),
}

impl StageInput {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    pub fn into_stdio(self) -> Stdio {
        match self {
            StageInput::Inherit => Stdio::inherit(),
            StageInput::File(file) => file.into(),
            StageInput::Pipe(reader) => reader.into(),
        }
    }
}

impl Read for StageInput {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match self {
            StageInput::Inherit => io::stdin().read(buf),
            StageInput::File(file) => file.read(buf),
            StageInput::Pipe(reader) => reader.read(buf),
        }
    }
}

/// Where a pipeline stage writes to. Same ownership rules as [`StageInput`].
#[derive(Debug)]
pub enum StageOutput {
    Inherit,
    File(File),
    Pipe(PipeWriter),
}

impl StageOutput {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    pub fn into_stdio(self) -> Stdio {
        match self {
            StageOutput::Inherit => Stdio::inherit(),
            StageOutput::File(file) => file.into(),
            StageOutput::Pipe(writer) => writer.into(),
        }
    }
}

impl Write for StageOutput {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        match self {
            StageOutput::Inherit => io::stdout().write(data),
            StageOutput::File(file) => file.write(data),
            StageOutput::Pipe(writer) => writer.write(data),
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self {
            StageOutput::Inherit => io::stdout().flush(),
            StageOutput::File(file) => file.flush(),
            StageOutput::Pipe(writer) => writer.flush(),
        }
    }
}

use crate::command::{BuiltinContext, CommandFactory, ExecutableCommand, ExitCode};
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "exit".
    fn name() -> &'static str;

    /// Arguments in the form handed to argh.
    fn prepare_args<'a>(args: &[&'a str]) -> Vec<&'a str> {
        args.to_vec()
    }

    /// Executes the command using provided IO streams and interpreter state.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        ctx: &mut BuiltinContext<'_>,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        ctx: &mut BuiltinContext<'_>,
    ) -> Result<ExitCode> {
        match <T as BuiltinCommand>::execute(*self, stdin, stdout, ctx) {
            Ok(x) => Ok(x),
            Err(e) => {
                eprintln!("thsh: {e:#}");
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _ctx: &mut BuiltinContext<'_>,
    ) -> Result<ExitCode> {
        if self.is_error {
            eprintln!("{}", self.output);
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output)?;
            Ok(0)
        }
    }
}

/// Factory allows creating instances of a builtin by name.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        Some(match T::from_args(&[name], &T::prepare_args(args)) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        })
    }
}

/// Fixed mapping from command name to builtin handler.
pub struct BuiltinTable {
    factories: Vec<Box<dyn CommandFactory>>,
}

impl BuiltinTable {
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { factories }
    }

    /// Names of every builtin, in table order.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    /// The builtin registered under `name`, ready to run with `args`.
    pub fn lookup(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        self.factories
            .iter()
            .find_map(|factory| factory.try_create(name, args))
    }
}

impl Default for BuiltinTable {
    /// The interpreter's builtins: `cd`, `exit`, `history`, `clear`.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<PrintHistory>::default()),
            Box::new(Factory::<Clear>::default()),
        ])
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// Without a target, changes to $HOME; `cd -` returns to the previous directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to, or `-` for the previous one.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    // argh reads a lone `-` as an unknown flag; end option parsing before it.
    fn prepare_args<'a>(args: &[&'a str]) -> Vec<&'a str> {
        if args == ["-"] {
            vec!["--", "-"]
        } else {
            args.to_vec()
        }
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        ctx: &mut BuiltinContext<'_>,
    ) -> Result<ExitCode> {
        let env = &mut *ctx.env;
        let back = self.target.as_deref() == Some("-");
        let target = match self.target.as_deref() {
            Some("-") => env.previous_dir.clone(),
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => bail!("cd: no target and HOME not set"),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.previous_dir = std::mem::replace(&mut env.current_dir, canonical);

        if back {
            eprintln!("{}", env.current_dir.display());
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Save history and leave the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        ctx: &mut BuiltinContext<'_>,
    ) -> Result<ExitCode> {
        let path = ctx.env.history_path();
        if let Err(e) = ctx.history.persist(&path) {
            tracing::warn!("could not save history to {}: {}", path.display(), e);
        }
        ctx.env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the command history, oldest first.
pub struct PrintHistory {}

impl BuiltinCommand for PrintHistory {
    fn name() -> &'static str {
        "history"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        ctx: &mut BuiltinContext<'_>,
    ) -> Result<ExitCode> {
        ctx.history.print(stdout)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Forget the command history.
pub struct Clear {}

impl BuiltinCommand for Clear {
    fn name() -> &'static str {
        "clear"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        ctx: &mut BuiltinContext<'_>,
    ) -> Result<ExitCode> {
        ctx.history.clear();
        Ok(0)
    }
}

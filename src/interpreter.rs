use crate::builtin::BuiltinTable;
use crate::command::{BuiltinContext, ExitCode};
use crate::completion::{CommandCompleter, Trie};
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::executor::Executor;
use crate::history::History;
use crate::job::JobRegistry;
use crate::parser;
use crate::path::PathTable;
use nix::sys::resource::{UsageWho, getrusage};
use nix::sys::time::TimeVal;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, Editor};
use std::io::BufRead;
use std::time::{Duration, Instant};

/// The shell: owns all interpreter state and turns input lines into running
/// pipelines.
///
/// Example
/// ```no_run
/// use thsh::Interpreter;
/// let mut sh = Interpreter::from_env().unwrap();
/// let code = sh.eval("echo hello | wc -c");
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    paths: PathTable,
    builtins: BuiltinTable,
    jobs: JobRegistry,
    history: History,
    timing: bool,
}

impl Interpreter {
    /// Create an interpreter searching `paths`, with the default builtins and
    /// an empty history.
    pub fn new(paths: PathTable) -> Self {
        Self {
            env: Environment::new(),
            paths,
            builtins: BuiltinTable::default(),
            jobs: JobRegistry::new(),
            history: History::new(),
            timing: false,
        }
    }

    /// Create an interpreter from the process environment. Fails when `PATH`
    /// is missing or too long.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(PathTable::from_env()?))
    }

    /// Print a `TIMES:` line after every executed line.
    pub fn with_timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    pub fn prompt(&self) -> String {
        format!("[{}] thsh> ", self.env.current_dir.display())
    }

    /// Parse and execute one line, globbing against the working directory.
    pub fn run_line(&mut self, line: &str) -> Result<ExitCode> {
        let pipeline = parser::parse_in(line, &self.env.current_dir)?;
        let mut ctx = BuiltinContext {
            env: &mut self.env,
            history: &mut self.history,
        };
        Executor::new(&self.paths, &self.builtins, &mut self.jobs).execute(&pipeline, &mut ctx)
    }

    /// Handle one line of input the way the driver loop does: record it in
    /// history, run it and report failures. Returns the line's status.
    pub fn eval(&mut self, line: &str) -> ExitCode {
        if line.starts_with('#') {
            return 0;
        }
        if !line.trim().is_empty() {
            self.history.append(line);
        }

        let timer = self.timing.then(Timer::start);
        let code = match self.run_line(line) {
            Ok(code) => code,
            Err(e) => return report_error(&e),
        };
        if let Some(timer) = timer {
            println!("{}", timer.report());
        }
        if code != 0 {
            println!("Failed to run command - error {code}");
        }
        code
    }

    /// Interactive loop with line editing and command completion.
    ///
    /// Ctrl-C abandons the line being edited; end of input leaves the loop.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let config = Config::builder()
            .completion_type(CompletionType::List)
            .auto_add_history(false)
            .build();
        let mut rl: Editor<CommandCompleter, DefaultHistory> = Editor::with_config(config)?;
        rl.set_helper(Some(CommandCompleter::new(self.command_names())));
        for line in self.history.iter() {
            rl.add_history_entry(line)?;
        }

        while !self.should_exit() {
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() && !line.starts_with('#') {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.eval(&line);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Run every line of `input` without prompting, until it ends or `exit`
    /// is executed.
    pub fn run_script(&mut self, input: impl BufRead) -> anyhow::Result<()> {
        for line in input.lines() {
            self.eval(&line?);
            if self.should_exit() {
                break;
            }
        }
        Ok(())
    }

    /// Load the persisted history. Failures are logged and otherwise ignored.
    pub fn restore_history(&mut self) {
        let path = self.env.history_path();
        if let Err(e) = self.history.restore(&path) {
            tracing::warn!("could not read history from {}: {}", path.display(), e);
        }
    }

    /// Save the history. Failures are logged and otherwise ignored.
    pub fn persist_history(&self) {
        let path = self.env.history_path();
        if let Err(e) = self.history.persist(&path) {
            tracing::warn!("could not save history to {}: {}", path.display(), e);
        }
    }

    fn command_names(&self) -> Trie {
        let mut trie: Trie = self.builtins.names().into_iter().collect();
        for name in self.paths.executables() {
            trie.insert(&name);
        }
        trie
    }
}

fn report_error(err: &ShellError) -> ExitCode {
    if err.is_parse_error() {
        eprintln!("Parsing error.  Cannot execute command. {err}");
    } else {
        eprintln!("thsh: {err}");
    }
    err.status()
}

/// Wall-clock and child CPU time spent on one line.
struct Timer {
    started: Instant,
    children: (Duration, Duration),
}

impl Timer {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            children: children_cpu_time(),
        }
    }

    fn report(&self) -> String {
        let real = self.started.elapsed();
        let (user, sys) = children_cpu_time();
        format!(
            "TIMES: real={:.1}s user={:.1}s sys={:.1}s",
            real.as_secs_f64(),
            user.saturating_sub(self.children.0).as_secs_f64(),
            sys.saturating_sub(self.children.1).as_secs_f64(),
        )
    }
}

/// User and system time consumed by reaped children so far.
fn children_cpu_time() -> (Duration, Duration) {
    match getrusage(UsageWho::RUSAGE_CHILDREN) {
        Ok(usage) => (to_duration(usage.user_time()), to_duration(usage.system_time())),
        Err(e) => {
            tracing::warn!("getrusage failed: {}", e);
            (Duration::ZERO, Duration::ZERO)
        }
    }
}

fn to_duration(tv: TimeVal) -> Duration {
    let secs = u64::try_from(tv.tv_sec()).unwrap_or(0);
    let micros = u64::try_from(tv.tv_usec()).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(micros)
}

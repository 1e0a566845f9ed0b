use crate::builtin::BuiltinTable;
use crate::command::{BuiltinContext, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::io_adapters::{StageInput, StageOutput};
use crate::job::{ChildRecord, JobId, JobRegistry};
use crate::parser::{Pipeline, Stage};
use crate::path::PathTable;
use std::fs::{File, OpenOptions};
use std::io::{self, PipeWriter, Read, Write};
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::thread::{self, JoinHandle};

/// What happened when a single stage was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Launch {
    /// Ran to completion inside the interpreter.
    Builtin(ExitCode),
    /// A child process was registered with the job.
    Spawned,
    /// The stage could not be started; later stages are skipped.
    Aborted(ExitCode),
}

/// How a stage is going to run, settled before anything starts.
enum Plan<'s> {
    Builtin {
        name: &'s str,
        cmd: Box<dyn ExecutableCommand>,
    },
    External {
        stage: &'s Stage,
        path: PathBuf,
    },
}

/// Drains a builtin's buffered output into the next stage.
type PipeFeeder = JoinHandle<io::Result<()>>;

/// Runs parsed pipelines.
///
/// All stages of a pipeline are launched before any of them is waited on, so
/// neighbours run concurrently and the pipes between them never fill up with
/// nobody reading. A builtin feeding a pipe writes into memory first; a
/// feeder thread hands the bytes to the next stage once it is running.
pub struct Executor<'a> {
    paths: &'a PathTable,
    builtins: &'a BuiltinTable,
    jobs: &'a mut JobRegistry,
}

impl<'a> Executor<'a> {
    pub fn new(paths: &'a PathTable, builtins: &'a BuiltinTable, jobs: &'a mut JobRegistry) -> Self {
        Self {
            paths,
            builtins,
            jobs,
        }
    }

    /// Run `pipeline` and return the status of its last launched stage.
    ///
    /// Empty stages are skipped. Every command is resolved before any stage
    /// starts: an unknown name reports `Command not found` with status 127
    /// and nothing runs. A redirect file that cannot be opened fails the
    /// whole line. A stage that cannot be spawned (126) stops the remaining
    /// stages.
    pub fn execute(&mut self, pipeline: &Pipeline, ctx: &mut BuiltinContext<'_>) -> Result<ExitCode> {
        let stages: Vec<&Stage> = pipeline.stages().iter().filter(|s| !s.is_empty()).collect();
        if stages.is_empty() {
            return Ok(0);
        }

        let plans = match self.plan(&stages) {
            Ok(plans) => plans,
            Err(err) => {
                eprintln!("{err}");
                return Ok(err.status());
            }
        };

        let input = open_input(pipeline.input())?;
        let output = open_output(pipeline.output())?;

        let job = self.jobs.create();
        let mut feeders = Vec::new();
        let launched = self.launch_all(job, plans, input, output, ctx, &mut feeders);
        let waited = self.jobs.wait(job);
        join_feeders(feeders);

        match launched? {
            Launch::Spawned => waited,
            Launch::Builtin(code) | Launch::Aborted(code) => waited.map(|_| code),
        }
    }

    fn plan<'s>(&self, stages: &[&'s Stage]) -> Result<Vec<Plan<'s>>> {
        let mut plans = Vec::with_capacity(stages.len());
        for &stage in stages {
            let Some(name) = stage.name() else {
                continue;
            };
            let args: Vec<&str> = stage.args().iter().map(String::as_str).collect();
            let plan = match self.builtins.lookup(name, &args) {
                Some(cmd) => Plan::Builtin { name, cmd },
                None => {
                    let path = self
                        .paths
                        .resolve(name)
                        .map_err(|_| ShellError::CommandNotFound(name.to_string()))?;
                    Plan::External { stage, path }
                }
            };
            plans.push(plan);
        }
        Ok(plans)
    }

    fn launch_all(
        &mut self,
        job: JobId,
        plans: Vec<Plan<'_>>,
        mut input: StageInput,
        output: StageOutput,
        ctx: &mut BuiltinContext<'_>,
        feeders: &mut Vec<PipeFeeder>,
    ) -> Result<Launch> {
        let last = plans.len().saturating_sub(1);
        let mut output = Some(output);
        let mut outcome = Launch::Builtin(0);

        for (i, plan) in plans.into_iter().enumerate() {
            let (stage_output, next_input) = if i == last {
                (output.take().unwrap_or(StageOutput::Inherit), StageInput::Inherit)
            } else {
                let (reader, writer) = io::pipe()?;
                (StageOutput::Pipe(writer), StageInput::Pipe(reader))
            };
            let stage_input = mem::replace(&mut input, next_input);
            outcome = self.launch(job, plan, stage_input, stage_output, ctx, feeders);
            if matches!(outcome, Launch::Aborted(_)) || ctx.env.should_exit {
                break;
            }
        }
        Ok(outcome)
    }

    fn launch(
        &mut self,
        job: JobId,
        plan: Plan<'_>,
        mut input: StageInput,
        output: StageOutput,
        ctx: &mut BuiltinContext<'_>,
        feeders: &mut Vec<PipeFeeder>,
    ) -> Launch {
        let (stage, path) = match plan {
            Plan::Builtin { name, cmd } => {
                let code = match output {
                    StageOutput::Pipe(writer) => {
                        let mut buffer = Vec::new();
                        let code = run_builtin(name, cmd, &mut input, &mut buffer, ctx);
                        feeders.push(feed(writer, buffer));
                        code
                    }
                    mut output => run_builtin(name, cmd, &mut input, &mut output, ctx),
                };
                return Launch::Builtin(code);
            }
            Plan::External { stage, path } => (stage, path),
        };

        let name = stage.name().unwrap_or_default();
        tracing::debug!("RUNNING: [{}]", name);
        match spawn(&path, stage, input, output, ctx.env) {
            Ok(child) => {
                if let Err(mut orphan) = self.jobs.add_child(job, ChildRecord::new(name, child)) {
                    let _ = orphan.wait();
                }
                Launch::Spawned
            }
            Err(source) => {
                let err = ShellError::Spawn {
                    name: name.to_string(),
                    source,
                };
                eprintln!("thsh: {err}");
                Launch::Aborted(err.status())
            }
        }
    }
}

fn run_builtin(
    name: &str,
    cmd: Box<dyn ExecutableCommand>,
    input: &mut dyn Read,
    output: &mut dyn Write,
    ctx: &mut BuiltinContext<'_>,
) -> ExitCode {
    tracing::debug!("RUNNING: [{}]", name);
    let code = cmd
        .execute(input, output, ctx)
        .and_then(|code| {
            output.flush()?;
            Ok(code)
        })
        .unwrap_or_else(|e| {
            eprintln!("thsh: {e:#}");
            1
        });
    tracing::debug!("ENDED: [{}] (ret={})", name, code);
    code
}

fn feed(mut writer: PipeWriter, buffer: Vec<u8>) -> PipeFeeder {
    thread::spawn(move || writer.write_all(&buffer))
}

// A reader that quits early leaves the feeder with a broken pipe; that only
// means the bytes were not wanted.
fn join_feeders(feeders: Vec<PipeFeeder>) {
    for feeder in feeders {
        match feeder.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("builtin output not fully consumed: {}", e),
            Err(_) => tracing::warn!("builtin output feeder panicked"),
        }
    }
}

// The stage's handles are moved into the `Command`, which is dropped on
// return, so the interpreter keeps no copy of a pipe end a child now owns.
fn spawn(
    path: &Path,
    stage: &Stage,
    input: StageInput,
    output: StageOutput,
    env: &Environment,
) -> io::Result<Child> {
    let mut cmd = Command::new(path);
    if let Some(name) = stage.name() {
        cmd.arg0(name);
    }
    cmd.args(stage.args())
        .stdin(input.into_stdio())
        .stdout(output.into_stdio())
        .envs(&env.vars)
        .current_dir(&env.current_dir)
        .spawn()
}

fn open_input(target: Option<&str>) -> Result<StageInput> {
    match target {
        None => Ok(StageInput::Inherit),
        Some(path) => File::open(path)
            .map(StageInput::File)
            .map_err(|source| ShellError::Redirect {
                path: path.to_string(),
                source,
            }),
    }
}

fn open_output(target: Option<&str>) -> Result<StageOutput> {
    match target {
        None => Ok(StageOutput::Inherit),
        Some(path) => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(path)
            .map(StageOutput::File)
            .map_err(|source| ShellError::Redirect {
                path: path.to_string(),
                source,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use crate::parser::parse;
    use crate::testutil::{lock_current_dir, make_unique_temp_dir};
    use std::fs;

    struct Fixture {
        paths: PathTable,
        builtins: BuiltinTable,
        jobs: JobRegistry,
        env: Environment,
        history: History,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                paths: PathTable::from_env().expect("PATH"),
                builtins: BuiltinTable::default(),
                jobs: JobRegistry::new(),
                env: Environment::new(),
                history: History::new(),
            }
        }

        fn run(&mut self, line: &str) -> Result<ExitCode> {
            let pipeline = parse(line)?;
            let mut ctx = BuiltinContext {
                env: &mut self.env,
                history: &mut self.history,
            };
            Executor::new(&self.paths, &self.builtins, &mut self.jobs).execute(&pipeline, &mut ctx)
        }
    }

    #[test]
    fn test_pipes_connect_stages_and_output_is_redirected() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_pipe");
        let out = dir.join("out.txt");
        let mut sh = Fixture::new();

        let code = sh
            .run(&format!("printf hello | tr a-z A-Z > {}", out.display()))
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "HELLO");
        assert!(sh.jobs.is_empty());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_input_redirect_feeds_first_stage() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_input");
        let input = dir.join("in.txt");
        let out = dir.join("out.txt");
        fs::write(&input, "b\na\nc\n").unwrap();
        let mut sh = Fixture::new();

        let code = sh
            .run(&format!("sort < {} > {}", input.display(), out.display()))
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\nc\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_output_redirect_truncates_existing_file() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_truncate");
        let out = dir.join("out.txt");
        fs::write(&out, "something much longer than the new content").unwrap();
        let mut sh = Fixture::new();

        sh.run(&format!("printf x > {}", out.display())).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "x");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_status_is_that_of_the_last_stage() {
        let _lock = lock_current_dir();
        let mut sh = Fixture::new();
        assert_eq!(sh.run("true | false").unwrap(), 1);
        assert_eq!(sh.run("false | true").unwrap(), 0);
    }

    #[test]
    fn test_unknown_command_reports_not_found_status() {
        let _lock = lock_current_dir();
        let mut sh = Fixture::new();
        let code = sh.run("thsh-no-such-command-anywhere").unwrap();
        assert_eq!(code, 127);

        let code = sh.run("true | thsh-no-such-command-anywhere | true").unwrap();
        assert_eq!(code, 127);
        assert!(sh.jobs.is_empty());
    }

    #[test]
    fn test_unknown_command_starts_no_stage_at_all() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_fail_fast");
        let marker = dir.join("marker");
        let out = dir.join("out.txt");
        let mut sh = Fixture::new();

        let line = format!(
            "touch {} | thsh-no-such-command-anywhere > {}",
            marker.display(),
            out.display()
        );
        assert_eq!(sh.run(&line).unwrap(), 127);
        assert!(!marker.exists());
        assert!(!out.exists());
        assert!(sh.jobs.is_empty());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_large_stream_between_external_stages() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_large");
        let out = dir.join("out.txt");
        let mut sh = Fixture::new();

        let code = sh
            .run(&format!("head -c 1000000 /dev/zero | wc -c > {}", out.display()))
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "1000000");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_builtin_output_larger_than_a_pipe_reaches_next_stage() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_large_builtin");
        let out = dir.join("out.txt");
        let mut sh = Fixture::new();
        let entry = "x".repeat(2000);
        for _ in 0..50 {
            sh.history.append(&entry);
        }
        let mut expected = Vec::new();
        sh.history.print(&mut expected).unwrap();
        assert!(expected.len() > 64 * 1024);

        let code = sh
            .run(&format!("history | wc -c > {}", out.display()))
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(
            fs::read_to_string(&out).unwrap().trim(),
            expected.len().to_string()
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_builtin_output_cut_short_by_reader_does_not_hang() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_early_close");
        let out = dir.join("out.txt");
        let mut sh = Fixture::new();
        let entry = "y".repeat(2000);
        for _ in 0..50 {
            sh.history.append(&entry);
        }

        let code = sh
            .run(&format!("history | head -c 5 > {}", out.display()))
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "1: yy");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_input_file_fails_the_line() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_missing");
        let mut sh = Fixture::new();

        let err = sh
            .run(&format!("cat < {}", dir.join("absent").display()))
            .unwrap_err();
        assert!(matches!(err, ShellError::Redirect { .. }));
        assert!(sh.jobs.is_empty());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_empty_stages_and_blank_lines_are_skipped() {
        let _lock = lock_current_dir();
        let mut sh = Fixture::new();
        assert_eq!(sh.run("").unwrap(), 0);
        assert_eq!(sh.run("   # only a comment").unwrap(), 0);
        assert_eq!(sh.run("| false |").unwrap(), 1);
    }

    #[test]
    fn test_builtin_output_flows_into_next_stage() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_builtin");
        let out = dir.join("out.txt");
        let mut sh = Fixture::new();
        sh.history.append("ls");
        sh.history.append("pwd");

        let code = sh
            .run(&format!("history | cat > {}", out.display()))
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "1: ls\n2: pwd\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_exit_stops_the_remaining_stages() {
        let _lock = lock_current_dir();
        let dir = make_unique_temp_dir("exec_exit");
        let marker = dir.join("marker");
        let mut sh = Fixture::new();
        sh.env.set_var("HOME", dir.to_string_lossy().to_string());

        let code = sh.run(&format!("exit | touch {}", marker.display())).unwrap();
        assert_eq!(code, 0);
        assert!(sh.env.should_exit);
        assert!(!marker.exists());
        assert!(dir.join(".thsh_history").exists());

        let _ = fs::remove_dir_all(dir);
    }
}

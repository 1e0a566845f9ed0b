use anyhow::{Context, Result};
use argh::FromArgs;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use thsh::Interpreter;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// A small Unix shell with pipes, redirection and a command history.
struct Args {
    #[argh(switch, short = 'd')]
    /// trace every stage as it starts and ends.
    debug: bool,

    #[argh(switch, short = 't')]
    /// print real, user and system time after each line.
    timing: bool,

    #[argh(positional)]
    /// read commands from this file instead of the terminal.
    script: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let level = if args.debug { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut sh = Interpreter::from_env()?.with_timing(args.timing);
    sh.restore_history();

    match args.script {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("can't open script {}", path.display()))?;
            sh.run_script(BufReader::new(file))?;
        }
        None => sh.repl()?,
    }

    sh.persist_history();
    Ok(())
}

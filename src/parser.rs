//! Turns one input line into a [`Pipeline`]: stages split on `|`, arguments
//! split on blanks, at most one `<` and one `>` target, `#` comments, and
//! leading-wildcard globs expanded against a directory listing.

use crate::error::{Result, ShellError};
use crate::glob;
use std::path::Path;

/// Most stages a single line may hold.
pub const MAX_PIPELINE: usize = 32;

/// Most arguments (command name included) a single stage may hold.
pub const MAX_ARGS: usize = 16;

/// One command of a pipeline. The first argument is the command name.
///
/// A stage is only ever empty when the line had nothing between two `|`
/// (or before the first / after the last one); the executor skips those.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    args: Vec<String>,
}

impl Stage {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }

    pub fn name(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Every argument, command name first.
    pub fn argv(&self) -> &[String] {
        &self.args
    }

    /// Arguments after the command name.
    pub fn args(&self) -> &[String] {
        self.args.get(1..).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// A parsed line: ordered stages plus optional whole-pipeline redirections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
    input: Option<String>,
    output: Option<String>,
}

impl Pipeline {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// File the first stage reads from, if redirected.
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    /// File the last stage writes to, if redirected.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True for blank and comment-only lines.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

struct LineParser<'a> {
    input: Vec<char>,
    pos: usize,
    glob_dir: &'a Path,
    stages: Vec<Stage>,
    current: Vec<String>,
    word: String,
    input_target: Option<String>,
    output_target: Option<String>,
}

impl<'a> LineParser<'a> {
    fn new(line: &str, glob_dir: &'a Path) -> Self {
        LineParser {
            input: line.chars().collect(),
            pos: 0,
            glob_dir,
            stages: Vec::new(),
            current: Vec::new(),
            word: String::new(),
            input_target: None,
            output_target: None,
        }
    }

    fn make_pipeline(mut self) -> Result<Pipeline> {
        while let Some(ch) = self.read_char() {
            match ch {
                '#' | '\n' => break,
                ' ' | '\t' => self.finish_word()?,
                '|' => {
                    self.finish_word()?;
                    self.finish_stage()?;
                }
                '<' | '>' => {
                    self.finish_word()?;
                    self.read_redirect(ch)?;
                }
                c => self.word.push(c),
            }
        }

        self.finish_word()?;
        if !self.stages.is_empty() || !self.current.is_empty() {
            self.finish_stage()?;
        }

        Ok(Pipeline {
            stages: self.stages,
            input: self.input_target,
            output: self.output_target,
        })
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn is_delimiter(ch: char) -> bool {
        matches!(ch, ' ' | '\t' | '|' | '#' | '<' | '>' | '\n')
    }

    /// Reads the filename following `<` or `>`. The delimiter that ends it is
    /// left for the main loop.
    fn read_redirect(&mut self, op: char) -> Result<()> {
        while matches!(self.peek_char(), Some(' ' | '\t')) {
            self.pos += 1;
        }

        let mut target = String::new();
        while let Some(ch) = self.peek_char() {
            if Self::is_delimiter(ch) {
                break;
            }
            target.push(ch);
            self.pos += 1;
        }

        if target.is_empty() {
            return Err(ShellError::Parse(format!(
                "missing file name after `{op}`"
            )));
        }

        let slot = if op == '<' {
            &mut self.input_target
        } else {
            &mut self.output_target
        };
        if slot.is_some() {
            return Err(ShellError::Parse(format!(
                "only one `{op}` redirection is supported per line"
            )));
        }
        *slot = Some(target);
        Ok(())
    }

    fn finish_word(&mut self) -> Result<()> {
        if self.word.is_empty() {
            return Ok(());
        }
        let token = std::mem::take(&mut self.word);

        if glob::is_glob(&token) {
            let matches = glob::expand(&token, self.glob_dir).unwrap_or_else(|e| {
                tracing::debug!("can't list {}: {}", self.glob_dir.display(), e);
                Vec::new()
            });
            if !matches.is_empty() {
                for name in matches {
                    self.push_arg(name)?;
                }
                return Ok(());
            }
        }
        self.push_arg(token)
    }

    fn push_arg(&mut self, arg: String) -> Result<()> {
        if self.current.len() == MAX_ARGS {
            return Err(ShellError::ResourceExhausted(format!(
                "more than {MAX_ARGS} arguments in one command"
            )));
        }
        self.current.push(arg);
        Ok(())
    }

    fn finish_stage(&mut self) -> Result<()> {
        if self.stages.len() == MAX_PIPELINE {
            return Err(ShellError::ResourceExhausted(format!(
                "more than {MAX_PIPELINE} commands in one pipeline"
            )));
        }
        let args = std::mem::take(&mut self.current);
        self.stages.push(Stage::new(args));
        Ok(())
    }
}

/// Parse one line, expanding globs against the current directory.
pub fn parse(line: &str) -> Result<Pipeline> {
    parse_in(line, Path::new("."))
}

/// Parse one line, expanding globs against `glob_dir`.
pub fn parse_in(line: &str, glob_dir: &Path) -> Result<Pipeline> {
    LineParser::new(line, glob_dir).make_pipeline()
}

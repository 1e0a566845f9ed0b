//! Command-name completion for the interactive editor.

use rustyline::Context;
use rustyline::completion::Completer;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::Helper;
use std::collections::BTreeMap;

/// Prefix tree over command names.
#[derive(Debug, Default, Clone)]
pub struct Trie {
    root: Node,
    len: usize,
}

#[derive(Debug, Default, Clone)]
struct Node {
    children: BTreeMap<char, Node>,
    terminal: bool,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `word` was already present.
    pub fn insert(&mut self, word: &str) -> bool {
        let mut node = &mut self.root;
        for ch in word.chars() {
            node = node.children.entry(ch).or_default();
        }
        if node.terminal {
            return false;
        }
        node.terminal = true;
        self.len += 1;
        true
    }

    pub fn contains(&self, word: &str) -> bool {
        self.find(word).is_some_and(|node| node.terminal)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every stored word starting with `prefix`, in lexicographic order.
    pub fn suggest(&self, prefix: &str) -> Vec<String> {
        let mut found = Vec::new();
        if let Some(node) = self.find(prefix) {
            let mut word = prefix.to_string();
            collect(node, &mut word, &mut found);
        }
        found
    }

    fn find(&self, prefix: &str) -> Option<&Node> {
        let mut node = &self.root;
        for ch in prefix.chars() {
            node = node.children.get(&ch)?;
        }
        Some(node)
    }
}

fn collect(node: &Node, word: &mut String, found: &mut Vec<String>) {
    if node.terminal {
        found.push(word.clone());
    }
    for (ch, child) in &node.children {
        word.push(*ch);
        collect(child, word, found);
        word.pop();
    }
}

impl<'a> FromIterator<&'a str> for Trie {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut trie = Trie::new();
        for word in iter {
            trie.insert(word);
        }
        trie
    }
}

/// Editor helper completing the word in command position: the start of the
/// line or right after a `|`. Arguments are left alone.
pub struct CommandCompleter {
    commands: Trie,
}

impl CommandCompleter {
    pub fn new(commands: Trie) -> Self {
        Self { commands }
    }

    /// Start offset and text of the command word ending at `pos`, if the
    /// cursor sits in command position.
    fn command_word<'l>(line: &'l str, pos: usize) -> Option<(usize, &'l str)> {
        let head = line.get(..pos)?;
        let stage_start = head.rfind('|').map_or(0, |i| i + 1);
        let stage = &head[stage_start..];
        let trimmed = stage.trim_start_matches([' ', '\t']);
        if trimmed.contains([' ', '\t', '<', '>']) {
            return None;
        }
        Some((pos - trimmed.len(), trimmed))
    }

    pub fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        match Self::command_word(line, pos) {
            Some((start, word)) if !word.is_empty() => (start, self.commands.suggest(word)),
            _ => (pos, Vec::new()),
        }
    }
}

impl Completer for CommandCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok(self.candidates(line, pos))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}

impl Validator for CommandCompleter {}

impl Helper for CommandCompleter {}

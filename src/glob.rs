//! Single leading-wildcard filename patterns such as `*.txt`.

use std::fs;
use std::io;
use std::path::Path;

/// A token is a glob when its only `*` is the first character.
pub fn is_glob(token: &str) -> bool {
    token.starts_with('*') && !token[1..].contains('*')
}

/// Whether `name` ends with the literal text that follows the `*`.
pub fn matches(glob: &str, name: &str) -> bool {
    match glob.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => false,
    }
}

/// Names of the entries in `dir` matching `glob`, in directory enumeration
/// order.
pub fn expand(glob: &str, dir: &Path) -> io::Result<Vec<String>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if matches(glob, &name) {
            found.push(name);
        }
    }
    Ok(found)
}

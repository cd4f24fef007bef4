//! Terminal line parsing.
//!
//! One input line may hold several commands separated by `;`. Each command is
//! split on whitespace, with double quotes grouping words into one argument.
//! A trailing `&` (either its own token or glued to the last word) marks the
//! command as a background cast.
//!
//! ```
//! use cloudrunner_engine::shell::parse_line;
//!
//! let cmds = parse_line("scan; inject --payload burn &");
//! assert_eq!(cmds.len(), 2);
//! assert_eq!(cmds[0].name, "scan");
//! assert!(!cmds[0].background);
//! assert_eq!(cmds[1].args, vec!["--payload", "burn"]);
//! assert!(cmds[1].background);
//! ```

use serde::{Deserialize, Serialize};

/// One parsed command from a terminal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    /// Command name, the first word.
    pub name: String,
    /// Remaining words, quotes removed.
    pub args: Vec<String>,
    /// The trimmed segment as typed, `&` included.
    pub raw: String,
    /// Whether the segment ended in `&`.
    pub background: bool,
}

/// Split `line` into commands. Blank segments are dropped.
pub fn parse_line(line: &str) -> Vec<CommandLine> {
    split_segments(line)
        .into_iter()
        .filter_map(|segment| parse_segment(&segment))
        .collect()
}

fn split_segments(line: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ';' if !quoted => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn parse_segment(segment: &str) -> Option<CommandLine> {
    let raw = segment.trim();
    let (body, background) = match raw.strip_suffix('&') {
        Some(rest) => (rest.trim_end(), true),
        None => (raw, false),
    };

    let mut words = split_args(body).into_iter();
    let name = words.next()?;
    Some(CommandLine {
        name,
        args: words.collect(),
        raw: raw.to_owned(),
        background,
    })
}

/// Whitespace split with double-quote grouping. An unterminated quote runs to
/// the end of the input.
pub fn split_args(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut has_token = false;
    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                has_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if has_token {
                    out.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        out.push(current);
    }
    out
}

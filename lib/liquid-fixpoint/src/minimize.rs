//! Textual reduction of a serialized query, for debugging failing verification conditions.
//!
//! Works on the surface syntax alone: a query file is split into items (qualifiers, constants,
//! binds, constraint and wf blocks) which are rewritten until the text stops changing.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Minimizes the query at `path` and writes the result to `<stem>.min.fq` next to it.
pub fn minimize(path: &Path) -> io::Result<PathBuf> {
    let text = fs::read_to_string(path)?;
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("query");
    let out = path.with_file_name(format!("{stem}.min.fq"));
    fs::write(&out, minimize_text(&text))?;
    Ok(out)
}

pub fn minimize_text(text: &str) -> String {
    let mut current = text.to_string();
    let mut rounds = 0;
    loop {
        let mut items = parse_items(&current);
        dedup_clauses(&mut items);
        let removed = drop_unreferenced(&mut items);
        prune_envs(&mut items, &removed);
        let next = render(&items);
        rounds += 1;
        if next == current {
            break;
        }
        current = next;
    }
    debug!(rounds, "minimizer reached a fixed point");
    rename_binds(&current)
}

#[derive(Debug)]
enum Item {
    Bind { id: String, name: String, head: String, clauses: Vec<String>, tail: String },
    Constant { name: String, line: String },
    /// A `constraint:` or `wf:` header with its indented lines.
    Block(Vec<String>),
    Line(String),
}

fn parse_items(text: &str) -> Vec<Item> {
    let mut items = vec![];
    for line in text.lines() {
        let indented = line.starts_with(char::is_whitespace) && !line.trim().is_empty();
        if indented && let Some(Item::Block(lines)) = items.last_mut() {
            lines.push(line.to_string());
            continue;
        }
        let item = if line == "constraint:" || line == "wf:" {
            Item::Block(vec![line.to_string()])
        } else if let Some(bind) = parse_bind(line) {
            bind
        } else if let Some(rest) = line.strip_prefix("constant ") {
            let name = rest.split(" :").next().unwrap_or_default().trim().to_string();
            Item::Constant { name, line: line.to_string() }
        } else {
            Item::Line(line.to_string())
        };
        items.push(item);
    }
    items
}

/// `bind <id> <name> : {v : <type> | [<clause>; ...]}`
fn parse_bind(line: &str) -> Option<Item> {
    let rest = line.strip_prefix("bind ")?;
    let mut words = rest.split_whitespace();
    let id = words.next()?.to_string();
    let name = words.next()?.to_string();
    let open = line.find("| [")? + 3;
    let close = line.rfind(']')?;
    if close < open {
        return None;
    }
    Some(Item::Bind {
        id,
        name,
        head: line[..open].to_string(),
        clauses: split_clauses(&line[open..close]),
        tail: line[close..].to_string(),
    })
}

/// Splits at `;` outside of brackets and string literals.
fn split_clauses(s: &str) -> Vec<String> {
    let mut clauses = vec![];
    let mut depth = 0i32;
    let mut in_str = false;
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_str => escaped = true,
            '"' => in_str = !in_str,
            '(' | '[' if !in_str => depth += 1,
            ')' | ']' if !in_str => depth -= 1,
            ';' if !in_str && depth == 0 => {
                clauses.push(s[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    clauses.push(s[start..].trim().to_string());
    clauses.retain(|clause| !clause.is_empty());
    clauses
}

fn dedup_clauses(items: &mut [Item]) {
    for item in items {
        if let Item::Bind { clauses, .. } = item {
            let mut seen = FxHashSet::default();
            clauses.retain(|clause| seen.insert(clause.clone()));
        }
    }
}

fn tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\'' || c == '$'))
        .filter(|tok| !tok.is_empty())
}

fn item_text(item: &Item) -> String {
    match item {
        Item::Bind { head, clauses, tail, .. } => format!("{head}{}{tail}", clauses.join("; ")),
        Item::Constant { line, .. } | Item::Line(line) => line.clone(),
        Item::Block(lines) => lines.join("\n"),
    }
}

/// Drops binds and constants whose name occurs in no other item. Returns the ids of removed binds.
fn drop_unreferenced(items: &mut Vec<Item>) -> FxHashSet<String> {
    let texts = items.iter().map(item_text).collect_vec();
    let mut occurrences: FxHashMap<&str, usize> = FxHashMap::default();
    let mut own: Vec<FxHashSet<&str>> = vec![];
    for text in &texts {
        let toks: FxHashSet<&str> = tokens(text).collect();
        for &tok in &toks {
            *occurrences.entry(tok).or_default() += 1;
        }
        own.push(toks);
    }
    let referenced = |name: &str, own: &FxHashSet<&str>| {
        let count = occurrences.get(name).copied().unwrap_or(0);
        count > usize::from(own.contains(name))
    };

    let mut removed = FxHashSet::default();
    let mut keep = vec![];
    for (item, toks) in items.iter().zip(&own) {
        let keep_item = match item {
            Item::Bind { id, name, .. } => {
                let keep = referenced(name.as_str(), toks);
                if !keep {
                    removed.insert(id.clone());
                }
                keep
            }
            Item::Constant { name, .. } => referenced(name.as_str(), toks),
            Item::Block(_) | Item::Line(_) => true,
        };
        keep.push(keep_item);
    }
    let mut keep = keep.into_iter();
    items.retain(|_| keep.next().unwrap_or(true));
    removed
}

fn prune_envs(items: &mut [Item], removed: &FxHashSet<String>) {
    if removed.is_empty() {
        return;
    }
    for item in items {
        let Item::Block(lines) = item else { continue };
        for line in lines.iter_mut() {
            let trimmed = line.trim_start();
            let Some(ids) = trimmed.strip_prefix("env [").and_then(|s| s.strip_suffix(']')) else {
                continue;
            };
            let indent = &line[..line.len() - trimmed.len()];
            let kept = ids
                .split(';')
                .map(str::trim)
                .filter(|id| !id.is_empty() && !removed.contains(*id))
                .join("; ");
            *line = format!("{indent}env [{kept}]");
        }
    }
}

fn render(items: &[Item]) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str(&item_text(item));
        out.push('\n');
    }
    out
}

/// Renames binds to `x0, x1, ...` in bind order. All occurrences are replaced at once, so a new
/// name never gets renamed again.
fn rename_binds(text: &str) -> String {
    let mut map: FxHashMap<String, String> = FxHashMap::default();
    for item in parse_items(text) {
        if let Item::Bind { name, .. } = item {
            let fresh = format!("x{}", map.len());
            map.entry(name).or_insert(fresh);
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    let is_word_char = |c: char| c.is_alphanumeric() || c == '_' || c == '\'' || c == '$';
    let mut flush = |word: &mut String, out: &mut String| {
        match map.get(word.as_str()) {
            Some(fresh) => out.push_str(fresh),
            None => out.push_str(word),
        }
        word.clear();
    };
    for c in text.chars() {
        if is_word_char(c) {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "\
qualif GtZero(v : @(0)): ((v > 0))

constant len : (func(0, [int; int]))
constant unused : (func(0, [int; int]))

bind 0 a : {v : int | [(v > 0); (v > 0)]}
bind 1 dead : {v : int | [(v = a)]}
bind 2 b : {v : int | [(v = (a + 1)); (len(v) >= 0)]}

constraint:
  env [0; 1; 2]
  lhs {v : int | [(v = b)]}
  rhs {v : int | [$k_b[w:=b]]}
  id 0 tag []

wf:
  env [0; 1; 2]
  reft {v : int | [$k_b]}

";

    #[test]
    fn reduces_to_referenced_items() {
        let expected = "\
qualif GtZero(v : @(0)): ((v > 0))

constant len : (func(0, [int; int]))

bind 0 x0 : {v : int | [(v > 0)]}
bind 2 x1 : {v : int | [(v = (x0 + 1)); (len(v) >= 0)]}

constraint:
  env [0; 2]
  lhs {v : int | [(v = x1)]}
  rhs {v : int | [$k_b[w:=x1]]}
  id 0 tag []

wf:
  env [0; 2]
  reft {v : int | [$k_b]}

";
        assert_eq!(minimize_text(QUERY), expected);
    }

    #[test]
    fn idempotent() {
        let once = minimize_text(QUERY);
        assert_eq!(minimize_text(&once), once);
    }

    #[test]
    fn clauses_split_outside_brackets() {
        assert_eq!(
            split_clauses("$k[a:=f(x; y)]; \"s;t\"; (x = 1)"),
            vec!["$k[a:=f(x; y)]", "\"s;t\"", "(x = 1)"]
        );
    }

    #[test]
    fn writes_min_file_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("7.fq");
        fs::write(&path, QUERY).unwrap();
        let out = minimize(&path).unwrap();
        assert_eq!(out, dir.path().join("7.min.fq"));
        assert_eq!(fs::read_to_string(out).unwrap(), minimize_text(QUERY));
    }
}

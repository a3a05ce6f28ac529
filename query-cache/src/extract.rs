//! Finds the application tables a raw SQL statement touches.
//!
//! This is a heuristic scanner, not a SQL parser. It looks for the keywords
//! `FROM`, `JOIN`, `UPDATE` and `INTO` followed by an identifier carrying the
//! configured table prefix, plus one optional comma separated identifier
//! (`FROM a, b`). An identifier only counts when it is terminated by a
//! backtick, whitespace or the end of the statement and no comma follows.

use regex::Regex;

const SPACE: &str = r"[\t\n\x0B\x0C\r ]";
const IDENT: &str = "[0-9A-Za-z_-]+";

fn is_space(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | 0x0B | 0x0C | b'\r' | b' ')
}

fn comma_follows(bytes: &[u8], mut pos: usize) -> bool {
    while pos < bytes.len() && is_space(bytes[pos]) {
        pos += 1;
    }
    bytes.get(pos) == Some(&b',')
}

fn is_terminated(bytes: &[u8], end: usize) -> bool {
    match bytes.get(end) {
        None => true,
        Some(b'`') => !comma_follows(bytes, end + 1),
        Some(&b) if is_space(b) => !comma_follows(bytes, end),
        Some(_) => false,
    }
}

/// Tables referenced by a statement, deduplicated, in the order they were
/// matched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tables(Vec<String>);

impl Tables {
    /// Returns an iterator over the table names.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Returns the number of distinct tables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no table is held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `table` is one of the tables.
    pub fn contains(&self, table: &str) -> bool {
        self.0.iter().any(|t| t == table)
    }

    /// Returns the table names as a slice.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl IntoIterator for Tables {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tables {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Extracts prefixed table names from SQL statements.
#[derive(Clone, Debug)]
pub struct TableExtractor {
    head: Regex,
    tail: Regex,
}

impl TableExtractor {
    /// Creates an extractor for tables whose names start with `prefix`.
    /// The prefix is matched case-insensitively.
    pub fn new(prefix: &str) -> Self {
        let prefix = regex::escape(prefix);
        let head = format!(r"(?i:from|join|update|into){SPACE}+`?((?i:{prefix}){IDENT})");
        let tail = format!(r"\A`?{SPACE}*,{SPACE}*`?((?i:{prefix}){IDENT})");
        TableExtractor {
            head: Regex::new(&head).expect("escaped table prefix always forms a valid pattern"),
            tail: Regex::new(&tail).expect("escaped table prefix always forms a valid pattern"),
        }
    }

    /// Returns the tables `query` references, or `None` when no
    /// keyword/table pair matched. `None` means the statement cannot be
    /// tied to any table, which is different from touching no table.
    pub fn extract(&self, query: &str) -> Option<Tables> {
        let bytes = query.as_bytes();
        let mut firsts: Vec<&str> = Vec::new();
        let mut seconds: Vec<&str> = Vec::new();
        let mut start = 0;

        while let Some(caps) = self.head.captures_at(query, start) {
            let (Some(whole), Some(ident)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            if is_terminated(bytes, ident.end()) {
                firsts.push(ident.as_str());
                start = ident.end();
            } else if let Some((second, end)) = self.second_table(query, ident.end()) {
                firsts.push(ident.as_str());
                seconds.push(second);
                start = end;
            } else {
                // keywords are ASCII, so the next byte is a char boundary
                start = whole.start() + 1;
            }
        }

        if firsts.is_empty() {
            return None;
        }

        let mut tables: Vec<String> = Vec::with_capacity(firsts.len() + seconds.len());
        for table in firsts.into_iter().chain(seconds) {
            if !tables.iter().any(|t| t == table) {
                tables.push(table.to_string());
            }
        }
        Some(Tables(tables))
    }

    /// Matches `, <table>` right after the first identifier of a clause.
    fn second_table<'q>(&self, query: &'q str, end: usize) -> Option<(&'q str, usize)> {
        let bytes = query.as_bytes();
        let caps = self.tail.captures(&query[end..])?;
        let ident = caps.get(1)?;
        let ident_end = end + ident.end();
        let terminated = is_terminated(bytes, ident_end)
            || (bytes.get(ident_end) == Some(&b'`') && is_terminated(bytes, ident_end + 1));
        terminated.then(|| (&query[end + ident.start()..ident_end], ident_end))
    }
}

//! Dump-record transcoder
//!
//! This module turns the raw insert blocks carved out by the scanner into
//! structured records. The literal SQL tuple syntax is rewritten into JSON
//! by a deterministic left-to-right substitution pass and then parsed with
//! `serde_json`, the way the original hand-escaped encoding is best-effort
//! by nature: raw control bytes are transcoded to visible placeholders
//! rather than embedded, which is an accepted lossy limitation.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::scan::{read_file_part, Blocks, RawBlock, ScanOptions, Scanner};

/// Marker separating the insert header from the value tuples
const VALUES_SEPARATOR: &str = " VALUES ";

/// One literal value from a dump tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL NULL
    Null,

    /// Integer literal
    Integer(i64),

    /// Non-integer numeric literal
    Float(f64),

    /// String literal, with escape sequences decoded
    Text(String),
}

impl SqlValue {
    /// The value as text, if it is a string literal
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// One logical row: a mapping from column name to literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: HashMap<String, SqlValue>,
}

impl Record {
    /// Look up a column value
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    /// Look up a column value as text, `None` for NULL or absent columns
    pub fn get_text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_text)
    }

    /// Number of columns in the record
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Derive the ordered column list of `table` from its `CREATE TABLE`
/// block, if the dump contains one.
///
/// Column lines in a dump schema block are indented two spaces and start
/// with a backtick-quoted name; everything else (keys, constraints, the
/// closing paren) is ignored.
pub fn table_columns(
    scanner: &Scanner,
    path: impl AsRef<Path>,
    table: &str,
) -> Result<Option<Vec<String>>> {
    let marker = format!("CREATE TABLE `{}`", table);
    let found = scanner.find_first(&path, marker.as_bytes(), &ScanOptions::default())?;
    let position = match found.position {
        Some(position) => position,
        None => return Ok(None),
    };
    let block = scanner.find_first(
        &path,
        b"\n)",
        &ScanOptions {
            start: position,
            accumulate: true,
        },
    )?;
    let bytes = match block.bytes {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let text = String::from_utf8_lossy(&bytes);
    let mut columns = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("  `") {
            if let Some(end) = rest.find('`') {
                columns.push(rest[..end].to_string());
            }
        }
    }
    Ok(Some(columns))
}

/// Extract the column list from an insert header fragment like
/// ``INSERT INTO `tbl` (`col1`,`col2`)``.
fn header_columns(header: &str) -> Option<Vec<String>> {
    let open = header.find('(')?;
    let close = header.rfind(')')?;
    if close <= open {
        return None;
    }
    let inner = &header[open + 1..close];
    let columns: Vec<String> = inner
        .split(',')
        .map(|part| part.trim().trim_matches('`').to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if columns.is_empty() {
        None
    } else {
        Some(columns)
    }
}

/// Rewrite the value-tuple fragment of an insert block into JSON.
///
/// A single left-to-right pass tracks whether the cursor is inside a
/// string literal. Outside strings, row parens become brackets and the
/// unquoted `NULL` token becomes `null`. Inside strings, the SQL
/// backslash escapes are transcoded: those with a JSON equivalent keep
/// it, the rest (`\0`, `\Z`) become visible placeholders because the
/// target representation cannot hold the raw byte.
fn rewrite_tuples(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + 16);
    let mut chars = fragment.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => match chars.next() {
                    Some('0') => out.push_str("_0"),
                    Some('Z') => out.push_str("_Z_"),
                    Some('b') => out.push_str("\\b"),
                    Some('t') => out.push_str("\\t"),
                    Some('n') => out.push_str("\\n"),
                    Some('r') => out.push_str("\\r"),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push_str("\\\""),
                    Some('\\') => out.push_str("\\\\"),
                    // MySQL strips the backslash from any other escape.
                    Some(other) => push_json_char(&mut out, other),
                    None => {}
                },
                '\'' => {
                    out.push('"');
                    in_string = false;
                }
                _ => push_json_char(&mut out, c),
            }
        } else {
            match c {
                '(' => out.push('['),
                ')' => out.push(']'),
                '\'' => {
                    out.push('"');
                    in_string = true;
                }
                'N' if starts_with_token(&mut chars, "ULL") => out.push_str("null"),
                _ => out.push(c),
            }
        }
    }
    out
}

/// Push one character of string content, escaping anything JSON cannot
/// hold verbatim.
fn push_json_char(out: &mut String, c: char) {
    match c {
        '"' => out.push_str("\\\""),
        '\\' => out.push_str("\\\\"),
        c if (c as u32) < 0x20 => {
            out.push_str(&format!("\\u{:04x}", c as u32));
        }
        c => out.push(c),
    }
}

/// Consume `rest` from the iterator if it is next, returning whether it was.
fn starts_with_token(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, rest: &str) -> bool {
    let lookahead: String = chars.clone().take(rest.len()).collect();
    if lookahead == rest {
        for _ in 0..rest.len() {
            chars.next();
        }
        true
    } else {
        false
    }
}

fn json_to_sql_value(value: serde_json::Value, raw: &str, rewritten: &str) -> Result<SqlValue> {
    match value {
        serde_json::Value::Null => Ok(SqlValue::Null),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Float(f))
            } else {
                Err(CoreError::malformed_row(
                    format!("unrepresentable number {}", n),
                    raw,
                    rewritten,
                ))
            }
        }
        serde_json::Value::String(s) => Ok(SqlValue::Text(s)),
        other => Err(CoreError::malformed_row(
            format!("unexpected literal {}", other),
            raw,
            rewritten,
        )),
    }
}

/// Transcode one raw insert block into records.
///
/// When `columns` is supplied (derived from a `CREATE TABLE` block), the
/// header fragment is discarded; otherwise the column list is taken from
/// the insert header itself. A block that fails structured parsing after
/// rewriting aborts that block only; callers decide whether to skip it
/// and continue scanning or abort the file.
pub fn parse_block(block: &RawBlock, columns: Option<&[String]>) -> Result<Vec<Record>> {
    let text = String::from_utf8_lossy(&block.bytes);
    let (header, tuples) = match text.split_once(VALUES_SEPARATOR) {
        Some(parts) => parts,
        None => {
            return Err(CoreError::malformed_row(
                "no VALUES separator in insert block",
                &text,
                "",
            ))
        }
    };

    let owned_columns;
    let columns: &[String] = match columns {
        Some(columns) => columns,
        None => {
            owned_columns = header_columns(header).ok_or_else(|| {
                CoreError::malformed_row("no column list in insert header", &text, "")
            })?;
            &owned_columns
        }
    };

    let fragment = tuples.trim_end().trim_end_matches(';');
    let rewritten = format!("[{}]", rewrite_tuples(fragment));
    let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(&rewritten)
        .map_err(|e| CoreError::malformed_row(e.to_string(), fragment, &rewritten))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() != columns.len() {
            return Err(CoreError::SchemaMismatch {
                expected: columns.len(),
                actual: row.len(),
            });
        }
        let mut values = HashMap::with_capacity(columns.len());
        for (column, value) in columns.iter().zip(row) {
            values.insert(
                column.clone(),
                json_to_sql_value(value, fragment, &rewritten)?,
            );
        }
        records.push(Record { values });
    }
    Ok(records)
}

/// Reader for one table of a dump file
///
/// Couples the scanner's block iterator to the transcoder, producing a
/// lazy, forward-only record sequence whose peak memory is one insert
/// block's worth of rows.
#[derive(Debug)]
pub struct DumpReader {
    scanner: Scanner,
    path: PathBuf,
    table: String,
    terminator: Option<Vec<u8>>,
}

impl DumpReader {
    /// Create a reader for `table` in the dump at `path`
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        DumpReader {
            scanner: Scanner::new(),
            path: path.into(),
            table: table.into(),
            terminator: None,
        }
    }

    /// Use a specific scanner (e.g. a smaller chunk size for tests)
    pub fn with_scanner(mut self, scanner: Scanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Use a specific statement terminator instead of deriving it from
    /// the dump's line endings
    pub fn with_terminator(mut self, terminator: impl Into<Vec<u8>>) -> Self {
        self.terminator = Some(terminator.into());
        self
    }

    /// The statement-opening marker for this table
    pub fn insert_marker(&self) -> String {
        format!("INSERT INTO `{}`", self.table)
    }

    /// Resolve the statement terminator: an explicit override wins,
    /// otherwise the byte before the dump's first newline decides
    /// between `;\n` and `;\r\n` (dumps written on Windows use CRLF).
    fn terminator(&self) -> Result<Vec<u8>> {
        if let Some(terminator) = &self.terminator {
            return Ok(terminator.clone());
        }
        let newline = self
            .scanner
            .find_first(&self.path, b"\n", &ScanOptions::default())?;
        if let Some(position) = newline.position {
            if position > 0 && read_file_part(&self.path, position - 1, 1)? == b"\r" {
                return Ok(b";\r\n".to_vec());
            }
        }
        Ok(b";\n".to_vec())
    }

    /// Derive the table's column list from its `CREATE TABLE` block
    pub fn columns(&self) -> Result<Option<Vec<String>>> {
        table_columns(&self.scanner, &self.path, &self.table)
    }

    /// Iterate the table's records lazily.
    ///
    /// Each yielded item is either one record or the error that aborted
    /// one insert block; after a block-level error the iterator resumes
    /// at the next block, leaving skip-vs-abort policy to the caller.
    pub fn records(&self) -> Result<Records<'_>> {
        let columns = self.columns()?;
        let marker = self.insert_marker();
        let terminator = self.terminator()?;
        Ok(Records {
            blocks: self
                .scanner
                .blocks(self.path.clone(), marker.into_bytes(), terminator),
            columns,
            pending: VecDeque::new(),
        })
    }
}

/// Lazy record iterator over every insert block of one table
#[derive(Debug)]
pub struct Records<'a> {
    blocks: Blocks<'a>,
    columns: Option<Vec<String>>,
    pending: VecDeque<Record>,
}

impl Records<'_> {
    /// Drain the iterator, collecting records and per-block errors
    /// separately (skip-and-continue policy).
    pub fn collect_with_errors(self) -> (Vec<Record>, Vec<CoreError>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for item in self {
            match item {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("skipping malformed insert block: {}", e);
                    errors.push(e);
                }
            }
        }
        (records, errors)
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            match self.blocks.next() {
                Some(Ok(block)) => match parse_block(&block, self.columns.as_deref()) {
                    Ok(records) => self.pending = records.into(),
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(e)) => return Some(Err(e)),
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn block(bytes: &[u8]) -> RawBlock {
        RawBlock {
            offset: 0,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_parse_block_round_trip() {
        let raw = block(b"INSERT INTO `t` (`a`,`b`,`c`) VALUES (1,'x',NULL)");
        let records = parse_block(&raw, None).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.get("a"), Some(&SqlValue::Integer(1)));
        assert_eq!(record.get("b"), Some(&SqlValue::Text("x".to_string())));
        assert_eq!(record.get("c"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_parse_block_multiple_rows_preserve_order() {
        let raw = block(b"INSERT INTO `t` (`id`,`name`) VALUES (2,'b'),(1,'a'),(3,'c')");
        let records = parse_block(&raw, None).unwrap();
        let ids: Vec<_> = records
            .iter()
            .map(|r| r.get("id").cloned().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![
                SqlValue::Integer(2),
                SqlValue::Integer(1),
                SqlValue::Integer(3)
            ]
        );
    }

    #[test]
    fn test_parse_block_external_columns_override_header() {
        let columns = vec!["x".to_string(), "y".to_string()];
        let raw = block(b"INSERT INTO `t` VALUES (7,'seven')");
        let records = parse_block(&raw, Some(&columns)).unwrap();
        assert_eq!(records[0].get("x"), Some(&SqlValue::Integer(7)));
        assert_eq!(records[0].get_text("y"), Some("seven"));
    }

    #[test]
    fn test_escaped_content_decodes_to_literal_characters() {
        let raw = block(br"INSERT INTO `t` (`s`) VALUES ('a\tb\nc\'d')");
        let records = parse_block(&raw, None).unwrap();
        assert_eq!(records[0].get_text("s"), Some("a\tb\nc'd"));
    }

    #[test]
    fn test_escaped_backslash_and_double_quote() {
        let raw = block(br#"INSERT INTO `t` (`s`) VALUES ('a\\b\"c')"#);
        let records = parse_block(&raw, None).unwrap();
        assert_eq!(records[0].get_text("s"), Some("a\\b\"c"));
    }

    #[test]
    fn test_control_byte_escapes_become_placeholders() {
        let raw = block(br"INSERT INTO `t` (`s`) VALUES ('a\0b\Zc')");
        let records = parse_block(&raw, None).unwrap();
        assert_eq!(records[0].get_text("s"), Some("a_0b_Z_c"));
    }

    #[test]
    fn test_parens_and_null_inside_strings_survive() {
        let raw = block(b"INSERT INTO `t` (`s`,`n`) VALUES ('keep (this) and NULL',NULL)");
        let records = parse_block(&raw, None).unwrap();
        assert_eq!(records[0].get_text("s"), Some("keep (this) and NULL"));
        assert!(records[0].get("n").unwrap().is_null());
    }

    #[test]
    fn test_float_and_negative_literals() {
        let raw = block(b"INSERT INTO `t` (`a`,`b`) VALUES (-3,2.5)");
        let records = parse_block(&raw, None).unwrap();
        assert_eq!(records[0].get("a"), Some(&SqlValue::Integer(-3)));
        assert_eq!(records[0].get("b"), Some(&SqlValue::Float(2.5)));
    }

    #[test]
    fn test_schema_mismatch() {
        let raw = block(b"INSERT INTO `t` (`a`,`b`) VALUES (1,'x',99)");
        match parse_block(&raw, None) {
            Err(CoreError::SchemaMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_block_carries_offending_text() {
        let raw = block(b"INSERT INTO `t` (`a`) VALUES (1,");
        match parse_block(&raw, None) {
            Err(CoreError::MalformedRow { raw, rewritten, .. }) => {
                assert!(raw.contains("(1,"));
                assert!(rewritten.starts_with('['));
            }
            other => panic!("expected MalformedRow, got {:?}", other),
        }
    }

    #[test]
    fn test_table_columns_from_create_block() {
        let dump = b"CREATE TABLE `updated` (\n  `id` int(11) NOT NULL,\n  `sha256` varchar(64) DEFAULT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB;\n";
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(dump).unwrap();
        file.flush().unwrap();

        let scanner = Scanner::with_chunk_size(16);
        let columns = table_columns(&scanner, file.path(), "updated")
            .unwrap()
            .unwrap();
        assert_eq!(columns, vec!["id".to_string(), "sha256".to_string()]);
    }

    #[test]
    fn test_table_columns_missing_table() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"nothing here").unwrap();
        file.flush().unwrap();
        let scanner = Scanner::new();
        assert!(table_columns(&scanner, file.path(), "updated")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_dump_reader_end_to_end() {
        let dump = concat!(
            "CREATE TABLE `updated` (\n",
            "  `id` int(11) NOT NULL,\n",
            "  `sha256` varchar(64) DEFAULT NULL\n",
            ") ENGINE=InnoDB;\n",
            "INSERT INTO `updated` VALUES (1,'aa11'),(2,NULL);\n",
            "INSERT INTO `updated` VALUES (3,'bb22');\n",
        );
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(dump.as_bytes()).unwrap();
        file.flush().unwrap();

        let reader =
            DumpReader::new(file.path(), "updated").with_scanner(Scanner::with_chunk_size(32));
        let (records, errors) = reader.records().unwrap().collect_with_errors();
        assert!(errors.is_empty());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get_text("sha256"), Some("aa11"));
        assert!(records[1].get("sha256").unwrap().is_null());
        assert_eq!(records[2].get("id"), Some(&SqlValue::Integer(3)));
    }

    #[test]
    fn test_dump_reader_handles_crlf_dump() {
        // Dumps written on Windows terminate statements with `;\r\n`;
        // the reader derives the terminator from the dump itself.
        let dump = concat!(
            "INSERT INTO `t` (`a`,`b`) VALUES (1,'x');\r\n",
            "INSERT INTO `t` (`a`,`b`) VALUES (2,'y');\r\n",
        );
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(dump.as_bytes()).unwrap();
        file.flush().unwrap();

        let reader =
            DumpReader::new(file.path(), "t").with_scanner(Scanner::with_chunk_size(16));
        let (records, errors) = reader.records().unwrap().collect_with_errors();
        assert!(errors.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_text("b"), Some("x"));
        assert_eq!(records[1].get("a"), Some(&SqlValue::Integer(2)));
    }

    #[test]
    fn test_dump_reader_skips_bad_block_and_continues() {
        let dump = concat!(
            "INSERT INTO `t` (`a`) VALUES (1);\n",
            "INSERT INTO `t` (`a`) VALUES (oops;\n",
            "INSERT INTO `t` (`a`) VALUES (3);\n",
        );
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(dump.as_bytes()).unwrap();
        file.flush().unwrap();

        let reader = DumpReader::new(file.path(), "t");
        let (records, errors) = reader.records().unwrap().collect_with_errors();
        assert_eq!(records.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], CoreError::MalformedRow { .. }));
    }
}

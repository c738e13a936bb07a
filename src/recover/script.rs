//! SQL text rendering for reconstruction scripts.

use std::borrow::Cow;
use std::fmt::Write;

use super::pages::SqlValue;

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn render_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(v) => v.to_string(),
        SqlValue::Real(v) if v.is_nan() => "NULL".to_string(),
        SqlValue::Real(v) if v.is_infinite() => {
            let literal = if *v > 0.0 { "9e999" } else { "-9e999" };
            literal.to_string()
        }
        SqlValue::Real(v) => format!("{v:?}"),
        SqlValue::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) if !text.contains('\0') => format!("'{}'", text.replace('\'', "''")),
            _ => format!("CAST(X'{}' AS TEXT)", hex::encode_upper(bytes)),
        },
        SqlValue::Blob(bytes) => format!("X'{}'", hex::encode_upper(bytes)),
    }
}

/// Accumulates a transaction-wrapped script.
pub struct ScriptBuilder {
    out: String,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self {
            out: String::from("BEGIN;\n"),
        }
    }

    pub fn statement(&mut self, sql: &str) {
        self.out.push_str(sql.trim_end().trim_end_matches(';'));
        self.out.push_str(";\n");
    }

    pub fn insert_or_ignore(&mut self, table: &str, columns: &[String], values: &[String]) {
        let cols = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(
            self.out,
            "INSERT OR IGNORE INTO {}({}) VALUES({});",
            quote_ident(table),
            cols,
            values.join(",")
        );
    }

    pub fn finish(mut self) -> String {
        self.out.push_str("COMMIT;\n");
        self.out
    }
}

/// Drop `sqlite3` shell meta-commands (`.dbconfig ...` and friends) so the
/// script can be replayed through the SQL engine. A line only counts as a
/// meta-command when it starts outside a string literal.
pub fn strip_dot_commands(script: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(script.len());
    let mut in_literal = false;
    let mut dropped = false;
    for line in script.split_inclusive('\n') {
        if !in_literal && line.trim_start().starts_with('.') {
            dropped = true;
            continue;
        }
        if line.bytes().filter(|&b| b == b'\'').count() % 2 == 1 {
            in_literal = !in_literal;
        }
        out.push_str(line);
    }
    if dropped {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(script)
    }
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_literals() {
        assert_eq!(render_value(&SqlValue::Null), "NULL");
        assert_eq!(render_value(&SqlValue::Integer(-7)), "-7");
        assert_eq!(render_value(&SqlValue::Real(1.0)), "1.0");
        assert_eq!(render_value(&SqlValue::Real(f64::INFINITY)), "9e999");
        assert_eq!(render_value(&SqlValue::Text(b"it's".to_vec())), "'it''s'");
        assert_eq!(render_value(&SqlValue::Blob(vec![0xAB, 0x01])), "X'AB01'");
    }

    #[test]
    fn non_utf8_text_is_hex_cast() {
        assert_eq!(
            render_value(&SqlValue::Text(vec![0xFF, 0x00])),
            "CAST(X'FF00' AS TEXT)"
        );
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("moz_places"), "\"moz_places\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn builds_transaction() {
        let mut script = ScriptBuilder::new();
        script.statement("CREATE TABLE t(a, b);");
        script.insert_or_ignore(
            "t",
            &["a".to_string(), "b".to_string()],
            &["1".to_string(), "'x'".to_string()],
        );
        let sql = script.finish();
        assert_eq!(
            sql,
            "BEGIN;\nCREATE TABLE t(a, b);\nINSERT OR IGNORE INTO \"t\"(\"a\",\"b\") VALUES(1,'x');\nCOMMIT;\n"
        );
    }

    #[test]
    fn strips_shell_meta_commands() {
        let raw = ".dbconfig defensive off\nBEGIN;\nPRAGMA writable_schema = on;\n.print done\nCOMMIT;\n";
        assert_eq!(
            strip_dot_commands(raw),
            "BEGIN;\nPRAGMA writable_schema = on;\nCOMMIT;\n"
        );
    }

    #[test]
    fn keeps_dot_lines_inside_literals() {
        let raw = "INSERT INTO t VALUES('first\n.second');\n";
        assert!(matches!(strip_dot_commands(raw), Cow::Borrowed(_)));
        assert_eq!(strip_dot_commands(raw), raw);
    }
}

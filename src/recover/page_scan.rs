//! Native salvage pass over raw pages, no external tool required.
//!
//! Live cells are attributed to tables by walking each table b-tree from its
//! root page. Leaf cells on pages no tree reaches (freelist leaves, orphaned
//! pages) go to the only table with a matching column count, or to a
//! `lost_and_found` table when that is ambiguous.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use super::RawRecoverer;
use super::pages::{Cell, PageFile};
use super::script::{ScriptBuilder, quote_ident, render_value};
use crate::error::{ExtractError, Result};

const PAGE_TABLE_LEAF: u8 = 0x0D;

#[derive(Debug, Clone, Default)]
pub struct PageScanRecoverer;

impl PageScanRecoverer {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone)]
struct TableSchema {
    name: String,
    root: u32,
    sql: String,
    columns: Vec<String>,
    /// Index of the `INTEGER PRIMARY KEY` column, which aliases the rowid.
    ipk: Option<usize>,
    without_rowid: bool,
    internal: bool,
}

impl TableSchema {
    fn accepts_rows(&self) -> bool {
        !self.internal && !self.without_rowid
    }

    fn insert_target(&self, cell: &Cell) -> (Vec<String>, Vec<String>) {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        let mut values = Vec::with_capacity(self.columns.len() + 1);
        let rowid_shadowed = self
            .columns
            .iter()
            .any(|c| matches!(c.to_ascii_lowercase().as_str(), "rowid" | "_rowid_" | "oid"));
        if self.ipk.is_none() && !rowid_shadowed {
            columns.push("rowid".to_string());
            values.push(cell.rowid.to_string());
        }
        for (index, column) in self.columns.iter().enumerate() {
            columns.push(column.clone());
            if self.ipk == Some(index) {
                values.push(cell.rowid.to_string());
            } else {
                values.push(
                    cell.values
                        .get(index)
                        .map(render_value)
                        .unwrap_or_else(|| "NULL".to_string()),
                );
            }
        }
        (columns, values)
    }
}

impl RawRecoverer for PageScanRecoverer {
    fn name(&self) -> &str {
        "page-scan"
    }

    fn reconstruction_script(&self, db_path: &Path) -> Result<String> {
        let tables = match load_tables(db_path) {
            Ok(tables) => tables,
            Err(err) => {
                warn!(
                    "schema unreadable in {}: {err}; all rows go to lost_and_found",
                    db_path.display()
                );
                Vec::new()
            }
        };

        let mut pages = PageFile::open(db_path)
            .map_err(|e| {
                ExtractError::RecoveryTool(format!("page scan of {}: {e}", db_path.display()))
            })?
            .ok_or_else(|| {
                ExtractError::RecoveryTool(format!(
                    "{} is not a SQLite database",
                    db_path.display()
                ))
            })?;

        let mut owner: HashMap<u32, usize> = HashMap::new();
        let mut claimed: HashSet<u32> = HashSet::new();
        let schema_tree = pages.walk_table(1);
        claimed.extend(schema_tree.leaves);
        claimed.extend(schema_tree.overflow);
        for (index, table) in tables.iter().enumerate() {
            let tree = pages.walk_table(table.root);
            claimed.extend(tree.overflow);
            if table.internal {
                claimed.extend(tree.leaves);
                continue;
            }
            for leaf in tree.leaves {
                owner.entry(leaf).or_insert(index);
            }
        }

        let mut live: Vec<(usize, Cell)> = Vec::new();
        let mut orphans: Vec<Cell> = Vec::new();
        for pgno in 1..=pages.page_count() {
            if claimed.contains(&pgno) {
                continue;
            }
            let Some(page) = pages.read_page(pgno) else {
                continue;
            };
            if PageFile::page_type(&page, pgno) != Some(PAGE_TABLE_LEAF) {
                continue;
            }
            let cells = pages.leaf_cells(&page, pgno);
            match owner.get(&pgno) {
                Some(&index) => live.extend(cells.into_iter().map(|cell| (index, cell))),
                None => orphans.extend(cells),
            }
        }

        let mut script = ScriptBuilder::new();
        for table in tables.iter().filter(|t| !t.internal) {
            script.statement(&table.sql);
        }
        for (index, cell) in &live {
            let table = &tables[*index];
            let (columns, values) = table.insert_target(cell);
            script.insert_or_ignore(&table.name, &columns, &values);
        }

        let mut attributed = 0usize;
        let mut lost = Vec::new();
        for cell in orphans {
            let mut candidates = tables
                .iter()
                .filter(|t| t.accepts_rows() && t.columns.len() == cell.values.len());
            match (candidates.next(), candidates.next()) {
                (Some(table), None) => {
                    let (columns, values) = table.insert_target(&cell);
                    script.insert_or_ignore(&table.name, &columns, &values);
                    attributed += 1;
                }
                _ => lost.push(cell),
            }
        }
        if !lost.is_empty() {
            write_lost_and_found(&mut script, &tables, &lost);
        }

        debug!(
            "page scan of {}: {} live cells, {} orphans attributed, {} to lost_and_found",
            db_path.display(),
            live.len(),
            attributed,
            lost.len()
        );
        Ok(script.finish())
    }
}

fn write_lost_and_found(script: &mut ScriptBuilder, tables: &[TableSchema], lost: &[Cell]) {
    let mut name = "lost_and_found".to_string();
    let mut suffix = 0;
    while tables.iter().any(|t| t.name.eq_ignore_ascii_case(&name)) {
        name = format!("lost_and_found_{suffix}");
        suffix += 1;
    }

    let width = lost.iter().map(|c| c.values.len()).max().unwrap_or(0);
    let mut columns: Vec<String> = ["rootpgno", "pgno", "nfield", "id"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    columns.extend((0..width).map(|i| format!("c{i}")));
    script.statement(&format!(
        "CREATE TABLE {}({})",
        quote_ident(&name),
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    ));

    for cell in lost {
        let mut values = vec![
            "NULL".to_string(),
            cell.pgno.to_string(),
            cell.values.len().to_string(),
            cell.rowid.to_string(),
        ];
        values.extend(cell.values.iter().map(render_value));
        values.resize(columns.len(), "NULL".to_string());
        script.insert_or_ignore(&name, &columns, &values);
    }
}

fn load_tables(db_path: &Path) -> rusqlite::Result<Vec<TableSchema>> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut stmt = conn.prepare(
        "SELECT name, rootpage, sql FROM sqlite_master WHERE type='table' AND sql IS NOT NULL",
    )?;
    let entries = stmt
        .query_map([], |row| {
            let name: String = row.get(0)?;
            let root: i64 = row.get(1)?;
            let sql: String = row.get(2)?;
            Ok((name, root, sql))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut tables = Vec::new();
    for (name, root, sql) in entries {
        let upper = sql.to_ascii_uppercase();
        if upper.starts_with("CREATE VIRTUAL") {
            continue;
        }
        let Ok(root) = u32::try_from(root) else {
            continue;
        };
        if root == 0 {
            continue;
        }

        let mut info = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(&name)))?;
        let columns = info
            .query_map([], |row| {
                let column: String = row.get(1)?;
                let decl: Option<String> = row.get(2)?;
                let pk: i64 = row.get(5)?;
                Ok((column, decl.unwrap_or_default(), pk))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let without_rowid = upper
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .contains("WITHOUT ROWID");
        let pk_columns: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, (_, _, pk))| *pk > 0)
            .map(|(index, _)| index)
            .collect();
        let ipk = match pk_columns.as_slice() {
            [index] if !without_rowid && columns[*index].1.eq_ignore_ascii_case("INTEGER") => {
                Some(*index)
            }
            _ => None,
        };

        tables.push(TableSchema {
            internal: name.to_ascii_lowercase().starts_with("sqlite_"),
            name,
            root,
            sql,
            columns: columns.into_iter().map(|(column, _, _)| column).collect(),
            ipk,
            without_rowid,
        });
    }

    Ok(tables)
}

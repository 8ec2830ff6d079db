use futures::TryStreamExt;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::types::{AppError, AppResult};

/// Outcome of a free-form query, already rendered for the agent
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub truncated: bool,
}

impl QueryOutput {
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return "(no rows)".to_string();
        }

        let mut out = self.columns.join(" | ");
        for row in &self.rows {
            out.push('\n');
            out.push_str(&row.join(" | "));
        }
        if self.truncated {
            out.push_str(&format!("\n(showing first {} rows)", self.rows.len()));
        }
        out
    }
}

pub struct DatabaseOperations;

impl DatabaseOperations {
    /// User-visible tables and views, sorted by name
    pub async fn list_tables(pool: &SqlitePool) -> AppResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT name FROM sqlite_master
            WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(names)
    }

    /// `CREATE` statement plus a few sample rows for each requested table
    pub async fn table_info(
        pool: &SqlitePool,
        tables: &[String],
        sample_rows: usize,
    ) -> AppResult<String> {
        let known = Self::list_tables(pool).await?;
        let missing: Vec<&String> = tables.iter().filter(|t| !known.contains(t)).collect();
        if !missing.is_empty() {
            return Err(AppError::InvalidRequest(format!(
                "table_names {:?} not found in database",
                missing
            )));
        }

        let mut sections = Vec::with_capacity(tables.len());
        for table in tables {
            let create = sqlx::query_scalar::<_, Option<String>>(
                "SELECT sql FROM sqlite_master WHERE name = ?",
            )
            .bind(table)
            .fetch_optional(pool)
            .await?
            .flatten();

            let mut section = create.unwrap_or_default();
            if sample_rows > 0 {
                let sample = Self::run_query(
                    pool,
                    &format!("SELECT * FROM {} LIMIT {}", quote_ident(table), sample_rows),
                    sample_rows,
                )
                .await?;
                section.push_str(&format!(
                    "\n\n/*\n{} rows from {} table:\n{}\n*/",
                    sample.rows.len(),
                    table,
                    sample.render()
                ));
            }
            sections.push(section);
        }

        Ok(sections.join("\n\n"))
    }

    /// Run arbitrary SQL and collect at most `max_rows` rows as text
    pub async fn run_query(pool: &SqlitePool, sql: &str, max_rows: usize) -> AppResult<QueryOutput> {
        let mut stream = sqlx::query(sql).fetch(pool);
        let mut columns = Vec::new();
        let mut rows = Vec::new();
        let mut truncated = false;

        while let Some(row) = stream.try_next().await? {
            if rows.len() >= max_rows {
                truncated = true;
                break;
            }
            if columns.is_empty() {
                columns = row.columns().iter().map(|c| c.name().to_string()).collect();
            }
            rows.push((0..row.len()).map(|i| render_value(&row, i)).collect());
        }

        Ok(QueryOutput {
            columns,
            rows,
            truncated,
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn render_value(row: &SqliteRow, index: usize) -> String {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return "NULL".to_string(),
        Ok(raw) => raw.type_info().name().to_string(),
        Err(e) => return format!("<{}>", e),
    };

    let rendered = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get_unchecked::<i64, _>(index).map(|v| v.to_string()),
        "REAL" | "NUMERIC" => row.try_get_unchecked::<f64, _>(index).map(|v| v.to_string()),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|v| format!("<{} bytes>", v.len())),
        _ => row.try_get_unchecked::<String, _>(index),
    };

    rendered.unwrap_or_else(|_| "<unreadable>".to_string())
}

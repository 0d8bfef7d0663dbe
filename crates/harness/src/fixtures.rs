//! Loading newline-delimited JSON fixtures into tables.

use std::path::Path;

use tokio_postgres::types::ToSql;
use tracing::{debug, info, instrument};

use crate::error::{HarnessError, HarnessResult};
use crate::jsonpath::JsonPathExtractor;
use crate::query::QueryHelper;

const COLUMNS_QUERY: &str = "SELECT column_name::text, format('%I.%I', udt_schema, udt_name) \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

/// Insert one row per line of `json_file` into `schema.table`.
///
/// Each line is a JSON document; `jsonpaths_file` lists one JSON-path
/// expression per column, in column order. Both paths are relative to
/// `project_dir`. Every value is sent as text and cast to its column's type,
/// so `"42"` and `42` load the same into an integer column. All rows are
/// inserted in one transaction; returns the number of rows inserted.
#[instrument(skip(helper, project_dir), fields(project = %project_dir.display()))]
pub async fn copy_json(
    helper: &QueryHelper,
    project_dir: &Path,
    schema: &str,
    table: &str,
    json_file: &Path,
    jsonpaths_file: &Path,
) -> HarnessResult<u64> {
    let extractor = JsonPathExtractor::from_file(&project_dir.join(jsonpaths_file))?;
    let data_path = project_dir.join(json_file);
    let data = std::fs::read_to_string(&data_path).map_err(|err| HarnessError::Io {
        message: format!("cannot read JSON data file {}: {err}", data_path.display()),
        source: Some(err),
    })?;

    let schema = schema.to_string();
    let table = table.to_string();
    let inserted = helper
        .run(move |tx| {
            Box::pin(async move {
                let columns = tx.query(COLUMNS_QUERY, &[&schema, &table]).await?;
                if columns.is_empty() {
                    return Err(HarnessError::Value(format!(
                        "Seems there is no table {schema}.{table}"
                    )));
                }
                let names: Vec<String> = columns.iter().map(|row| row.get(0)).collect();
                let types: Vec<String> = columns.iter().map(|row| row.get(1)).collect();
                debug!(?names, ?types, "column order");

                if names.len() != extractor.len() {
                    return Err(HarnessError::Value(format!(
                        "{schema}.{table} has {} columns but {} JSON paths were given",
                        names.len(),
                        extractor.len()
                    )));
                }

                let statement = tx
                    .prepare(&insert_statement(&schema, &table, &types))
                    .await?;
                let mut inserted = 0;
                for line in data.lines().filter(|line| !line.trim().is_empty()) {
                    let values = extractor.extract(line)?;
                    let params: Vec<&(dyn ToSql + Sync)> = values
                        .iter()
                        .map(|value| value as &(dyn ToSql + Sync))
                        .collect();
                    inserted += tx.execute(&statement, &params).await?;
                }
                Ok(inserted)
            })
        })
        .await?;

    info!(rows = inserted, "fixture loaded");
    Ok(inserted)
}

/// `INSERT INTO "schema"."table" VALUES ($1::text::type1, ...)`.
///
/// `types` must already be valid, quoted type names.
pub fn insert_statement(schema: &str, table: &str, types: &[String]) -> String {
    let placeholders = types
        .iter()
        .enumerate()
        .map(|(i, ty)| format!("${}::text::{ty}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {}.{} VALUES ({placeholders})",
        quote_ident(schema),
        quote_ident(table)
    )
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

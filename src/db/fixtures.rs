//! Test graph builders. Every helper is idempotent (`INSERT OR IGNORE`) and
//! creates the nodes an edge needs before the edge itself.

use rusqlite::{params, Connection};
use std::path::Path;
use tempfile::TempDir;
use crate::db::{migrate, Db};
use crate::error::Result;

/// Fresh on-disk store with the real schema applied.
pub async fn graph() -> (Db, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::new(temp_dir.path().join("ubkg.db"));
    db.with_connection(|conn| {
        migrate::run_migrations(conn, &Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))?;
        Ok(())
    })
    .await
    .unwrap();
    (db, temp_dir)
}

pub fn concept(conn: &Connection, cui: &str, prefterm: Option<&str>) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO concepts (cui) VALUES (?1)", [cui])?;
    if let Some(name) = prefterm {
        conn.execute(
            "INSERT OR IGNORE INTO concept_terms (cui, name) VALUES (?1, ?2)",
            params![cui, name],
        )?;
    }
    Ok(())
}

/// Attach code `<sab> <code>` to a concept; returns the code id.
pub fn code(conn: &Connection, cui: &str, sab: &str, code: &str) -> Result<String> {
    concept(conn, cui, None)?;
    let code_id = format!("{} {}", sab, code);
    conn.execute(
        "INSERT OR IGNORE INTO codes (code_id, sab, code) VALUES (?1, ?2, ?3)",
        params![code_id, sab, code],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO concept_codes (cui, code_id) VALUES (?1, ?2)",
        params![cui, code_id],
    )?;
    Ok(code_id)
}

pub fn code_term(conn: &Connection, cui: &str, code_id: &str, tty: &str, name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO code_terms (code_id, tty, name, cui) VALUES (?1, ?2, ?3, ?4)",
        params![code_id, tty, name, cui],
    )?;
    Ok(())
}

pub fn relate(conn: &Connection, start: &str, end: &str, rel: &str, sab: &str) -> Result<()> {
    concept(conn, start, None)?;
    concept(conn, end, None)?;
    conn.execute(
        "INSERT OR IGNORE INTO relationships (start_cui, end_cui, type, sab) VALUES (?1, ?2, ?3, ?4)",
        params![start, end, rel, sab],
    )?;
    Ok(())
}

pub fn definition(conn: &Connection, cui: &str, sab: &str, def: &str) -> Result<()> {
    concept(conn, cui, None)?;
    conn.execute(
        "INSERT INTO definitions (cui, sab, def) VALUES (?1, ?2, ?3)",
        params![cui, sab, def],
    )?;
    Ok(())
}

pub fn semantic(conn: &Connection, tui: &str, stn: &str, name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO semantics (tui, stn, name) VALUES (?1, ?2, ?3)",
        params![tui, stn, name],
    )?;
    Ok(())
}

pub fn concept_semantic(conn: &Connection, cui: &str, tui: &str) -> Result<()> {
    concept(conn, cui, None)?;
    conn.execute(
        "INSERT OR IGNORE INTO concept_semantics (cui, tui) VALUES (?1, ?2)",
        params![cui, tui],
    )?;
    Ok(())
}

pub fn semantic_isa(conn: &Connection, tui: &str, parent_tui: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO semantic_isa (tui, parent_tui) VALUES (?1, ?2)",
        params![tui, parent_tui],
    )?;
    Ok(())
}

/// Code with a `PT` term, the shape property lookups against code allow-lists expect.
fn coded_concept(conn: &Connection, cui: &str, sab: &str, code_value: &str, term: &str) -> Result<()> {
    let code_id = code(conn, cui, sab, code_value)?;
    code_term(conn, cui, &code_id, "PT", term)
}

/// Two data types under the `<context> C004001` root:
///
/// * `AF` (dataset `DS_AF`): primary, provided by `<context> IEC`, one
///   synonym, two vitessce hints (one carrying the `_vitessce_hint` suffix).
/// * `bulk-RNA` (dataset `DS_RNA`): derived, external provider, vis-only,
///   contains PII, no synonyms, no hints.
pub fn dataset_graph(conn: &Connection, context: &str) -> Result<()> {
    coded_concept(conn, "ROOT", context, "C004001", "Dataset Data Type")?;
    coded_concept(conn, "PRIMARY", context, "C004003", "Primary Dataset")?;
    coded_concept(conn, "DERIVED", context, "C004004", "Derived Dataset")?;
    coded_concept(conn, "VISONLY", context, "C004008", "Visualization Only")?;
    coded_concept(conn, "PII", context, "C004009", "Personally Identifiable Information")?;

    concept(conn, "DT_AF", Some("AF"))?;
    concept(conn, "DT_RNA", Some("bulk-RNA"))?;
    relate(conn, "DT_AF", "ROOT", "isa", context)?;
    relate(conn, "DT_RNA", "ROOT", "isa", context)?;

    let af_code = code(conn, "DT_AF", context, "C000101")?;
    code_term(conn, "DT_AF", &af_code, "PT", "AF")?;
    code_term(conn, "DT_AF", &af_code, "SY", "Autofluorescence")?;

    concept(conn, "HINT_IMAGE", Some("is_image_vitessce_hint"))?;
    concept(conn, "HINT_TILED", Some("is_tiled"))?;
    relate(conn, "DT_AF", "HINT_IMAGE", "has_vitessce_hint", context)?;
    relate(conn, "DT_AF", "HINT_TILED", "has_vitessce_hint", context)?;

    let iec = format!("{} IEC", context);
    concept(conn, "PROV_IEC", Some(&iec))?;
    concept(conn, "PROV_EXT", Some("External Provider"))?;

    concept(conn, "NAME_AF", Some("Autofluorescence Microscopy"))?;
    relate(conn, "DS_AF", "DT_AF", "has_data_type", context)?;
    relate(conn, "DS_AF", "NAME_AF", "has_display_name", context)?;
    relate(conn, "DS_AF", "PRIMARY", "isa", context)?;
    relate(conn, "DS_AF", "PROV_IEC", "provided_by", context)?;

    concept(conn, "NAME_RNA", Some("Bulk RNA-seq"))?;
    relate(conn, "DS_RNA", "DT_RNA", "has_data_type", context)?;
    relate(conn, "DS_RNA", "NAME_RNA", "has_display_name", context)?;
    relate(conn, "DS_RNA", "DERIVED", "isa", context)?;
    relate(conn, "DS_RNA", "VISONLY", "isa", context)?;
    relate(conn, "DS_RNA", "PROV_EXT", "provided_by", context)?;
    relate(conn, "DS_RNA", "PII", "contains", context)?;

    Ok(())
}

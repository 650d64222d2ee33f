use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use crate::error::{Result, UbkgError};

/// Tables every graph store must carry before queries are composed against it.
pub const REQUIRED_TABLES: &[&str] = &[
    "concepts",
    "codes",
    "concept_codes",
    "concept_terms",
    "code_terms",
    "definitions",
    "semantics",
    "concept_semantics",
    "semantic_isa",
    "relationships",
];

struct Migration {
    version: u32,
    name: String,
    sql: String,
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Names of the migrations already recorded, oldest first
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

fn parse_version(filename: &str) -> Result<u32> {
    let prefix = filename
        .split('_')
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| UbkgError::Config(format!("Invalid migration filename: {}", filename)))?;
    prefix
        .parse()
        .map_err(|_| UbkgError::Config(format!("Invalid migration version: {}", prefix)))
}

fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut files: Vec<_> = fs::read_dir(migrations_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    files.sort();

    let mut migrations = Vec::with_capacity(files.len());
    for path in files {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UbkgError::Config("Invalid migration filename".to_string()))?;
        migrations.push(Migration {
            version: parse_version(filename)?,
            name: filename.trim_end_matches(".sql").to_string(),
            sql: fs::read_to_string(&path)?,
        });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// Apply every pending migration in `migrations_dir`, one transaction each.
///
/// Returns the names of the migrations applied by this call.
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<Vec<String>> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_migrations(conn)?;
    let mut newly_applied = Vec::new();

    for migration in load_migrations(migrations_dir)? {
        if applied.contains(&migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            UbkgError::Config(format!("Failed to execute migration {}: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;

        newly_applied.push(migration.name);
    }

    log::info!("Schema up to date ({} migrations applied)", newly_applied.len());
    Ok(newly_applied)
}

/// Required tables absent from the store. Empty means the schema is usable.
pub fn missing_tables(conn: &Connection) -> Result<Vec<&'static str>> {
    let mut stmt =
        conn.prepare_cached("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        if !stmt.exists([table])? {
            missing.push(*table);
        }
    }
    Ok(missing)
}

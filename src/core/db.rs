use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, error::TidelogError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(error::TidelogError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::TidelogError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::TidelogError::RusqliteError)?;
    Ok(conn)
}

pub fn tidelog_db_path(root: &Path) -> PathBuf {
    root.join(schemas::TIDELOG_DB_NAME)
}

pub fn initialize_db(root: &Path) -> Result<(), error::TidelogError> {
    let db_path = tidelog_db_path(root);
    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).map_err(error::TidelogError::IoError)?;
    }

    let broker = DbBroker::new(root);
    broker.with_conn(&db_path, "tidelog", "db.init", |conn| {
        for table in schemas::ALL_TABLES {
            conn.execute(table, [])?;
        }
        Ok(())
    })?;
    Ok(())
}

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS unit_preferences (
    account TEXT PRIMARY KEY,
    raw_units TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#,
)];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPreferenceRecord {
    pub account: String,
    pub raw_units: String,
    pub updated_at: String,
}

pub fn save_unit_preferences(
    connection: &Connection,
    record: &UnitPreferenceRecord,
) -> Result<(), DbError> {
    connection.execute(
        "INSERT INTO unit_preferences (account, raw_units, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(account) DO UPDATE SET raw_units = excluded.raw_units, updated_at = excluded.updated_at",
        params![record.account, record.raw_units, record.updated_at],
    )?;

    Ok(())
}

pub fn load_unit_preferences(
    connection: &Connection,
    account: &str,
) -> Result<Option<UnitPreferenceRecord>, DbError> {
    let record = connection
        .query_row(
            "SELECT account, raw_units, updated_at FROM unit_preferences WHERE account = ?1",
            params![account],
            |row| {
                Ok(UnitPreferenceRecord {
                    account: row.get(0)?,
                    raw_units: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(record)
}

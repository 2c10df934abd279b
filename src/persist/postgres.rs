/// PostgreSQL record store.
///
/// Records go into `radar_monitoring.runs` (see `sql/001_radar_monitoring.sql`)
/// as a JSONB document plus a few indexed columns. The table is append-only:
/// this module only ever inserts.
///
/// A new connection is opened per insert. Runs happen minutes apart, so a
/// pool would sit idle between them.

use super::{RecordId, RecordStore};
use crate::model::PersistenceError;
use crate::persist::record::PersistedRecord;
use postgres::{Client, NoTls};

const INSERT_RUN: &str = "
    INSERT INTO radar_monitoring.runs
        (radar_station, created_at, is_alert, alert_count, document)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id
";

pub struct PostgresStore {
    database_url: Option<String>,
}

impl PostgresStore {
    /// `None` yields a store whose every insert fails with `NotConfigured`,
    /// so the service can still run (and report) without a database.
    pub fn new(database_url: Option<String>) -> Self {
        Self { database_url }
    }

    pub fn is_configured(&self) -> bool {
        self.database_url.is_some()
    }

    fn connect(&self) -> Result<Client, PersistenceError> {
        let url = self
            .database_url
            .as_deref()
            .ok_or(PersistenceError::NotConfigured)?;
        Client::connect(url, NoTls).map_err(|e| PersistenceError::Connect(e.to_string()))
    }
}

impl RecordStore for PostgresStore {
    fn insert(&self, record: &PersistedRecord) -> Result<RecordId, PersistenceError> {
        let document =
            serde_json::to_value(record).map_err(|e| PersistenceError::Write(e.to_string()))?;
        let alert_count = i32::try_from(record.metadata.alert_count).unwrap_or(i32::MAX);

        let mut client = self.connect()?;
        let row = client
            .query_one(
                INSERT_RUN,
                &[
                    &record.radar_station,
                    &record.created_at,
                    &record.is_alert,
                    &alert_count,
                    &document,
                ],
            )
            .map_err(|e| PersistenceError::Write(e.to_string()))?;

        Ok(row.get::<_, i64>(0))
    }
}

/// Connects and checks that every schema in `schemas` exists.
///
/// Returns a readable setup hint when a schema is missing, which is the
/// usual failure on a fresh database.
pub fn connect_and_verify(database_url: &str, schemas: &[&str]) -> Result<Client, PersistenceError> {
    let mut client =
        Client::connect(database_url, NoTls).map_err(|e| PersistenceError::Connect(e.to_string()))?;

    for schema in schemas {
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
                &[schema],
            )
            .map_err(|e| PersistenceError::Connect(e.to_string()))?;
        let exists: bool = row.get(0);
        if !exists {
            return Err(PersistenceError::Connect(format!(
                "schema '{}' is missing; apply sql/001_radar_monitoring.sql",
                schema
            )));
        }
    }

    Ok(client)
}

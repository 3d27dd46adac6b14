use crate::error::StoreError;
use crate::types::PlateRecord;
use log::{info, warn};
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CREATE_PLATES: &str = "CREATE TABLE IF NOT EXISTS plates (
    license_plate TEXT NOT NULL PRIMARY KEY,
    plate_confidence REAL NOT NULL,
    time REAL NOT NULL,
    make TEXT NOT NULL,
    make_confidence REAL NOT NULL,
    model TEXT NOT NULL,
    model_confidence REAL NOT NULL,
    colour TEXT NOT NULL,
    colour_confidence REAL NOT NULL,
    website_make TEXT,
    website_model TEXT,
    website_colour TEXT
) WITHOUT ROWID";

const PLATE_COLUMNS: [&str; 12] = [
    "license_plate",
    "plate_confidence",
    "time",
    "make",
    "make_confidence",
    "model",
    "model_confidence",
    "colour",
    "colour_confidence",
    "website_make",
    "website_model",
    "website_colour",
];

/// Append-only table of every unique plate seen, keyed by plate text.
pub struct PlateStore {
    conn: Mutex<Connection>,
}

impl PlateStore {
    /// Opens (or creates) the store at `path`. With `reset` the plates table
    /// is dropped first; otherwise existing rows are kept and runs append.
    pub fn open<P: AsRef<Path>>(path: P, reset: bool) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn, reset)
    }

    fn init(conn: Connection, reset: bool) -> Result<Self, StoreError> {
        if reset {
            warn!("Dropping plates table");
            conn.execute("DROP TABLE IF EXISTS plates", [])?;
        }
        conn.execute(CREATE_PLATES, [])?;
        check_columns(&conn)?;
        Ok(PlateStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Every write is a single statement, so a poisoned connection is still consistent.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn exists(&self, plate: &str) -> Result<bool, StoreError> {
        let conn = self.lock();
        let found = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM plates WHERE license_plate = ?1)",
            [plate],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Inserts a new row; fails with `DuplicateKey` if the plate is already stored.
    pub fn insert(&self, record: &PlateRecord) -> Result<(), StoreError> {
        let d = &record.detection;
        let registry = record.registry.as_ref();
        let result = self.lock().execute(
            "INSERT INTO plates (license_plate, plate_confidence, time, make, make_confidence,
                model, model_confidence, colour, colour_confidence,
                website_make, website_model, website_colour)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                d.plate,
                d.plate_confidence,
                d.processing_time_ms,
                d.make,
                d.make_confidence,
                d.model,
                d.model_confidence,
                d.colour,
                d.colour_confidence,
                registry.map(|r| r.make.as_str()),
                registry.map(|r| r.model.as_str()),
                registry.map(|r| r.colour.as_str()),
            ],
        );
        match result {
            Ok(_) => {
                info!("Stored plate {}", d.plate);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateKey(d.plate.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM plates", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// `CREATE TABLE IF NOT EXISTS` leaves an older plates table untouched, so its
/// columns are compared before any run writes to it.
fn check_columns(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('plates') ORDER BY cid")?;
    let found = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if found != PLATE_COLUMNS {
        return Err(StoreError::Schema { found });
    }
    Ok(())
}

// Read-back helpers; the pipeline itself only ever checks for existence.
#[cfg(test)]
impl PlateStore {
    const SELECT_PLATES: &'static str = "SELECT license_plate, plate_confidence, time, make,
        make_confidence, model, model_confidence, colour, colour_confidence,
        website_make, website_model, website_colour FROM plates";

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, false)
    }

    pub fn get(&self, plate: &str) -> Result<Option<PlateRecord>, StoreError> {
        use rusqlite::OptionalExtension;
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{} WHERE license_plate = ?1", Self::SELECT_PLATES))?;
        Ok(stmt.query_row([plate], Self::read_record).optional()?)
    }

    pub fn records(&self) -> Result<Vec<PlateRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{} ORDER BY license_plate", Self::SELECT_PLATES))?;
        let rows = stmt.query_map([], Self::read_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlateRecord> {
        use crate::types::{Detection, RegistryColour, RegistryRecord, UNKNOWN_COLOUR};
        let website_make: Option<String> = row.get(9)?;
        let website_model: Option<String> = row.get(10)?;
        let website_colour: Option<String> = row.get(11)?;
        let registry = match (website_make, website_model) {
            (Some(make), Some(model)) => Some(RegistryRecord {
                make,
                model,
                colour: match website_colour {
                    Some(colour) if colour != UNKNOWN_COLOUR => RegistryColour::Known(colour),
                    _ => RegistryColour::Unknown,
                },
            }),
            _ => None,
        };
        Ok(PlateRecord {
            detection: Detection {
                plate: row.get(0)?,
                plate_confidence: row.get(1)?,
                processing_time_ms: row.get(2)?,
                make: row.get(3)?,
                make_confidence: row.get(4)?,
                model: row.get(5)?,
                model_confidence: row.get(6)?,
                colour: row.get(7)?,
                colour_confidence: row.get(8)?,
            },
            registry,
        })
    }
}

//! Storage layer for logbook.
//!
//! This module provides `SQLite`-based persistent storage for planes,
//! flights, non-flying events and records, with the get-or-create and upsert
//! operations the import pipeline relies on.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Flight, FlightTimes, NonFlight, NonFlightKind, Plane, Records, UserId};

const DATE_FORMAT: &str = "%Y-%m-%d";

const PLANE_COLUMNS: &str =
    "id, user_id, tailnumber, type, manufacturer, model, cat_class, tags";

/// Storage engine for logbook data.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin a transaction on the shared connection.
    ///
    /// Every write made through this `Storage` while the returned guard is
    /// alive belongs to the transaction. Dropping the guard without calling
    /// `commit` rolls everything back.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        Ok(self.conn.execute_batch(sql)?)
    }

    // === Users ===

    /// Return the id of the user called `name`, creating the user if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn ensure_user(&self, name: &str) -> Result<UserId> {
        self.conn.execute(
            "INSERT OR IGNORE INTO users (name) VALUES (?1)",
            [name],
        )?;
        let id: i64 =
            self.conn
                .query_row("SELECT id FROM users WHERE name = ?1", [name], |row| row.get(0))?;
        Ok(UserId(id))
    }

    /// Look up an existing user by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_user(&self, name: &str) -> Result<Option<UserId>> {
        let id = self
            .conn
            .query_row("SELECT id FROM users WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id.map(UserId))
    }

    // === Planes ===

    /// Find a plane by tail number (and type, when given), creating it if
    /// none exists.
    ///
    /// When several planes match, the oldest one wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_or_create_plane(
        &self,
        user: UserId,
        tailnumber: &str,
        plane_type: Option<&str>,
    ) -> Result<Plane> {
        let existing = match plane_type {
            Some(plane_type) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {PLANE_COLUMNS} FROM planes
                         WHERE user_id = ?1 AND tailnumber = ?2 AND type = ?3
                         ORDER BY id LIMIT 1"
                    ),
                    params![user.0, tailnumber, plane_type],
                    Self::row_to_plane,
                )
                .optional()?,
            None => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {PLANE_COLUMNS} FROM planes
                         WHERE user_id = ?1 AND tailnumber = ?2
                         ORDER BY id LIMIT 1"
                    ),
                    params![user.0, tailnumber],
                    Self::row_to_plane,
                )
                .optional()?,
        };

        if let Some(plane) = existing {
            return Ok(plane);
        }

        let plane_type = plane_type.unwrap_or_default();
        self.conn.execute(
            "INSERT INTO planes (user_id, tailnumber, type) VALUES (?1, ?2, ?3)",
            params![user.0, tailnumber, plane_type],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Created plane {} ({}) with id {}", tailnumber, plane_type, id);

        Ok(Plane {
            id,
            user,
            tailnumber: tailnumber.to_string(),
            plane_type: plane_type.to_string(),
            manufacturer: String::new(),
            model: String::new(),
            cat_class: String::new(),
            tags: String::new(),
        })
    }

    /// The plane that flights with no tail number are filed under.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn unknown_plane(&self, user: UserId, sentinel: &str) -> Result<Plane> {
        self.find_or_create_plane(user, sentinel, None)
    }

    /// Overwrite the stored fields of an existing plane.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the plane no
    /// longer exists.
    pub fn update_plane(&self, plane: &Plane) -> Result<()> {
        let affected = self.conn.execute(
            r"
            UPDATE planes
            SET tailnumber = ?2, type = ?3, manufacturer = ?4, model = ?5,
                cat_class = ?6, tags = ?7
            WHERE id = ?1
            ",
            params![
                plane.id,
                plane.tailnumber,
                plane.plane_type,
                plane.manufacturer,
                plane.model,
                plane.cat_class,
                plane.tags,
            ],
        )?;
        if affected == 0 {
            return Err(Error::internal(format!("plane {} does not exist", plane.id)));
        }
        Ok(())
    }

    /// All planes of a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn planes(&self, user: UserId) -> Result<Vec<Plane>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLANE_COLUMNS} FROM planes WHERE user_id = ?1 ORDER BY id"
        ))?;
        let planes = stmt
            .query_map([user.0], Self::row_to_plane)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(planes)
    }

    // === Flights ===

    /// Insert a flight and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_flight(&self, flight: &Flight) -> Result<i64> {
        let t = &flight.times;
        self.conn.execute(
            r"
            INSERT INTO flights (
                user_id, plane_id, date, route,
                total, pic, sic, solo, dual_r, dual_g, xc, act_inst, sim_inst, night,
                day_l, night_l, app, person, flight_number, remarks
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20)
            ",
            params![
                flight.user.0,
                flight.plane_id,
                flight.date.format(DATE_FORMAT).to_string(),
                flight.route,
                t.total,
                t.pic,
                t.sic,
                t.solo,
                t.dual_r,
                t.dual_g,
                t.xc,
                t.act_inst,
                t.sim_inst,
                t.night,
                flight.day_l,
                flight.night_l,
                flight.app,
                flight.person,
                flight.flight_number,
                flight.remarks,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted flight with id {}", id);
        Ok(id)
    }

    /// All flights of a user in date order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn flights(&self, user: UserId) -> Result<Vec<Flight>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT * FROM flights WHERE user_id = ?1 ORDER BY date, id
            ",
        )?;
        let flights = stmt
            .query_map([user.0], Self::row_to_flight)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(flights)
    }

    // === Non-flying events ===

    /// Insert a non-flying event and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_non_flight(&self, event: &NonFlight) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO non_flights (user_id, date, kind, remarks) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.user.0,
                event.date.format(DATE_FORMAT).to_string(),
                event.kind.code(),
                event.remarks,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All non-flying events of a user in date order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn non_flights(&self, user: UserId) -> Result<Vec<NonFlight>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, date, kind, remarks FROM non_flights
             WHERE user_id = ?1 ORDER BY date, id",
        )?;
        let events = stmt
            .query_map([user.0], |row| {
                let code: u8 = row.get("kind")?;
                let kind = NonFlightKind::from_code(code).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        Type::Integer,
                        format!("unknown event code {code}").into(),
                    )
                })?;
                Ok(NonFlight {
                    id: Some(row.get("id")?),
                    user: UserId(row.get("user_id")?),
                    date: Self::parse_date(row, 2)?,
                    kind,
                    remarks: row.get("remarks")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // === Records ===

    /// Replace the user's records text, creating the row on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_records(&self, user: UserId, text: &str) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO records (user_id, text) VALUES (?1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET text = excluded.text,
                updated_at = datetime('now')
            ",
            params![user.0, text],
        )?;
        Ok(())
    }

    /// The user's records text, if any has been saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn records(&self, user: UserId) -> Result<Option<Records>> {
        let text: Option<String> = self
            .conn
            .query_row(
                "SELECT text FROM records WHERE user_id = ?1",
                [user.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text.map(|text| Records { user, text }))
    }

    // === Statistics ===

    /// Row counts and totals, for one user or the whole database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self, user: Option<UserId>) -> Result<StorageStats> {
        let filter = user.map(|u| u.0);
        let count = |table: &str| -> Result<i64> {
            Ok(self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE ?1 IS NULL OR user_id = ?1"),
                [filter],
                |row| row.get(0),
            )?)
        };

        let users: i64 = match user {
            Some(_) => 1,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?,
        };

        let total_hours: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(total), 0.0) FROM flights WHERE ?1 IS NULL OR user_id = ?1",
            [filter],
            |row| row.get(0),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            users,
            planes: count("planes")?,
            flights: count("flights")?,
            non_flights: count("non_flights")?,
            total_hours,
            db_size_bytes,
        })
    }

    fn parse_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let raw: String = row.get(idx)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn row_to_plane(row: &rusqlite::Row) -> rusqlite::Result<Plane> {
        Ok(Plane {
            id: row.get(0)?,
            user: UserId(row.get(1)?),
            tailnumber: row.get(2)?,
            plane_type: row.get(3)?,
            manufacturer: row.get(4)?,
            model: row.get(5)?,
            cat_class: row.get(6)?,
            tags: row.get(7)?,
        })
    }

    fn row_to_flight(row: &rusqlite::Row) -> rusqlite::Result<Flight> {
        let date_idx = row.as_ref().column_index("date")?;
        let mut times = FlightTimes::default();
        for column in FlightTimes::COLUMNS {
            times.set(column, row.get(column)?);
        }

        Ok(Flight {
            id: Some(row.get("id")?),
            user: UserId(row.get("user_id")?),
            plane_id: row.get("plane_id")?,
            date: Self::parse_date(row, date_idx)?,
            route: row.get("route")?,
            times,
            day_l: row.get("day_l")?,
            night_l: row.get("night_l")?,
            app: row.get("app")?,
            person: row.get("person")?,
            flight_number: row.get("flight_number")?,
            remarks: row.get("remarks")?,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StorageStats {
    /// Number of users covered.
    pub users: i64,
    /// Number of planes.
    pub planes: i64,
    /// Number of flights.
    pub flights: i64,
    /// Number of non-flying events.
    pub non_flights: i64,
    /// Sum of total time over all flights.
    pub total_hours: f64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

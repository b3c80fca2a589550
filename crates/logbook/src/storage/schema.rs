//! `SQLite` schema definitions for logbook.

/// Users that own logbook rows.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Planes. `(user_id, tailnumber, type)` is deliberately not unique: older
/// logbooks can hold duplicates, and lookups take the lowest id.
pub const CREATE_PLANES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS planes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    tailnumber TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT '',
    manufacturer TEXT NOT NULL DEFAULT '',
    model TEXT NOT NULL DEFAULT '',
    cat_class TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Lookup index for plane get-or-create.
pub const CREATE_PLANE_LOOKUP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_planes_lookup ON planes(user_id, tailnumber, type)
";

/// Flights.
pub const CREATE_FLIGHTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS flights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    plane_id INTEGER NOT NULL REFERENCES planes(id),
    date TEXT NOT NULL,
    route TEXT NOT NULL DEFAULT '',
    total REAL,
    pic REAL,
    sic REAL,
    solo REAL,
    dual_r REAL,
    dual_g REAL,
    xc REAL,
    act_inst REAL,
    sim_inst REAL,
    night REAL,
    day_l INTEGER,
    night_l INTEGER,
    app INTEGER,
    person TEXT NOT NULL DEFAULT '',
    flight_number TEXT NOT NULL DEFAULT '',
    remarks TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Flights are listed per user by date.
pub const CREATE_FLIGHT_DATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_flights_user_date ON flights(user_id, date)
";

/// Non-flying events. `kind` holds the numeric event code.
pub const CREATE_NON_FLIGHTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS non_flights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    date TEXT NOT NULL,
    kind INTEGER NOT NULL,
    remarks TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// One records blob per user.
pub const CREATE_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS records (
    user_id INTEGER PRIMARY KEY REFERENCES users(id),
    text TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Key-value pairs, including the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_PLANES_TABLE,
    CREATE_PLANE_LOOKUP_INDEX,
    CREATE_FLIGHTS_TABLE,
    CREATE_FLIGHT_DATE_INDEX,
    CREATE_NON_FLIGHTS_TABLE,
    CREATE_RECORDS_TABLE,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_planes_table_has_lookup_columns() {
        assert!(CREATE_PLANES_TABLE.contains("user_id INTEGER NOT NULL"));
        assert!(CREATE_PLANES_TABLE.contains("tailnumber TEXT NOT NULL"));
        assert!(CREATE_PLANES_TABLE.contains("type TEXT NOT NULL"));
        assert!(!CREATE_PLANES_TABLE.contains("UNIQUE"));
    }

    #[test]
    fn test_records_keyed_by_user() {
        assert!(CREATE_RECORDS_TABLE.contains("user_id INTEGER PRIMARY KEY"));
    }
}

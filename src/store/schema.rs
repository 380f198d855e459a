// DDL constants for the collection database.

pub const COLLECTIONS_DDL: &str = "\
CREATE TABLE IF NOT EXISTS collections (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT    NOT NULL UNIQUE,
    created_at  TEXT    NOT NULL
);
";

pub const RECORDS_DDL: &str = "\
CREATE TABLE IF NOT EXISTS records (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id   INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    record_id       TEXT    NOT NULL,
    document        TEXT,
    metadata_json   TEXT,
    embedding       BLOB    NOT NULL,
    dimension       INTEGER NOT NULL,
    added_at        TEXT    NOT NULL,
    UNIQUE (collection_id, record_id)
);
CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection_id);
";

pub const PRAGMAS: &str = "\
PRAGMA journal_mode = WAL;
PRAGMA synchronous  = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA cache_size   = -2000;
PRAGMA temp_store   = MEMORY;
";

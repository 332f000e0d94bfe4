//! SQL migration definitions for the Devize database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: projects, standard_parameters, quote_lines, quote_totals",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS projects (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per project; absent means "use the configured defaults"
CREATE TABLE IF NOT EXISTS standard_parameters (
    project_id             TEXT PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    markup_percent         REAL NOT NULL,
    discount_percent       REAL NOT NULL,
    indirect_costs_percent REAL NOT NULL,
    updated_at             TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS quote_lines (
    project_id             TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    group_id               TEXT NOT NULL,
    kind                   TEXT NOT NULL,
    line_key               TEXT NOT NULL,
    origin                 TEXT NOT NULL,
    position               INTEGER NOT NULL,
    code                   TEXT,
    description            TEXT NOT NULL,
    unit                   TEXT NOT NULL,
    total_quantity         REAL NOT NULL,
    total_base_value       REAL NOT NULL,
    weighted_unit_price    REAL NOT NULL,
    markup_percent         REAL NOT NULL,
    discount_percent       REAL NOT NULL,
    markup_uses_standard   INTEGER NOT NULL,
    discount_uses_standard INTEGER NOT NULL,
    value_with_markup      REAL NOT NULL,
    final_value            REAL NOT NULL,
    supplier               TEXT,
    pack_quantity          REAL,
    pack_unit              TEXT,
    operation_ids_json     TEXT NOT NULL DEFAULT '[]',
    UNIQUE(project_id, group_id, kind, line_key)
);

CREATE INDEX IF NOT EXISTS idx_quote_lines_group ON quote_lines(project_id, group_id, position);

CREATE TABLE IF NOT EXISTS quote_totals (
    project_id      TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    group_id        TEXT NOT NULL,
    base_total      REAL NOT NULL,
    materials_total REAL NOT NULL,
    labor_total     REAL NOT NULL,
    indirect_amount REAL NOT NULL,
    grand_total     REAL NOT NULL,
    unavailable_json TEXT NOT NULL DEFAULT '[]',
    computed_at     TEXT NOT NULL,
    PRIMARY KEY (project_id, group_id)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}

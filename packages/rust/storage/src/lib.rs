//! libSQL storage layer for Devize projects and saved quotes.
//!
//! The [`Storage`] struct wraps a local libSQL database holding projects,
//! their standard parameters, and the computed lines and totals of each
//! quote group.
//!
//! **Access rules:**
//! - CLI commands that change data: read-write via [`Storage::open`]
//! - Listing/reporting commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use devize_shared::{
    AggregateLine, DevizeError, LineKind, LineOrigin, ProjectId, QuoteSummary, Result,
    StandardParameters,
};
use libsql::{Connection, Database, Row, params};
use tracing::{debug, info, instrument};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A stored project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored totals of one quote group.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteTotalsRecord {
    pub base_total: f64,
    pub materials_total: f64,
    pub labor_total: f64,
    pub indirect_amount: f64,
    pub grand_total: f64,
    pub unavailable_operations: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

fn storage_err(e: libsql::Error) -> DevizeError {
    DevizeError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DevizeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DevizeError::not_found(format!(
                "database {} (run a command that saves data first)",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DevizeError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DevizeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Create a project.
    pub async fn insert_project(&self, name: &str) -> Result<ProjectRecord> {
        self.check_writable()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(DevizeError::validation("project name must not be blank"));
        }

        let id = ProjectId::new();
        let now = Utc::now();
        let stamp = now.to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO projects (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), name, stamp.as_str(), stamp.as_str()],
            )
            .await
            .map_err(storage_err)?;

        info!(%id, name, "project created");
        Ok(ProjectRecord {
            id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_project(&self, id: &ProjectId) -> Result<Option<ProjectRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, created_at, updated_at FROM projects WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_project(&row)?)),
            None => Ok(None),
        }
    }

    /// List all projects, newest first.
    pub async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, created_at, updated_at FROM projects ORDER BY created_at DESC, id DESC",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_project(&row)?);
        }
        Ok(results)
    }

    async fn require_project(&self, id: &ProjectId) -> Result<()> {
        match self.get_project(id).await? {
            Some(_) => Ok(()),
            None => Err(DevizeError::not_found(format!("project {id}"))),
        }
    }

    // -----------------------------------------------------------------------
    // Standard parameters
    // -----------------------------------------------------------------------

    /// Project standards, or `None` when the project still uses the
    /// configured defaults.
    pub async fn get_standards(&self, project: &ProjectId) -> Result<Option<StandardParameters>> {
        let mut rows = self
            .conn
            .query(
                "SELECT markup_percent, discount_percent, indirect_costs_percent
                 FROM standard_parameters WHERE project_id = ?1",
                params![project.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(StandardParameters::new(
                row.get::<f64>(0).map_err(storage_err)?,
                row.get::<f64>(1).map_err(storage_err)?,
                row.get::<f64>(2).map_err(storage_err)?,
            ))),
            None => Ok(None),
        }
    }

    /// Store a project's standards.
    #[instrument(skip_all, fields(project = %project))]
    pub async fn set_standards(
        &self,
        project: &ProjectId,
        standards: &StandardParameters,
    ) -> Result<()> {
        self.check_writable()?;
        standards.validate()?;
        self.require_project(project).await?;

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO standard_parameters
                   (project_id, markup_percent, discount_percent, indirect_costs_percent, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(project_id) DO UPDATE SET
                   markup_percent = excluded.markup_percent,
                   discount_percent = excluded.discount_percent,
                   indirect_costs_percent = excluded.indirect_costs_percent,
                   updated_at = excluded.updated_at",
                params![
                    project.to_string(),
                    standards.standard_markup_percent,
                    standards.standard_discount_percent,
                    standards.indirect_costs_percent,
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        self.touch_project(project, &now).await
    }

    async fn touch_project(&self, project: &ProjectId, now: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
                params![now, project.to_string()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Quotes
    // -----------------------------------------------------------------------

    /// Replace every line and the totals of one quote group, atomically.
    #[instrument(skip_all, fields(project = %project, group = group_id))]
    pub async fn save_quote(
        &self,
        project: &ProjectId,
        group_id: &str,
        summary: &QuoteSummary,
    ) -> Result<()> {
        self.check_writable()?;
        if group_id.trim().is_empty() {
            return Err(DevizeError::validation("group id must not be blank"));
        }
        self.require_project(project).await?;

        let project_id = project.to_string();
        let now = Utc::now().to_rfc3339();
        let unavailable_json = serde_json::to_string(&summary.unavailable_operations)
            .map_err(|e| DevizeError::Storage(e.to_string()))?;

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        tx.execute(
            "DELETE FROM quote_lines WHERE project_id = ?1 AND group_id = ?2",
            params![project_id.as_str(), group_id],
        )
        .await
        .map_err(storage_err)?;

        for (position, line) in summary.lines().enumerate() {
            let operation_ids_json = serde_json::to_string(&line.operation_ids)
                .map_err(|e| DevizeError::Storage(e.to_string()))?;
            tx.execute(
                "INSERT INTO quote_lines (
                    project_id, group_id, kind, line_key, origin, position,
                    code, description, unit,
                    total_quantity, total_base_value, weighted_unit_price,
                    markup_percent, discount_percent, markup_uses_standard, discount_uses_standard,
                    value_with_markup, final_value,
                    supplier, pack_quantity, pack_unit, operation_ids_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                           ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                params![
                    project_id.as_str(),
                    group_id,
                    line.kind.as_str(),
                    line.key.as_str(),
                    line.origin.as_str(),
                    position as i64,
                    line.code.as_deref(),
                    line.description.as_str(),
                    line.unit.as_str(),
                    line.total_quantity,
                    line.total_base_value,
                    line.weighted_unit_price,
                    line.markup_percent,
                    line.discount_percent,
                    i64::from(line.markup_uses_standard),
                    i64::from(line.discount_uses_standard),
                    line.value_with_markup,
                    line.final_value,
                    line.supplier.as_deref(),
                    line.pack_quantity,
                    line.pack_unit.as_deref(),
                    operation_ids_json,
                ],
            )
            .await
            .map_err(storage_err)?;
        }

        tx.execute(
            "INSERT INTO quote_totals
               (project_id, group_id, base_total, materials_total, labor_total,
                indirect_amount, grand_total, unavailable_json, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(project_id, group_id) DO UPDATE SET
               base_total = excluded.base_total,
               materials_total = excluded.materials_total,
               labor_total = excluded.labor_total,
               indirect_amount = excluded.indirect_amount,
               grand_total = excluded.grand_total,
               unavailable_json = excluded.unavailable_json,
               computed_at = excluded.computed_at",
            params![
                project_id.as_str(),
                group_id,
                summary.base_total,
                summary.materials_total,
                summary.labor_total,
                summary.indirect_amount,
                summary.grand_total,
                unavailable_json,
                now.as_str(),
            ],
        )
        .await
        .map_err(storage_err)?;

        tx.execute(
            "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
            params![now.as_str(), project_id.as_str()],
        )
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;

        debug!(
            lines = summary.material_lines.len() + summary.labor_lines.len(),
            grand_total = summary.grand_total,
            "quote saved"
        );
        Ok(())
    }

    /// Saved lines of a quote group, in saved order (materials then labor).
    pub async fn load_lines(
        &self,
        project: &ProjectId,
        group_id: &str,
    ) -> Result<Vec<AggregateLine>> {
        let mut rows = self
            .conn
            .query(
                "SELECT kind, line_key, origin, code, description, unit,
                        total_quantity, total_base_value, weighted_unit_price,
                        markup_percent, discount_percent, markup_uses_standard, discount_uses_standard,
                        value_with_markup, final_value,
                        supplier, pack_quantity, pack_unit, operation_ids_json
                 FROM quote_lines
                 WHERE project_id = ?1 AND group_id = ?2
                 ORDER BY position",
                params![project.to_string(), group_id],
            )
            .await
            .map_err(storage_err)?;

        let mut lines = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            lines.push(row_to_line(&row)?);
        }
        Ok(lines)
    }

    /// Group ids with a saved quote, alphabetically.
    pub async fn list_groups(&self, project: &ProjectId) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT group_id FROM quote_totals WHERE project_id = ?1 ORDER BY group_id",
                params![project.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let mut groups = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            groups.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(groups)
    }

    pub async fn get_totals(
        &self,
        project: &ProjectId,
        group_id: &str,
    ) -> Result<Option<QuoteTotalsRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT base_total, materials_total, labor_total, indirect_amount, grand_total,
                        unavailable_json, computed_at
                 FROM quote_totals WHERE project_id = ?1 AND group_id = ?2",
                params![project.to_string(), group_id],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        let unavailable_json: String = row.get(5).map_err(storage_err)?;
        Ok(Some(QuoteTotalsRecord {
            base_total: row.get(0).map_err(storage_err)?,
            materials_total: row.get(1).map_err(storage_err)?,
            labor_total: row.get(2).map_err(storage_err)?,
            indirect_amount: row.get(3).map_err(storage_err)?,
            grand_total: row.get(4).map_err(storage_err)?,
            unavailable_operations: serde_json::from_str(&unavailable_json)
                .map_err(|e| DevizeError::Storage(format!("invalid unavailable list: {e}")))?,
            computed_at: parse_timestamp(&row.get::<String>(6).map_err(storage_err)?)?,
        }))
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DevizeError::Storage(format!("invalid date: {e}")))
}

fn row_to_project(row: &Row) -> Result<ProjectRecord> {
    let id: String = row.get(0).map_err(storage_err)?;
    Ok(ProjectRecord {
        id: id
            .parse()
            .map_err(|e| DevizeError::Storage(format!("invalid project id '{id}': {e}")))?,
        name: row.get(1).map_err(storage_err)?,
        created_at: parse_timestamp(&row.get::<String>(2).map_err(storage_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(3).map_err(storage_err)?)?,
    })
}

fn row_to_line(row: &Row) -> Result<AggregateLine> {
    let kind: LineKind = row.get::<String>(0).map_err(storage_err)?.parse()?;
    let origin: LineOrigin = row.get::<String>(2).map_err(storage_err)?.parse()?;
    let operation_ids_json: String = row.get(18).map_err(storage_err)?;

    Ok(AggregateLine {
        key: row.get(1).map_err(storage_err)?,
        kind,
        origin,
        code: row.get::<String>(3).ok(),
        description: row.get(4).map_err(storage_err)?,
        unit: row.get(5).map_err(storage_err)?,
        total_quantity: row.get(6).map_err(storage_err)?,
        total_base_value: row.get(7).map_err(storage_err)?,
        weighted_unit_price: row.get(8).map_err(storage_err)?,
        markup_percent: row.get(9).map_err(storage_err)?,
        discount_percent: row.get(10).map_err(storage_err)?,
        markup_uses_standard: row.get::<i64>(11).map_err(storage_err)? != 0,
        discount_uses_standard: row.get::<i64>(12).map_err(storage_err)? != 0,
        value_with_markup: row.get(13).map_err(storage_err)?,
        final_value: row.get(14).map_err(storage_err)?,
        supplier: row.get::<String>(15).ok(),
        pack_quantity: row.get::<f64>(16).ok(),
        pack_unit: row.get::<String>(17).ok(),
        operation_ids: serde_json::from_str(&operation_ids_json)
            .map_err(|e| DevizeError::Storage(format!("invalid operation ids: {e}")))?,
    })
}

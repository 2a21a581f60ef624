use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use uuid::Uuid;

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::policy::{Caller, Operation, PolicySet, Table};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    policies: PolicySet,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_policies(db_path, PolicySet::standard())
    }

    pub fn with_policies<P: AsRef<Path>>(db_path: P, policies: PolicySet) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
            policies,
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// SQL run through it is not subject to row-level policies.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }
}

fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn datetime_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_datetime(idx, &row.get::<_, String>(idx)?)
}

fn opt_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_datetime(idx, &raw))
        .transpose()
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    parse_uuid(idx, &row.get::<_, String>(idx)?)
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_uuid(idx, &raw))
        .transpose()
}

fn json_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

fn json_text(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(Value::to_string)
}

fn row_exists(conn: &Connection, table: Table, id: &str) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table.name());
    Ok(conn.query_row(&sql, params![id], |row| row.get(0))?)
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

// Row mapping

const WORKSPACE_COLUMNS: &str =
    "id, created_at, workspace_owner, title, icon_id, data, in_trash, logo, banner_url";

fn workspace_from_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: uuid_col(row, 0)?,
        created_at: datetime_col(row, 1)?,
        workspace_owner: uuid_col(row, 2)?,
        title: row.get(3)?,
        icon_id: row.get(4)?,
        data: row.get(5)?,
        in_trash: row.get(6)?,
        logo: row.get(7)?,
        banner_url: row.get(8)?,
    })
}

const FOLDER_COLUMNS: &str =
    "id, created_at, workspace_id, title, icon_id, data, in_trash, banner_url";

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: uuid_col(row, 0)?,
        created_at: datetime_col(row, 1)?,
        workspace_id: uuid_col(row, 2)?,
        title: row.get(3)?,
        icon_id: row.get(4)?,
        data: row.get(5)?,
        in_trash: row.get(6)?,
        banner_url: row.get(7)?,
    })
}

const FILE_COLUMNS: &str =
    "id, created_at, workspace_id, folder_id, title, icon_id, data, in_trash, banner_url";

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<File> {
    Ok(File {
        id: uuid_col(row, 0)?,
        created_at: datetime_col(row, 1)?,
        workspace_id: uuid_col(row, 2)?,
        folder_id: opt_uuid_col(row, 3)?,
        title: row.get(4)?,
        icon_id: row.get(5)?,
        data: row.get(6)?,
        in_trash: row.get(7)?,
        banner_url: row.get(8)?,
    })
}

const USER_COLUMNS: &str =
    "id, full_name, avatar_url, billing_address, updated_at, payment_method, email";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        full_name: row.get(1)?,
        avatar_url: row.get(2)?,
        billing_address: json_col(row, 3)?,
        updated_at: opt_datetime(row, 4)?,
        payment_method: json_col(row, 5)?,
        email: row.get(6)?,
    })
}

const PRODUCT_COLUMNS: &str = "id, active, name, description, image, metadata";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        active: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        image: row.get(4)?,
        metadata: json_col(row, 5)?,
    })
}

const PRICE_COLUMNS: &str = "id, product_id, active, description, unit_amount, currency, type, \
     interval, interval_count, trial_period_days, metadata";

fn price_from_row(row: &Row<'_>) -> rusqlite::Result<Price> {
    Ok(Price {
        id: row.get(0)?,
        product_id: row.get(1)?,
        active: row.get(2)?,
        description: row.get(3)?,
        unit_amount: row.get(4)?,
        currency: row.get(5)?,
        price_type: row.get(6)?,
        interval: row.get(7)?,
        interval_count: row.get(8)?,
        trial_period_days: row.get(9)?,
        metadata: json_col(row, 10)?,
    })
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, status, metadata, price_id, quantity, \
     cancel_at_period_end, created, current_period_start, current_period_end, ended_at, \
     cancel_at, canceled_at, trial_start, trial_end";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        user_id: uuid_col(row, 1)?,
        status: row.get(2)?,
        metadata: json_col(row, 3)?,
        price_id: row.get(4)?,
        quantity: row.get(5)?,
        cancel_at_period_end: row.get(6)?,
        created: datetime_col(row, 7)?,
        current_period_start: datetime_col(row, 8)?,
        current_period_end: datetime_col(row, 9)?,
        ended_at: opt_datetime(row, 10)?,
        cancel_at: opt_datetime(row, 11)?,
        canceled_at: opt_datetime(row, 12)?,
        trial_start: opt_datetime(row, 13)?,
        trial_end: opt_datetime(row, 14)?,
    })
}

// Single-row loads, usable on a connection or inside a transaction

fn load_workspace(conn: &Connection, id: Uuid) -> Result<Option<Workspace>> {
    conn.query_row(
        &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1"),
        params![id.to_string()],
        workspace_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn load_folder(conn: &Connection, id: Uuid) -> Result<Option<Folder>> {
    conn.query_row(
        &format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1"),
        params![id.to_string()],
        folder_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn load_file(conn: &Connection, id: Uuid) -> Result<Option<File>> {
    conn.query_row(
        &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
        params![id.to_string()],
        file_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn load_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id.to_string()],
        user_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn load_customer(conn: &Connection, id: Uuid) -> Result<Option<Customer>> {
    conn.query_row(
        "SELECT id, provider_customer_id FROM customers WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok(Customer {
                id: uuid_col(row, 0)?,
                provider_customer_id: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

fn load_product(conn: &Connection, id: &str) -> Result<Option<Product>> {
    conn.query_row(
        &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
        params![id],
        product_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn load_price(conn: &Connection, id: &str) -> Result<Option<Price>> {
    conn.query_row(
        &format!("SELECT {PRICE_COLUMNS} FROM prices WHERE id = ?1"),
        params![id],
        price_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn load_subscription(conn: &Connection, id: &str) -> Result<Option<Subscription>> {
    conn.query_row(
        &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
        params![id],
        subscription_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn workspace_folders(conn: &Connection, workspace_id: Uuid) -> Result<Vec<Folder>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FOLDER_COLUMNS} FROM folders WHERE workspace_id = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![workspace_id.to_string()], folder_from_row)?;
    collect(rows)
}

fn workspace_files(conn: &Connection, workspace_id: Uuid) -> Result<Vec<File>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM files WHERE workspace_id = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![workspace_id.to_string()], file_from_row)?;
    collect(rows)
}

/// Validates a file's references: the workspace must exist, and a folder,
/// when named, must exist inside that same workspace.
fn check_file_refs(conn: &Connection, file: &File) -> Result<()> {
    if !row_exists(conn, Table::Workspaces, &file.workspace_id.to_string())? {
        return Err(Error::missing("files", "workspace_id", file.workspace_id));
    }

    if let Some(folder_id) = file.folder_id {
        let folder =
            load_folder(conn, folder_id)?.ok_or_else(|| Error::missing("files", "folder_id", folder_id))?;
        if folder.workspace_id != file.workspace_id {
            return Err(Error::missing("files", "folder_id", folder_id));
        }
    }

    Ok(())
}

fn query_ids(conn: &Connection, sql: &str, key: Uuid) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![key.to_string()], |row| row.get(0))?;
    collect(rows)
}

/// Deletes rows by id and fails unless every one of them was removed.
fn delete_resolved(conn: &Connection, table: Table, ids: &[String]) -> Result<usize> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", table.name());
    let mut stmt = conn.prepare(&sql)?;

    let mut removed = 0;
    for id in ids {
        removed += stmt.execute(params![id])?;
    }

    if removed != ids.len() {
        return Err(Error::CascadeFailure(format!(
            "resolved {} {} rows but removed {}",
            ids.len(),
            table,
            removed
        )));
    }
    Ok(removed)
}

fn count_where(conn: &Connection, sql: &str, key: Uuid) -> Result<i64> {
    Ok(conn.query_row(sql, params![key.to_string()], |row| row.get(0))?)
}

/// Any failure after a cascade has started aborts the whole delete.
fn cascade_error(scope: String, err: Error) -> Error {
    match err {
        Error::CascadeFailure(_) => err,
        other => Error::CascadeFailure(format!("{scope}: {other}")),
    }
}

/// Resolves a workspace's folders and files, then deletes bottom-up.
fn cascade_workspace(conn: &Connection, id: Uuid) -> Result<CascadeReport> {
    let folder_ids = query_ids(conn, "SELECT id FROM folders WHERE workspace_id = ?1", id)?;
    let file_ids = query_ids(
        conn,
        "SELECT id FROM files
         WHERE workspace_id = ?1
            OR folder_id IN (SELECT id FROM folders WHERE workspace_id = ?1)",
        id,
    )?;

    let files = delete_resolved(conn, Table::Files, &file_ids)?;
    let folders = delete_resolved(conn, Table::Folders, &folder_ids)?;

    let survivors = count_where(
        conn,
        "SELECT (SELECT COUNT(*) FROM folders WHERE workspace_id = ?1)
              + (SELECT COUNT(*) FROM files WHERE workspace_id = ?1)",
        id,
    )?;
    if survivors > 0 {
        return Err(Error::CascadeFailure(format!(
            "{survivors} rows still reference workspace {id}"
        )));
    }

    let workspaces = delete_resolved(conn, Table::Workspaces, &[id.to_string()])?;
    Ok(CascadeReport {
        workspaces,
        folders,
        files,
    })
}

fn cascade_folder(conn: &Connection, id: Uuid) -> Result<CascadeReport> {
    let file_ids = query_ids(conn, "SELECT id FROM files WHERE folder_id = ?1", id)?;
    let files = delete_resolved(conn, Table::Files, &file_ids)?;

    let survivors = count_where(conn, "SELECT COUNT(*) FROM files WHERE folder_id = ?1", id)?;
    if survivors > 0 {
        return Err(Error::CascadeFailure(format!(
            "{survivors} files still reference folder {id}"
        )));
    }

    let folders = delete_resolved(conn, Table::Folders, &[id.to_string()])?;
    Ok(CascadeReport {
        workspaces: 0,
        folders,
        files,
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Workspace operations

    fn create_workspace(&self, caller: &Caller, ws: &Workspace) -> Result<()> {
        self.policies.authorize(caller, Operation::Insert, ws)?;

        self.conn()
            .execute(
                "INSERT INTO workspaces (id, created_at, workspace_owner, title, icon_id, data, in_trash, logo, banner_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    ws.id.to_string(),
                    format_datetime(&ws.created_at),
                    ws.workspace_owner.to_string(),
                    ws.title,
                    ws.icon_id,
                    ws.data,
                    ws.in_trash,
                    ws.logo,
                    ws.banner_url,
                ],
            )
            .map_err(|e| Error::from_constraint(e, "workspaces"))?;
        Ok(())
    }

    fn get_workspace(&self, caller: &Caller, id: Uuid) -> Result<Option<Workspace>> {
        let conn = self.conn();
        let ws = load_workspace(&conn, id)?;
        if let Some(ws) = &ws {
            self.policies.authorize(caller, Operation::Select, ws)?;
        }
        Ok(ws)
    }

    fn list_workspaces(&self, caller: &Caller, owner: Uuid) -> Result<Vec<Workspace>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE workspace_owner = ?1 ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map(params![owner.to_string()], workspace_from_row)?;
        Ok(self.policies.filter_visible(caller, collect(rows)?))
    }

    fn update_workspace(&self, caller: &Caller, ws: &Workspace) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = load_workspace(&tx, ws.id)?.ok_or(Error::NotFound)?;
        self.policies.authorize(caller, Operation::Update, &existing)?;

        tx.execute(
            "UPDATE workspaces SET title = ?1, icon_id = ?2, data = ?3, in_trash = ?4, logo = ?5, banner_url = ?6
             WHERE id = ?7",
            params![
                ws.title,
                ws.icon_id,
                ws.data,
                ws.in_trash,
                ws.logo,
                ws.banner_url,
                ws.id.to_string()
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn delete_workspace(&self, caller: &Caller, id: Uuid) -> Result<CascadeReport> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let Some(ws) = load_workspace(&tx, id)? else {
            return Ok(CascadeReport::default());
        };
        self.policies.authorize(caller, Operation::Delete, &ws)?;

        let report = cascade_workspace(&tx, id)
            .and_then(|report| {
                tx.commit()?;
                Ok(report)
            })
            .map_err(|e| cascade_error(format!("workspace {id}"), e))?;

        tracing::info!(
            workspace_id = %id,
            folders = report.folders,
            files = report.files,
            "workspace deleted"
        );
        Ok(report)
    }

    fn workspace_tree(&self, caller: &Caller, id: Uuid) -> Result<WorkspaceTree> {
        let conn = self.conn();

        let workspace = load_workspace(&conn, id)?.ok_or(Error::NotFound)?;
        self.policies.authorize(caller, Operation::Select, &workspace)?;

        let folders = self
            .policies
            .filter_visible(caller, workspace_folders(&conn, id)?);
        let mut files = self.policies.filter_visible(caller, workspace_files(&conn, id)?);

        let folders = folders
            .into_iter()
            .map(|folder| {
                let (inside, rest): (Vec<File>, Vec<File>) = std::mem::take(&mut files)
                    .into_iter()
                    .partition(|f| f.folder_id == Some(folder.id));
                files = rest;
                FolderNode {
                    folder,
                    files: inside,
                }
            })
            .collect();

        Ok(WorkspaceTree {
            workspace,
            folders,
            files,
        })
    }

    // Folder operations

    fn create_folder(&self, caller: &Caller, folder: &Folder) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        self.policies.authorize(caller, Operation::Insert, folder)?;

        if !row_exists(&tx, Table::Workspaces, &folder.workspace_id.to_string())? {
            return Err(Error::missing("folders", "workspace_id", folder.workspace_id));
        }

        tx.execute(
            "INSERT INTO folders (id, created_at, title, icon_id, data, in_trash, banner_url, workspace_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                folder.id.to_string(),
                format_datetime(&folder.created_at),
                folder.title,
                folder.icon_id,
                folder.data,
                folder.in_trash,
                folder.banner_url,
                folder.workspace_id.to_string(),
            ],
        )
        .map_err(|e| Error::from_constraint(e, "folders"))?;

        tx.commit()?;
        Ok(())
    }

    fn get_folder(&self, caller: &Caller, id: Uuid) -> Result<Option<Folder>> {
        let conn = self.conn();
        let folder = load_folder(&conn, id)?;
        if let Some(folder) = &folder {
            self.policies.authorize(caller, Operation::Select, folder)?;
        }
        Ok(folder)
    }

    fn list_folders(&self, caller: &Caller, workspace_id: Uuid) -> Result<Vec<Folder>> {
        let conn = self.conn();
        Ok(self
            .policies
            .filter_visible(caller, workspace_folders(&conn, workspace_id)?))
    }

    fn update_folder(&self, caller: &Caller, folder: &Folder) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = load_folder(&tx, folder.id)?.ok_or(Error::NotFound)?;
        self.policies.authorize(caller, Operation::Update, &existing)?;

        if existing.workspace_id != folder.workspace_id {
            return Err(Error::DomainConstraint(
                "a folder cannot move between workspaces".to_string(),
            ));
        }

        tx.execute(
            "UPDATE folders SET title = ?1, icon_id = ?2, data = ?3, in_trash = ?4, banner_url = ?5
             WHERE id = ?6",
            params![
                folder.title,
                folder.icon_id,
                folder.data,
                folder.in_trash,
                folder.banner_url,
                folder.id.to_string()
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn delete_folder(&self, caller: &Caller, id: Uuid) -> Result<CascadeReport> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let Some(folder) = load_folder(&tx, id)? else {
            return Ok(CascadeReport::default());
        };
        self.policies.authorize(caller, Operation::Delete, &folder)?;

        let report = cascade_folder(&tx, id)
            .and_then(|report| {
                tx.commit()?;
                Ok(report)
            })
            .map_err(|e| cascade_error(format!("folder {id}"), e))?;

        tracing::info!(
            folder_id = %id,
            workspace_id = %folder.workspace_id,
            files = report.files,
            "folder deleted"
        );
        Ok(report)
    }

    // File operations

    fn create_file(&self, caller: &Caller, file: &File) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        self.policies.authorize(caller, Operation::Insert, file)?;
        check_file_refs(&tx, file)?;

        tx.execute(
            "INSERT INTO files (id, created_at, title, icon_id, data, in_trash, banner_url, workspace_id, folder_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                file.id.to_string(),
                format_datetime(&file.created_at),
                file.title,
                file.icon_id,
                file.data,
                file.in_trash,
                file.banner_url,
                file.workspace_id.to_string(),
                file.folder_id.map(|id| id.to_string()),
            ],
        )
        .map_err(|e| Error::from_constraint(e, "files"))?;

        tx.commit()?;
        Ok(())
    }

    fn get_file(&self, caller: &Caller, id: Uuid) -> Result<Option<File>> {
        let conn = self.conn();
        let file = load_file(&conn, id)?;
        if let Some(file) = &file {
            self.policies.authorize(caller, Operation::Select, file)?;
        }
        Ok(file)
    }

    fn list_files(
        &self,
        caller: &Caller,
        workspace_id: Uuid,
        folder_id: Option<Uuid>,
    ) -> Result<Vec<File>> {
        let conn = self.conn();
        let mut files = workspace_files(&conn, workspace_id)?;
        if let Some(folder_id) = folder_id {
            files.retain(|f| f.folder_id == Some(folder_id));
        }
        Ok(self.policies.filter_visible(caller, files))
    }

    fn update_file(&self, caller: &Caller, file: &File) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = load_file(&tx, file.id)?.ok_or(Error::NotFound)?;
        self.policies.authorize(caller, Operation::Update, &existing)?;

        if existing.workspace_id != file.workspace_id {
            return Err(Error::DomainConstraint(
                "a file cannot move between workspaces".to_string(),
            ));
        }
        check_file_refs(&tx, file)?;

        tx.execute(
            "UPDATE files SET title = ?1, icon_id = ?2, data = ?3, in_trash = ?4, banner_url = ?5, folder_id = ?6
             WHERE id = ?7",
            params![
                file.title,
                file.icon_id,
                file.data,
                file.in_trash,
                file.banner_url,
                file.folder_id.map(|id| id.to_string()),
                file.id.to_string()
            ],
        )
        .map_err(|e| Error::from_constraint(e, "files"))?;

        tx.commit()?;
        Ok(())
    }

    fn delete_file(&self, caller: &Caller, id: Uuid) -> Result<CascadeReport> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let Some(file) = load_file(&tx, id)? else {
            return Ok(CascadeReport::default());
        };
        self.policies.authorize(caller, Operation::Delete, &file)?;

        let files = delete_resolved(&tx, Table::Files, &[id.to_string()])?;
        tx.commit()?;

        Ok(CascadeReport {
            workspaces: 0,
            folders: 0,
            files,
        })
    }

    // Trash

    fn set_trash(&self, caller: &Caller, node: ContentRef, marker: Option<&str>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let (table, id) = match node {
            ContentRef::Workspace(id) => {
                let ws = load_workspace(&tx, id)?.ok_or(Error::NotFound)?;
                self.policies.authorize(caller, Operation::Update, &ws)?;
                (Table::Workspaces, id)
            }
            ContentRef::Folder(id) => {
                let folder = load_folder(&tx, id)?.ok_or(Error::NotFound)?;
                self.policies.authorize(caller, Operation::Update, &folder)?;
                (Table::Folders, id)
            }
            ContentRef::File(id) => {
                let file = load_file(&tx, id)?.ok_or(Error::NotFound)?;
                self.policies.authorize(caller, Operation::Update, &file)?;
                (Table::Files, id)
            }
        };

        tx.execute(
            &format!("UPDATE {} SET in_trash = ?1 WHERE id = ?2", table.name()),
            params![marker, id.to_string()],
        )?;
        tx.commit()?;

        tracing::debug!(%table, %id, trashed = marker.is_some(), "trash marker updated");
        Ok(())
    }

    fn list_trash(&self, caller: &Caller, workspace_id: Uuid) -> Result<TrashListing> {
        let conn = self.conn();

        let workspace = load_workspace(&conn, workspace_id)?.ok_or(Error::NotFound)?;
        self.policies.authorize(caller, Operation::Select, &workspace)?;

        let mut folders = workspace_folders(&conn, workspace_id)?;
        folders.retain(|f| f.in_trash.is_some());
        let mut files = workspace_files(&conn, workspace_id)?;
        files.retain(|f| f.in_trash.is_some());

        Ok(TrashListing {
            workspace: workspace.in_trash.is_some().then_some(workspace),
            folders: self.policies.filter_visible(caller, folders),
            files: self.policies.filter_visible(caller, files),
        })
    }

    // User operations

    fn create_user(&self, caller: &Caller, user: &User) -> Result<()> {
        self.policies.authorize(caller, Operation::Insert, user)?;

        self.conn()
            .execute(
                "INSERT INTO users (id, full_name, avatar_url, billing_address, updated_at, payment_method, email)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id.to_string(),
                    user.full_name,
                    user.avatar_url,
                    json_text(&user.billing_address),
                    user.updated_at.as_ref().map(format_datetime),
                    json_text(&user.payment_method),
                    user.email,
                ],
            )
            .map_err(|e| Error::from_constraint(e, "users"))?;
        Ok(())
    }

    fn get_user(&self, caller: &Caller, id: Uuid) -> Result<Option<User>> {
        let conn = self.conn();
        let user = load_user(&conn, id)?;
        if let Some(user) = &user {
            self.policies.authorize(caller, Operation::Select, user)?;
        }
        Ok(user)
    }

    fn list_users(&self, caller: &Caller) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let rows = stmt.query_map([], user_from_row)?;
        Ok(self.policies.filter_visible(caller, collect(rows)?))
    }

    fn update_user(&self, caller: &Caller, user: &User) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = load_user(&tx, user.id)?.ok_or(Error::NotFound)?;
        self.policies.authorize(caller, Operation::Update, &existing)?;

        tx.execute(
            "UPDATE users SET full_name = ?1, avatar_url = ?2, billing_address = ?3, updated_at = ?4,
                payment_method = ?5, email = ?6
             WHERE id = ?7",
            params![
                user.full_name,
                user.avatar_url,
                json_text(&user.billing_address),
                format_datetime(&Utc::now()),
                json_text(&user.payment_method),
                user.email,
                user.id.to_string(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    // Customer operations

    fn upsert_customer(&self, caller: &Caller, customer: &Customer) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let operation = match load_customer(&tx, customer.id)? {
            Some(existing) => {
                self.policies.authorize(caller, Operation::Update, &existing)?;
                Operation::Update
            }
            None => Operation::Insert,
        };
        self.policies.authorize(caller, operation, customer)?;

        if !row_exists(&tx, Table::Users, &customer.id.to_string())? {
            return Err(Error::missing("customers", "id", customer.id));
        }

        tx.execute(
            "INSERT INTO customers (id, provider_customer_id) VALUES (?1, ?2)
             ON CONFLICT (id) DO UPDATE SET provider_customer_id = excluded.provider_customer_id",
            params![customer.id.to_string(), customer.provider_customer_id],
        )
        .map_err(|e| Error::from_constraint(e, "customers"))?;

        tx.commit()?;
        Ok(())
    }

    fn get_customer(&self, caller: &Caller, id: Uuid) -> Result<Option<Customer>> {
        let conn = self.conn();
        let customer = load_customer(&conn, id)?;
        if let Some(customer) = &customer {
            self.policies.authorize(caller, Operation::Select, customer)?;
        }
        Ok(customer)
    }

    // Catalog operations

    fn upsert_product(&self, caller: &Caller, product: &Product) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let operation = match load_product(&tx, &product.id)? {
            Some(_) => Operation::Update,
            None => Operation::Insert,
        };
        self.policies.authorize(caller, operation, product)?;

        tx.execute(
            "INSERT INTO products (id, active, name, description, image, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (id) DO UPDATE SET
                active = excluded.active,
                name = excluded.name,
                description = excluded.description,
                image = excluded.image,
                metadata = excluded.metadata",
            params![
                product.id,
                product.active,
                product.name,
                product.description,
                product.image,
                json_text(&product.metadata),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_product(&self, caller: &Caller, id: &str) -> Result<Option<Product>> {
        let conn = self.conn();
        let product = load_product(&conn, id)?;
        if let Some(product) = &product {
            self.policies.authorize(caller, Operation::Select, product)?;
        }
        Ok(product)
    }

    fn list_products(&self, caller: &Caller, active_only: bool) -> Result<Vec<Product>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE ?1 = 0 OR active = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![active_only], product_from_row)?;
        Ok(self.policies.filter_visible(caller, collect(rows)?))
    }

    fn delete_product(&self, caller: &Caller, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let Some(product) = load_product(&tx, id)? else {
            return Ok(false);
        };
        self.policies.authorize(caller, Operation::Delete, &product)?;

        let prices: i64 = tx.query_row(
            "SELECT COUNT(*) FROM prices WHERE product_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if prices > 0 {
            return Err(Error::ReferentialIntegrity {
                table: "prices",
                column: "product_id",
                id: id.to_string(),
            });
        }

        let rows = tx
            .execute("DELETE FROM products WHERE id = ?1", params![id])
            .map_err(|e| Error::from_constraint(e, "products"))?;

        tx.commit()?;
        Ok(rows > 0)
    }

    fn upsert_price(&self, caller: &Caller, price: &Price) -> Result<()> {
        price.validate()?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let operation = match load_price(&tx, &price.id)? {
            Some(_) => Operation::Update,
            None => Operation::Insert,
        };
        self.policies.authorize(caller, operation, price)?;

        if !row_exists(&tx, Table::Products, &price.product_id)? {
            return Err(Error::missing("prices", "product_id", &price.product_id));
        }

        tx.execute(
            "INSERT INTO prices (id, product_id, active, description, unit_amount, currency, type,
                interval, interval_count, trial_period_days, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (id) DO UPDATE SET
                product_id = excluded.product_id,
                active = excluded.active,
                description = excluded.description,
                unit_amount = excluded.unit_amount,
                currency = excluded.currency,
                type = excluded.type,
                interval = excluded.interval,
                interval_count = excluded.interval_count,
                trial_period_days = excluded.trial_period_days,
                metadata = excluded.metadata",
            params![
                price.id,
                price.product_id,
                price.active,
                price.description,
                price.unit_amount,
                price.currency,
                price.price_type,
                price.interval,
                price.interval_count,
                price.trial_period_days,
                json_text(&price.metadata),
            ],
        )
        .map_err(|e| Error::from_constraint(e, "prices"))?;

        tx.commit()?;
        Ok(())
    }

    fn get_price(&self, caller: &Caller, id: &str) -> Result<Option<Price>> {
        let conn = self.conn();
        let price = load_price(&conn, id)?;
        if let Some(price) = &price {
            self.policies.authorize(caller, Operation::Select, price)?;
        }
        Ok(price)
    }

    fn list_prices(&self, caller: &Caller, product_id: &str) -> Result<Vec<Price>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRICE_COLUMNS} FROM prices WHERE product_id = ?1 ORDER BY unit_amount, id"
        ))?;
        let rows = stmt.query_map(params![product_id], price_from_row)?;
        Ok(self.policies.filter_visible(caller, collect(rows)?))
    }

    // Subscription operations

    fn upsert_subscription(
        &self,
        caller: &Caller,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<Subscription> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = load_subscription(&tx, &snapshot.id)?;
        let now = Utc::now();

        // Period defaults apply on first insert only.
        let period = |given: Option<DateTime<Utc>>, stored: Option<DateTime<Utc>>| {
            given.or(stored).unwrap_or(now)
        };
        let sub = Subscription {
            id: snapshot.id.clone(),
            user_id: snapshot.user_id,
            status: snapshot.status,
            metadata: snapshot.metadata.clone(),
            price_id: snapshot.price_id.clone(),
            quantity: snapshot.quantity,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            created: period(snapshot.created, existing.as_ref().map(|s| s.created)),
            current_period_start: period(
                snapshot.current_period_start,
                existing.as_ref().map(|s| s.current_period_start),
            ),
            current_period_end: period(
                snapshot.current_period_end,
                existing.as_ref().map(|s| s.current_period_end),
            ),
            ended_at: snapshot.ended_at,
            cancel_at: snapshot.cancel_at,
            canceled_at: snapshot.canceled_at,
            trial_start: snapshot.trial_start,
            trial_end: snapshot.trial_end,
        };

        let operation = match &existing {
            Some(current) => {
                self.policies.authorize(caller, Operation::Update, current)?;
                Operation::Update
            }
            None => Operation::Insert,
        };
        self.policies.authorize(caller, operation, &sub)?;

        if !row_exists(&tx, Table::Users, &sub.user_id.to_string())? {
            return Err(Error::missing("subscriptions", "user_id", sub.user_id));
        }
        if let Some(price_id) = &sub.price_id {
            if !row_exists(&tx, Table::Prices, price_id)? {
                return Err(Error::missing("subscriptions", "price_id", price_id));
            }
        }

        tx.execute(
            "INSERT INTO subscriptions (id, user_id, status, metadata, price_id, quantity,
                cancel_at_period_end, created, current_period_start, current_period_end,
                ended_at, cancel_at, canceled_at, trial_start, trial_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT (id) DO UPDATE SET
                user_id = excluded.user_id,
                status = excluded.status,
                metadata = excluded.metadata,
                price_id = excluded.price_id,
                quantity = excluded.quantity,
                cancel_at_period_end = excluded.cancel_at_period_end,
                created = excluded.created,
                current_period_start = excluded.current_period_start,
                current_period_end = excluded.current_period_end,
                ended_at = excluded.ended_at,
                cancel_at = excluded.cancel_at,
                canceled_at = excluded.canceled_at,
                trial_start = excluded.trial_start,
                trial_end = excluded.trial_end",
            params![
                sub.id,
                sub.user_id.to_string(),
                sub.status,
                json_text(&sub.metadata),
                sub.price_id,
                sub.quantity,
                sub.cancel_at_period_end,
                format_datetime(&sub.created),
                format_datetime(&sub.current_period_start),
                format_datetime(&sub.current_period_end),
                sub.ended_at.as_ref().map(format_datetime),
                sub.cancel_at.as_ref().map(format_datetime),
                sub.canceled_at.as_ref().map(format_datetime),
                sub.trial_start.as_ref().map(format_datetime),
                sub.trial_end.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| Error::from_constraint(e, "subscriptions"))?;

        tx.commit()?;

        tracing::info!(
            subscription_id = %sub.id,
            user_id = %sub.user_id,
            status = %sub.status,
            "subscription snapshot stored"
        );
        Ok(sub)
    }

    fn get_subscription(&self, caller: &Caller, id: &str) -> Result<Option<Subscription>> {
        let conn = self.conn();
        let sub = load_subscription(&conn, id)?;
        if let Some(sub) = &sub {
            self.policies.authorize(caller, Operation::Select, sub)?;
        }
        Ok(sub)
    }

    fn list_subscriptions(&self, caller: &Caller, user_id: Uuid) -> Result<Vec<Subscription>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1"
        ))?;
        let rows = stmt.query_map(params![user_id.to_string()], subscription_from_row)?;

        let mut subs = self.policies.filter_visible(caller, collect(rows)?);
        subs.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(subs)
    }

    fn active_subscription(&self, caller: &Caller, user_id: Uuid) -> Result<Option<Subscription>> {
        Ok(self
            .list_subscriptions(caller, user_id)?
            .into_iter()
            .find(|s| s.status.is_live()))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

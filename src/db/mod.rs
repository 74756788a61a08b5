use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, params_from_iter, types::Type};

use crate::ordering::SortOrder;
use crate::types::{Category, Priority, Task, TaskProjection};

/// Narrow query/command interface the store consumes. Identifier assignment
/// happens here: `insert_task`/`insert_category` return the persisted id.
pub trait TaskGateway: Send {
    fn insert_task(&mut self, task: &Task) -> Result<i64>;
    fn update_task(&mut self, task: &Task) -> Result<()>;
    fn delete_task(&mut self, id: i64) -> Result<()>;
    /// Batch delete; returns how many rows were removed.
    fn delete_tasks(&mut self, ids: &[i64]) -> Result<usize>;
    fn task_by_id(&mut self, id: i64) -> Result<Option<Task>>;
    fn list_tasks(&mut self, order: SortOrder) -> Result<Vec<Task>>;
    fn list_projections(&mut self, order: SortOrder) -> Result<Vec<TaskProjection>>;
    fn tasks_in_category(&mut self, category_id: i64) -> Result<Vec<Task>>;
    fn tasks_of_kind(&mut self, kind: &str) -> Result<Vec<Task>>;
    fn count_tasks_for_category(&mut self, category_id: i64) -> Result<usize>;
    /// Null out the category reference on every dependent task; returns how
    /// many rows were touched.
    fn clear_category_refs(&mut self, category_id: i64) -> Result<usize>;

    fn insert_category(&mut self, category: &Category) -> Result<i64>;
    fn update_category(&mut self, category: &Category) -> Result<()>;
    fn delete_category(&mut self, id: i64) -> Result<()>;
    fn category_by_id(&mut self, id: i64) -> Result<Option<Category>>;
    /// Categories ordered ascending by display name.
    fn list_categories(&mut self) -> Result<Vec<Category>>;
}

const TASK_COLUMNS: &str =
    "tasks.id, tasks.title, tasks.description, tasks.due_at, tasks.priority, \
     tasks.category_id, tasks.completed, tasks.kind";

pub struct SqliteGateway {
    conn: Connection,
}

impl SqliteGateway {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();

        if path_ref != Path::new(":memory:")
            && let Some(parent) = path_ref.parent()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create parent directories for {}",
                    path_ref.display()
                )
            })?;
        }

        let conn = Connection::open(path_ref)
            .with_context(|| format!("failed to open sqlite db at {}", path_ref.display()))?;

        conn.execute("PRAGMA foreign_keys = ON", params![])
            .context("failed to enable foreign keys")?;

        let gateway = Self { conn };
        gateway.run_migrations()?;
        Ok(gateway)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    due_at TEXT,
                    priority INTEGER NOT NULL DEFAULT 1,
                    category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                    completed INTEGER NOT NULL DEFAULT 0,
                    kind TEXT NOT NULL DEFAULT 'regular'
                );",
            )
            .context("failed to run sqlite migrations")?;
        Ok(())
    }

    fn query_tasks(&mut self, sql: &str, query_params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(sql)?;
        let tasks = stmt
            .query_map(query_params, map_task_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load tasks")?;
        Ok(tasks)
    }
}

impl TaskGateway for SqliteGateway {
    fn insert_task(&mut self, task: &Task) -> Result<i64> {
        if task.id == 0 {
            self.conn
                .execute(
                    "INSERT INTO tasks (title, description, due_at, priority, category_id, completed, kind) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        task.title,
                        task.description,
                        task.due_at.map(|due| due.to_rfc3339()),
                        task.priority.rank(),
                        task.category_id,
                        task.completed,
                        task.kind
                    ],
                )
                .context("failed to insert task")?;
            Ok(self.conn.last_insert_rowid())
        } else {
            // Restore path: the caller re-inserts a previously assigned id.
            self.conn
                .execute(
                    "INSERT INTO tasks (id, title, description, due_at, priority, category_id, completed, kind) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        task.id,
                        task.title,
                        task.description,
                        task.due_at.map(|due| due.to_rfc3339()),
                        task.priority.rank(),
                        task.category_id,
                        task.completed,
                        task.kind
                    ],
                )
                .context("failed to restore task")?;
            Ok(task.id)
        }
    }

    fn update_task(&mut self, task: &Task) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tasks SET title = ?1, description = ?2, due_at = ?3, priority = ?4, \
                 category_id = ?5, completed = ?6, kind = ?7 WHERE id = ?8",
                params![
                    task.title,
                    task.description,
                    task.due_at.map(|due| due.to_rfc3339()),
                    task.priority.rank(),
                    task.category_id,
                    task.completed,
                    task.kind,
                    task.id
                ],
            )
            .context("failed to update task")?;
        Ok(())
    }

    fn delete_task(&mut self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .context("failed to delete task")?;
        Ok(())
    }

    fn delete_tasks(&mut self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM tasks WHERE id IN ({placeholders})");
        let removed = self
            .conn
            .execute(&sql, params_from_iter(ids.iter()))
            .context("failed to batch-delete tasks")?;
        Ok(removed)
    }

    fn task_by_id(&mut self, id: i64) -> Result<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE tasks.id = ?1"))?;
        let mut rows = stmt
            .query_map(params![id], map_task_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("failed to load task {id}"))?;
        Ok(rows.pop())
    }

    fn list_tasks(&mut self, order: SortOrder) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY {}",
            order.order_clause()
        );
        self.query_tasks(&sql, &[])
    }

    fn list_projections(&mut self, order: SortOrder) -> Result<Vec<TaskProjection>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS}, categories.id, categories.name, categories.color \
             FROM tasks LEFT JOIN categories ON categories.id = tasks.category_id \
             ORDER BY {}",
            order.order_clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let projections = stmt
            .query_map(params![], |row| {
                let task = map_task_row(row)?;
                let category = match row.get::<_, Option<i64>>(8)? {
                    Some(id) => Some(Category {
                        id,
                        name: row.get(9)?,
                        color: row.get(10)?,
                    }),
                    None => None,
                };
                Ok(TaskProjection { task, category })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load task projections")?;
        Ok(projections)
    }

    fn tasks_in_category(&mut self, category_id: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE tasks.category_id = ?1 \
             ORDER BY {}",
            SortOrder::Date.order_clause()
        );
        self.query_tasks(&sql, &[&category_id])
    }

    fn tasks_of_kind(&mut self, kind: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE tasks.kind = ?1 ORDER BY {}",
            SortOrder::Date.order_clause()
        );
        self.query_tasks(&sql, &[&kind])
    }

    fn count_tasks_for_category(&mut self, category_id: i64) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE category_id = ?1",
                params![category_id],
                |row| row.get(0),
            )
            .context("failed to count tasks for category")?;
        Ok(count as usize)
    }

    fn clear_category_refs(&mut self, category_id: i64) -> Result<usize> {
        let cleared = self
            .conn
            .execute(
                "UPDATE tasks SET category_id = NULL WHERE category_id = ?1",
                params![category_id],
            )
            .context("failed to clear category references")?;
        Ok(cleared)
    }

    fn insert_category(&mut self, category: &Category) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO categories (name, color) VALUES (?1, ?2)",
                params![category.name, category.color],
            )
            .context("failed to insert category")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_category(&mut self, category: &Category) -> Result<()> {
        self.conn
            .execute(
                "UPDATE categories SET name = ?1, color = ?2 WHERE id = ?3",
                params![category.name, category.color, category.id],
            )
            .context("failed to update category")?;
        Ok(())
    }

    fn delete_category(&mut self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])
            .context("failed to delete category")?;
        Ok(())
    }

    fn category_by_id(&mut self, id: i64) -> Result<Option<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color FROM categories WHERE id = ?1")?;
        let mut rows = stmt
            .query_map(params![id], map_category_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("failed to load category {id}"))?;
        Ok(rows.pop())
    }

    fn list_categories(&mut self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color FROM categories ORDER BY name ASC")?;
        let categories = stmt
            .query_map(params![], map_category_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load categories")?;
        Ok(categories)
    }
}

fn map_category_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
    })
}

fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        due_at: row
            .get::<_, Option<String>>(3)?
            .map(|raw| parse_due_column(raw, 3))
            .transpose()?,
        priority: Priority::from_rank(row.get(4)?),
        category_id: row.get(5)?,
        completed: row.get(6)?,
        kind: row.get(7)?,
    })
}

fn parse_due_column(value: String, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

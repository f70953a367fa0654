//! Employee CRUD operations.

use super::{Database, map_constraint_error, ms_to_datetime, now_ms};
use crate::types::{Employee, EmployeePatch, NewEmployee};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

const EMPLOYEE_COLUMNS: &str =
    "id, name, email, department, position, created_at, updated_at";

pub fn parse_employee_row(row: &Row) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        department: row.get("department")?,
        position: row.get("position")?,
        created_at: ms_to_datetime(row.get("created_at")?)?,
        updated_at: ms_to_datetime(row.get("updated_at")?)?,
    })
}

/// Internal helper to get an employee using an existing connection (avoids deadlock).
fn get_employee_internal(conn: &Connection, id: i64) -> Result<Option<Employee>> {
    let employee = conn
        .query_row(
            &format!("SELECT {} FROM employees WHERE id = ?1", EMPLOYEE_COLUMNS),
            params![id],
            parse_employee_row,
        )
        .optional()?;
    Ok(employee)
}

/// All employees ordered by name, using an existing connection.
pub(crate) fn list_employees_internal(conn: &Connection) -> Result<Vec<Employee>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM employees ORDER BY name COLLATE NOCASE, id",
        EMPLOYEE_COLUMNS
    ))?;
    let employees = stmt
        .query_map([], parse_employee_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(employees)
}

impl Database {
    /// Create a new employee.
    pub fn create_employee(&self, data: NewEmployee) -> Result<Employee> {
        let now = now_ms();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO employees (name, email, department, position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![data.name, data.email, data.department, data.position, now],
            )
            .map_err(map_constraint_error)?;

            let id = conn.last_insert_rowid();
            info!(employee_id = id, "Created employee");

            Ok(Employee {
                id,
                name: data.name,
                email: data.email,
                department: data.department,
                position: data.position,
                created_at: ms_to_datetime(now)?,
                updated_at: ms_to_datetime(now)?,
            })
        })
    }

    /// Get an employee by ID.
    pub fn get_employee(&self, id: i64) -> Result<Option<Employee>> {
        self.with_conn(|conn| get_employee_internal(conn, id))
    }

    /// List all employees, ordered by name.
    pub fn list_employees(&self) -> Result<Vec<Employee>> {
        self.with_conn(list_employees_internal)
    }

    /// Apply a partial update. Returns `None` if the employee does not exist.
    pub fn update_employee(&self, id: i64, patch: EmployeePatch) -> Result<Option<Employee>> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(employee) = get_employee_internal(&tx, id)? else {
                return Ok(None);
            };

            let name = patch.name.unwrap_or(employee.name);
            let email = patch.email.unwrap_or(employee.email);
            let department = patch.department.unwrap_or(employee.department);
            let position = patch.position.unwrap_or(employee.position);

            tx.execute(
                "UPDATE employees SET
                    name = ?1, email = ?2, department = ?3, position = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![name, email, department, position, now, id],
            )
            .map_err(map_constraint_error)?;

            tx.commit()?;

            Ok(Some(Employee {
                name,
                email,
                department,
                position,
                updated_at: ms_to_datetime(now)?,
                ..employee
            }))
        })
    }

    /// Delete an employee together with every task assigned to them.
    ///
    /// Both deletes run in one transaction. Returns `false` when no employee
    /// with this ID existed.
    pub fn delete_employee(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let removed_tasks =
                tx.execute("DELETE FROM tasks WHERE employee_id = ?1", params![id])?;
            let removed = tx.execute("DELETE FROM employees WHERE id = ?1", params![id])?;

            tx.commit()?;

            if removed > 0 {
                info!(employee_id = id, removed_tasks, "Deleted employee");
            }
            Ok(removed > 0)
        })
    }
}

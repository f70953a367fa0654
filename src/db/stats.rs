//! Dashboard aggregation.
//!
//! Statistics are recomputed from the full employee and task collections on
//! every call; nothing is cached.

use super::Database;
use super::employees::list_employees_internal;
use super::tasks::list_all_tasks_internal;
use crate::types::{
    DashboardStats, Employee, EmployeeTaskCount, Priority, Task, TaskStatus, TasksByPriority,
};
use anyhow::Result;
use rusqlite::TransactionBehavior;
use std::collections::HashMap;
use tracing::debug;

/// Whole-number percentage of `part` in `total`, rounding halves up.
///
/// Returns 0 when `total` is 0.
pub fn completion_rate(part: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    // round(part * 100 / total) == floor((200 * part + total) / (2 * total))
    let rate = (200 * part + total) / (2 * total);
    rate.min(100) as u8
}

/// Compute dashboard statistics from a snapshot of employees and tasks.
///
/// Every employee gets an entry in `tasks_by_employee`, in the order given,
/// even with zero tasks. Unassigned tasks count toward the totals but not
/// toward any employee.
pub fn compute_dashboard_stats(employees: &[Employee], tasks: &[Task]) -> DashboardStats {
    let mut completed = 0u64;
    let mut pending = 0u64;
    let mut in_progress = 0u64;
    let mut by_priority = TasksByPriority::default();
    let mut per_employee: HashMap<i64, u64> = HashMap::new();

    for task in tasks {
        match task.status {
            TaskStatus::Completed => completed += 1,
            TaskStatus::Pending => pending += 1,
            TaskStatus::InProgress => in_progress += 1,
        }

        match task.priority {
            Priority::High => by_priority.high += 1,
            Priority::Medium => by_priority.medium += 1,
            Priority::Low => by_priority.low += 1,
        }

        if let Some(employee_id) = task.employee_id {
            *per_employee.entry(employee_id).or_default() += 1;
        }
    }

    let total_tasks = tasks.len() as u64;

    let tasks_by_employee = employees
        .iter()
        .map(|e| EmployeeTaskCount {
            employee_id: e.id,
            employee_name: e.name.clone(),
            task_count: per_employee.get(&e.id).copied().unwrap_or(0),
        })
        .collect();

    DashboardStats {
        total_tasks,
        completed_tasks: completed,
        pending_tasks: pending,
        in_progress_tasks: in_progress,
        completion_rate: completion_rate(completed, total_tasks),
        total_employees: employees.len() as u64,
        tasks_by_priority: by_priority,
        tasks_by_employee,
    }
}

impl Database {
    /// Compute dashboard statistics from the current database contents.
    ///
    /// Both collections are read inside one transaction so the snapshot is
    /// consistent; if either read fails no statistics are returned.
    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        let (employees, tasks) = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let tasks = list_all_tasks_internal(&tx)?;
            let employees = list_employees_internal(&tx)?;
            tx.commit()?;
            Ok((employees, tasks))
        })?;

        debug!(
            employees = employees.len(),
            tasks = tasks.len(),
            "Computing dashboard stats"
        );

        Ok(compute_dashboard_stats(&employees, &tasks))
    }
}

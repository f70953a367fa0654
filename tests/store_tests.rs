//! Integration tests for the database layer.
//!
//! These tests exercise the store operations against an in-memory SQLite
//! database. Tests are grouped by entity.

use chrono::{TimeZone, Utc};
use std::time::Duration;
use task_roster::db::Database;
use task_roster::error::{ApiError, ErrorCode};
use task_roster::types::{
    EmployeePatch, NewEmployee, NewTask, Priority, TaskFilter, TaskPatch, TaskStatus,
};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn new_employee(name: &str, email: &str) -> NewEmployee {
    NewEmployee {
        name: name.to_string(),
        email: email.to_string(),
        department: None,
        position: None,
    }
}

fn assigned(title: &str, employee_id: i64) -> NewTask {
    NewTask {
        employee_id: Some(employee_id),
        ..NewTask::titled(title)
    }
}

mod employee_tests {
    use super::*;

    #[test]
    fn create_employee_assigns_id_and_timestamps() {
        let db = setup_db();

        let employee = db
            .create_employee(NewEmployee {
                department: Some("Ops".to_string()),
                ..new_employee("Ann", "a@x.com")
            })
            .expect("Failed to create employee");

        assert_eq!(employee.id, 1);
        assert_eq!(employee.name, "Ann");
        assert_eq!(employee.department.as_deref(), Some("Ops"));
        assert!(employee.position.is_none());
        assert_eq!(employee.created_at, employee.updated_at);

        let fetched = db.get_employee(employee.id).unwrap().unwrap();
        assert_eq!(fetched, employee);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = setup_db();
        db.create_employee(new_employee("Ann", "a@x.com")).unwrap();

        let err = db
            .create_employee(new_employee("Another Ann", "a@x.com"))
            .unwrap_err();

        assert_eq!(ApiError::from(err).code, ErrorCode::DuplicateEmail);
        assert_eq!(db.list_employees().unwrap().len(), 1);
    }

    #[test]
    fn list_employees_sorted_by_name() {
        let db = setup_db();
        db.create_employee(new_employee("carol", "c@x.com")).unwrap();
        db.create_employee(new_employee("Ann", "a@x.com")).unwrap();
        db.create_employee(new_employee("bob", "b@x.com")).unwrap();

        let names: Vec<_> = db
            .list_employees()
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();

        assert_eq!(names, vec!["Ann", "bob", "carol"]);
    }

    #[test]
    fn update_employee_merges_fields() {
        let db = setup_db();
        let employee = db
            .create_employee(NewEmployee {
                department: Some("Ops".to_string()),
                position: Some("Lead".to_string()),
                ..new_employee("Ann", "a@x.com")
            })
            .unwrap();

        let updated = db
            .update_employee(
                employee.id,
                EmployeePatch {
                    name: Some("Ann B".to_string()),
                    position: Some(None),
                    ..EmployeePatch::default()
                },
            )
            .unwrap()
            .expect("employee exists");

        assert_eq!(updated.name, "Ann B");
        assert_eq!(updated.email, "a@x.com");
        assert_eq!(updated.department.as_deref(), Some("Ops"));
        assert!(updated.position.is_none());
        assert_eq!(updated.created_at, employee.created_at);
        assert!(updated.updated_at >= employee.updated_at);
    }

    #[test]
    fn update_missing_employee_returns_none() {
        let db = setup_db();
        let result = db.update_employee(42, EmployeePatch::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn update_to_taken_email_is_rejected() {
        let db = setup_db();
        db.create_employee(new_employee("Ann", "a@x.com")).unwrap();
        let bob = db.create_employee(new_employee("Bob", "b@x.com")).unwrap();

        let err = db
            .update_employee(
                bob.id,
                EmployeePatch {
                    email: Some("a@x.com".to_string()),
                    ..EmployeePatch::default()
                },
            )
            .unwrap_err();

        assert_eq!(ApiError::from(err).code, ErrorCode::DuplicateEmail);
        assert_eq!(db.get_employee(bob.id).unwrap().unwrap().email, "b@x.com");
    }

    #[test]
    fn delete_employee_removes_their_tasks_only() {
        let db = setup_db();
        let ann = db.create_employee(new_employee("Ann", "a@x.com")).unwrap();
        let bob = db.create_employee(new_employee("Bob", "b@x.com")).unwrap();
        db.create_task(assigned("Ann 1", ann.id)).unwrap();
        db.create_task(assigned("Ann 2", ann.id)).unwrap();
        let bobs = db.create_task(assigned("Bob 1", bob.id)).unwrap();
        let loose = db.create_task(NewTask::titled("Unassigned")).unwrap();

        assert!(db.delete_employee(ann.id).unwrap());

        assert!(db.get_employee(ann.id).unwrap().is_none());
        let remaining: Vec<_> = db
            .list_all_tasks()
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(remaining, vec![bobs.id, loose.id]);
    }

    #[test]
    fn delete_missing_employee_returns_false() {
        let db = setup_db();
        assert!(!db.delete_employee(7).unwrap());
    }
}

mod task_tests {
    use super::*;

    #[test]
    fn create_task_applies_defaults() {
        let db = setup_db();

        let task = db.create_task(NewTask::titled("Write report")).unwrap();

        assert_eq!(task.title, "Write report");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.employee_id.is_none());
        assert!(task.due_date.is_none());
    }

    #[test]
    fn create_task_keeps_due_date() {
        let db = setup_db();
        let due = Utc.with_ymd_and_hms(2030, 1, 15, 0, 0, 0).unwrap();

        let task = db
            .create_task(NewTask {
                due_date: Some(due),
                ..NewTask::titled("Ship it")
            })
            .unwrap();

        assert_eq!(task.due_date, Some(due));
        assert_eq!(db.get_task(task.id).unwrap().unwrap().due_date, Some(due));
    }

    #[test]
    fn create_task_for_unknown_employee_is_rejected() {
        let db = setup_db();

        let err = db.create_task(assigned("Orphan", 99)).unwrap_err();

        assert_eq!(ApiError::from(err).code, ErrorCode::InvalidReference);
        assert!(db.list_all_tasks().unwrap().is_empty());
    }

    #[test]
    fn list_tasks_filters_combine() {
        let db = setup_db();
        let ann = db.create_employee(new_employee("Ann", "a@x.com")).unwrap();
        let bob = db.create_employee(new_employee("Bob", "b@x.com")).unwrap();
        let a1 = db.create_task(assigned("A1", ann.id)).unwrap();
        let a2 = db
            .create_task(NewTask {
                status: TaskStatus::Completed,
                ..assigned("A2", ann.id)
            })
            .unwrap();
        db.create_task(NewTask {
            status: TaskStatus::Completed,
            ..assigned("B1", bob.id)
        })
        .unwrap();

        let anns = db
            .list_tasks(&TaskFilter {
                employee_id: Some(ann.id),
                status: None,
            })
            .unwrap();
        assert_eq!(anns.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a1.id, a2.id]);

        let anns_done = db
            .list_tasks(&TaskFilter {
                employee_id: Some(ann.id),
                status: Some(TaskStatus::Completed),
            })
            .unwrap();
        assert_eq!(anns_done.len(), 1);
        assert_eq!(anns_done[0].id, a2.id);

        let all_done = db
            .list_tasks(&TaskFilter {
                employee_id: None,
                status: Some(TaskStatus::Completed),
            })
            .unwrap();
        assert_eq!(all_done.len(), 2);

        assert_eq!(db.list_tasks(&TaskFilter::default()).unwrap().len(), 3);
    }

    #[test]
    fn update_task_only_touches_present_fields() {
        let db = setup_db();
        let ann = db.create_employee(new_employee("Ann", "a@x.com")).unwrap();
        let task = db
            .create_task(NewTask {
                description: Some("draft".to_string()),
                priority: Priority::High,
                ..assigned("Write report", ann.id)
            })
            .unwrap();

        let updated = db
            .update_task(
                task.id,
                TaskPatch {
                    title: Some("Write final report".to_string()),
                    description: Some(None),
                    employee_id: Some(None),
                    ..TaskPatch::default()
                },
            )
            .unwrap()
            .expect("task exists");

        assert_eq!(updated.title, "Write final report");
        assert!(updated.description.is_none());
        assert!(updated.employee_id.is_none());
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.status, TaskStatus::Pending);
        assert_eq!(updated.created_at, task.created_at);
    }

    #[test]
    fn reassigning_to_unknown_employee_leaves_task_unchanged() {
        let db = setup_db();
        let ann = db.create_employee(new_employee("Ann", "a@x.com")).unwrap();
        let task = db.create_task(assigned("Write report", ann.id)).unwrap();

        let err = db
            .update_task(
                task.id,
                TaskPatch {
                    employee_id: Some(Some(99)),
                    ..TaskPatch::default()
                },
            )
            .unwrap_err();

        assert_eq!(ApiError::from(err).code, ErrorCode::InvalidReference);
        assert_eq!(db.get_task(task.id).unwrap().unwrap().employee_id, Some(ann.id));
    }

    #[test]
    fn set_task_status_round_trips_and_refreshes_updated_at() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("Toggle me")).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let done = db
            .set_task_status(task.id, TaskStatus::Completed)
            .unwrap()
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.updated_at > task.updated_at);
        assert_eq!(done.created_at, task.created_at);
        assert_eq!(db.get_task(task.id).unwrap().unwrap(), done);

        let undone = db
            .set_task_status(task.id, TaskStatus::Pending)
            .unwrap()
            .unwrap();
        assert_eq!(undone.status, TaskStatus::Pending);
    }

    #[test]
    fn due_date_kept_when_omitted_and_cleared_by_null() {
        let db = setup_db();
        let due = Utc.with_ymd_and_hms(2030, 1, 15, 0, 0, 0).unwrap();
        let task = db
            .create_task(NewTask {
                due_date: Some(due),
                ..NewTask::titled("Ship")
            })
            .unwrap();

        let renamed = db
            .update_task(
                task.id,
                TaskPatch {
                    title: Some("Ship v2".to_string()),
                    ..TaskPatch::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(renamed.due_date, Some(due));

        let cleared = db
            .update_task(
                task.id,
                TaskPatch {
                    due_date: Some(None),
                    ..TaskPatch::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(cleared.due_date.is_none());
        assert!(db.get_task(task.id).unwrap().unwrap().due_date.is_none());
    }

    #[test]
    fn missing_tasks_report_none_and_false() {
        let db = setup_db();
        assert!(db.get_task(5).unwrap().is_none());
        assert!(db.update_task(5, TaskPatch::default()).unwrap().is_none());
        assert!(db.set_task_status(5, TaskStatus::Completed).unwrap().is_none());
        assert!(!db.delete_task(5).unwrap());
    }

    #[test]
    fn delete_task_removes_it() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("Gone soon")).unwrap();

        assert!(db.delete_task(task.id).unwrap());
        assert!(db.get_task(task.id).unwrap().is_none());
        assert!(!db.delete_task(task.id).unwrap());
    }
}

mod persistence_tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn data_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("roster.db");

        {
            let db = Database::open(&path).unwrap();
            let ann = db.create_employee(new_employee("Ann", "a@x.com")).unwrap();
            db.create_task(assigned("Write report", ann.id)).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_employees().unwrap().len(), 1);
        assert_eq!(db.list_all_tasks().unwrap().len(), 1);
    }
}

mod schema_tests {
    use super::*;

    fn columns(db: &Database, table: &str) -> Vec<String> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .unwrap()
    }

    #[test]
    fn migrations_create_both_tables() {
        let db = setup_db();

        assert_eq!(
            columns(&db, "employees"),
            vec!["id", "name", "email", "department", "position", "created_at", "updated_at"]
        );
        assert_eq!(
            columns(&db, "tasks"),
            vec![
                "id",
                "employee_id",
                "title",
                "description",
                "due_date",
                "priority",
                "status",
                "created_at",
                "updated_at"
            ]
        );
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let db = setup_db();
        let enabled: i64 = db
            .with_conn(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn enum_columns_reject_unknown_values() {
        let db = setup_db();
        let result = db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (title, priority, status, created_at, updated_at)
                 VALUES ('t', 'urgent', 'pending', 0, 0)",
                [],
            )?;
            Ok(())
        });
        assert!(result.is_err());
    }
}

//! Request payload validation.
//!
//! Turns raw JSON bodies into the typed inputs the store accepts. Nothing in
//! here touches the database; a payload that fails validation never reaches
//! it.

use crate::error::{ApiError, FieldError};
use crate::types::{EmployeePatch, NewEmployee, NewTask, Priority, TaskPatch, TaskStatus};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::str::FromStr;

const NAME_MAX: usize = 255;
const EMAIL_MAX: usize = 255;
const DEPARTMENT_MAX: usize = 100;
const POSITION_MAX: usize = 100;

/// Largest magnitude accepted for an epoch-millisecond due date
/// (100,000,000 days either side of the epoch).
const MAX_EPOCH_MS: f64 = 8.64e15;

const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Largest integer a float id may carry without losing precision (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Outcome of reading `dueDate` from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueDate {
    /// The property is not in the payload.
    Absent,
    /// The property is explicitly `null`.
    Clear,
    /// The property holds a valid date.
    At(DateTime<Utc>),
}

impl DueDate {
    /// Value to store on create; absent and null both mean "no due date".
    pub fn for_create(self) -> Option<DateTime<Utc>> {
        match self {
            DueDate::At(d) => Some(d),
            DueDate::Absent | DueDate::Clear => None,
        }
    }

    /// Patch value on update; absent leaves the stored value alone.
    pub fn for_patch(self) -> Option<Option<DateTime<Utc>>> {
        match self {
            DueDate::Absent => None,
            DueDate::Clear => Some(None),
            DueDate::At(d) => Some(Some(d)),
        }
    }
}

/// Parse a non-null JSON value as a date.
///
/// Numbers are epoch milliseconds. Strings may be RFC 3339 (the offset with or
/// without a colon), RFC 2822, a calendar date, or a naive date-time; values
/// without an offset are UTC.
pub fn parse_date_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let ms = n.as_i64().map(|v| v as f64).or_else(|| n.as_f64())?;
            if !ms.is_finite() || ms.abs() > MAX_EPOCH_MS {
                return None;
            }
            DateTime::from_timestamp_millis(ms.trunc() as i64)
        }
        Value::String(s) => parse_date_str(s.trim()),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    if let Some(d) = OFFSET_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(s) {
        return Some(d.with_timezone(&Utc));
    }
    if let Some(date) = parse_calendar_date(s) {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.and_utc())
}

/// A date without a time: `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY-MM` (first of
/// the month) or a bare four-digit `YYYY` (first of January).
fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    {
        return Some(date);
    }
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::from_ymd_opt(s.parse().ok()?, 1, 1);
    }
    if s.len() == 7 {
        return NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok();
    }
    None
}

/// Read and normalize `dueDate` from a payload object.
///
/// Only a present, non-null value is checked; it must parse as a date.
pub fn normalize_due_date(body: &Map<String, Value>) -> Result<DueDate, FieldError> {
    match body.get("dueDate") {
        None => Ok(DueDate::Absent),
        Some(Value::Null) => Ok(DueDate::Clear),
        Some(value) => parse_date_value(value)
            .map(DueDate::At)
            .ok_or_else(|| FieldError::new("dueDate", "Invalid dueDate")),
    }
}

/// Parse a positive integer path or query id.
pub fn parse_id(raw: &str, entity: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::invalid_id(entity))
}

/// Parse an optional `status` query filter. An empty value means no filter.
pub fn parse_status_filter(raw: Option<&str>) -> Result<Option<TaskStatus>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => TaskStatus::from_str(s).map(Some).map_err(|message| {
            ApiError::validation(
                "Invalid task filter",
                vec![FieldError::new("status", message)],
            )
        }),
    }
}

/// Parse an optional `employeeId` query filter. An empty value means no filter.
pub fn parse_employee_filter(raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_id(s, "employee").map(Some),
    }
}

/// Collected field errors for one payload.
#[derive(Debug)]
pub struct ValidationErrors {
    entity: &'static str,
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(v: ValidationErrors) -> Self {
        if v.errors.iter().any(|e| e.field == "dueDate") {
            return ApiError::invalid_due_date().with_errors(v.errors);
        }
        ApiError::validation(format!("Invalid {} data", v.entity), v.errors)
    }
}

/// An integral JSON number. `1.0` counts; `1.5` does not.
fn whole_number(n: &serde_json::Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER)
            .map(|f| f as i64)
    })
}

/// Field reader that accumulates errors instead of stopping at the first.
struct Fields<'a> {
    body: &'a Map<String, Value>,
    errors: Vec<FieldError>,
}

impl<'a> Fields<'a> {
    fn new(body: &'a Map<String, Value>) -> Self {
        Self {
            body,
            errors: Vec::new(),
        }
    }

    fn reject(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    fn check_string(
        &mut self,
        field: &str,
        value: &str,
        max: Option<usize>,
        non_empty: bool,
    ) -> Option<String> {
        let value = if non_empty { value.trim() } else { value };
        if non_empty && value.is_empty() {
            self.reject(field, format!("{} must not be empty", field));
            return None;
        }
        if let Some(max) = max
            && value.chars().count() > max
        {
            self.reject(field, format!("{} must be at most {} characters", field, max));
            return None;
        }
        Some(value.to_string())
    }

    /// A string that must be present and non-empty.
    fn required_string(&mut self, field: &str, max: Option<usize>) -> Option<String> {
        let body = self.body;
        match body.get(field) {
            None | Some(Value::Null) => {
                self.reject(field, format!("{} is required", field));
                None
            }
            Some(Value::String(s)) => self.check_string(field, s, max, true),
            Some(_) => {
                self.reject(field, format!("{} must be a string", field));
                None
            }
        }
    }

    /// A string that, when present, must be non-empty. `null` is rejected.
    fn patch_string(&mut self, field: &str, max: Option<usize>) -> Option<String> {
        let body = self.body;
        match body.get(field) {
            None => None,
            Some(Value::String(s)) => self.check_string(field, s, max, true),
            Some(Value::Null) => {
                self.reject(field, format!("{} cannot be null", field));
                None
            }
            Some(_) => {
                self.reject(field, format!("{} must be a string", field));
                None
            }
        }
    }

    /// A nullable string: absent → `None`, null → `Some(None)`.
    fn nullable_string(&mut self, field: &str, max: Option<usize>) -> Option<Option<String>> {
        let body = self.body;
        match body.get(field) {
            None => None,
            Some(Value::Null) => Some(None),
            Some(Value::String(s)) => self.check_string(field, s, max, false).map(Some),
            Some(_) => {
                self.reject(field, format!("{} must be a string or null", field));
                None
            }
        }
    }

    /// A nullable positive integer reference: absent → `None`, null → `Some(None)`.
    fn nullable_id(&mut self, field: &str) -> Option<Option<i64>> {
        let body = self.body;
        match body.get(field) {
            None => None,
            Some(Value::Null) => Some(None),
            Some(Value::Number(n)) => match whole_number(n).filter(|id| *id > 0) {
                Some(id) => Some(Some(id)),
                None => {
                    self.reject(field, format!("{} must be a positive integer", field));
                    None
                }
            },
            Some(_) => {
                self.reject(field, format!("{} must be a positive integer or null", field));
                None
            }
        }
    }

    /// An enumeration member given as a string. `null` is rejected.
    fn enum_value<T: FromStr<Err = String>>(&mut self, field: &str) -> Option<T> {
        let body = self.body;
        match body.get(field) {
            None => None,
            Some(Value::String(s)) => match s.parse() {
                Ok(v) => Some(v),
                Err(message) => {
                    self.reject(field, message);
                    None
                }
            },
            Some(_) => {
                self.reject(field, format!("{} must be a string", field));
                None
            }
        }
    }

    fn due_date(&mut self) -> DueDate {
        match normalize_due_date(self.body) {
            Ok(due) => due,
            Err(err) => {
                self.errors.push(err);
                DueDate::Absent
            }
        }
    }

    fn finish<T>(self, entity: &'static str, value: T) -> Result<T, ValidationErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(ValidationErrors {
                entity,
                errors: self.errors,
            })
        }
    }
}

fn as_object<'a>(
    body: &'a Value,
    entity: &'static str,
) -> Result<&'a Map<String, Value>, ValidationErrors> {
    body.as_object().ok_or_else(|| ValidationErrors {
        entity,
        errors: vec![FieldError::new("body", "expected a JSON object")],
    })
}

/// Validate an employee creation payload.
///
/// `id`, `createdAt`, `updatedAt` and unknown keys are ignored.
pub fn validate_new_employee(body: &Value) -> Result<NewEmployee, ValidationErrors> {
    let obj = as_object(body, "employee")?;
    let mut f = Fields::new(obj);

    let name = f.required_string("name", Some(NAME_MAX));
    let email = f.required_string("email", Some(EMAIL_MAX));
    let department = f.nullable_string("department", Some(DEPARTMENT_MAX)).flatten();
    let position = f.nullable_string("position", Some(POSITION_MAX)).flatten();

    match (name, email) {
        (Some(name), Some(email)) => f.finish(
            "employee",
            NewEmployee {
                name,
                email,
                department,
                position,
            },
        ),
        _ => Err(ValidationErrors {
            entity: "employee",
            errors: f.errors,
        }),
    }
}

/// Validate an employee update payload. Absent fields are left untouched.
pub fn validate_employee_patch(body: &Value) -> Result<EmployeePatch, ValidationErrors> {
    let obj = as_object(body, "employee")?;
    let mut f = Fields::new(obj);

    let patch = EmployeePatch {
        name: f.patch_string("name", Some(NAME_MAX)),
        email: f.patch_string("email", Some(EMAIL_MAX)),
        department: f.nullable_string("department", Some(DEPARTMENT_MAX)),
        position: f.nullable_string("position", Some(POSITION_MAX)),
    };

    f.finish("employee", patch)
}

/// Validate a task creation payload, applying priority and status defaults.
pub fn validate_new_task(body: &Value) -> Result<NewTask, ValidationErrors> {
    let obj = as_object(body, "task")?;
    let mut f = Fields::new(obj);

    let due_date = f.due_date();
    let title = f.required_string("title", None);
    let employee_id = f.nullable_id("employeeId").flatten();
    let description = f.nullable_string("description", None).flatten();
    let priority = f.enum_value::<Priority>("priority").unwrap_or_default();
    let status = f.enum_value::<TaskStatus>("status").unwrap_or_default();

    match title {
        Some(title) => f.finish(
            "task",
            NewTask {
                employee_id,
                title,
                description,
                due_date: due_date.for_create(),
                priority,
                status,
            },
        ),
        None => Err(ValidationErrors {
            entity: "task",
            errors: f.errors,
        }),
    }
}

/// Validate a task update payload. Absent fields are left untouched.
pub fn validate_task_patch(body: &Value) -> Result<TaskPatch, ValidationErrors> {
    let obj = as_object(body, "task")?;
    let mut f = Fields::new(obj);

    let due_date = f.due_date();
    let patch = TaskPatch {
        employee_id: f.nullable_id("employeeId"),
        title: f.patch_string("title", None),
        description: f.nullable_string("description", None),
        due_date: due_date.for_patch(),
        priority: f.enum_value("priority"),
        status: f.enum_value("status"),
    };

    f.finish("task", patch)
}

/// Validate a status-change payload (`{"status": ...}`).
pub fn validate_status_change(body: &Value) -> Result<TaskStatus, ValidationErrors> {
    let obj = as_object(body, "task")?;
    let mut f = Fields::new(obj);

    let status = f.enum_value::<TaskStatus>("status");
    if status.is_none() && !obj.contains_key("status") {
        f.reject("status", "status is required");
    }

    match status {
        Some(status) => f.finish("task", status),
        None => Err(ValidationErrors {
            entity: "task",
            errors: f.errors,
        }),
    }
}

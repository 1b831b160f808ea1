//! Workforce (WPMS) tools: employees, skills, shifts, assignments, training.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::{Value, json};
use shopfloor_core::{Error, Result};
use shopfloor_store::document::{
    EMPLOYEE_SKILLS, EMPLOYEES, MACHINE_ASSIGNMENTS, MACHINES, SHIFT_SCHEDULES, TRAINING_RECORDS,
};
use shopfloor_store::{DataStore, DocumentKind, Lookup};

use super::{generated_id, matches, now};
use crate::registry::ToolDescriptor;
use crate::schema::ParamSpec;

/// Workforce tool table.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "get_factory_management",
            "Get plant manager, maintenance manager and purchasing contacts",
            vec![],
            get_factory_management,
        ),
        ToolDescriptor::new(
            "get_employees",
            "Get employees, optionally filtered by role, shift and department",
            vec![
                ParamSpec::string("role", "Role (operator, maintenance_tech)"),
                ParamSpec::string("shift", "Shift (morning, afternoon, night)"),
                ParamSpec::string("department", "Department name"),
            ],
            get_employees,
        ),
        ToolDescriptor::new(
            "get_employee_skills",
            "Get one employee with their machine skill ratings",
            vec![ParamSpec::string("employee_id", "Employee ID").required()],
            get_employee_skills,
        ),
        ToolDescriptor::new(
            "get_machine_assignments",
            "Get machine assignments, optionally filtered by employee and machine",
            vec![
                ParamSpec::string("employee_id", "Employee ID to filter by"),
                ParamSpec::string("machine_id", "Machine ID to filter by"),
            ],
            get_machine_assignments,
        ),
        ToolDescriptor::new(
            "get_shift_schedules",
            "Get shift schedules, optionally filtered by employee and date (YYYY-MM-DD)",
            vec![
                ParamSpec::string("employee_id", "Employee ID to filter by"),
                ParamSpec::string("date", "Date to filter by"),
            ],
            get_shift_schedules,
        ),
        ToolDescriptor::new(
            "get_workforce_metrics",
            "Get workforce KPIs",
            vec![],
            get_workforce_metrics,
        ),
        ToolDescriptor::new(
            "get_training_records",
            "Get training records, optionally for one employee",
            vec![ParamSpec::string("employee_id", "Employee ID to filter by")],
            get_training_records,
        ),
        ToolDescriptor::new(
            "find_qualified_employees",
            "Find employees rated at or above a skill level on a machine",
            vec![
                ParamSpec::string("machine_id", "Machine ID").required(),
                ParamSpec::integer("min_skill_level", "Minimum skill level (1-5)")
                    .range(1, 5)
                    .default_value(json!(3)),
            ],
            find_qualified_employees,
        ),
        ToolDescriptor::new(
            "get_available_employees",
            "Get employees scheduled and not absent for a shift on a date",
            vec![
                ParamSpec::string("shift", "Shift (morning, afternoon, night)").required(),
                ParamSpec::string("date", "Date (YYYY-MM-DD)").required(),
            ],
            get_available_employees,
        ),
        ToolDescriptor::new(
            "create_machine_assignment",
            "Assign an employee to a machine for a time window",
            vec![
                ParamSpec::string("employee_id", "Employee to assign")
                    .required()
                    .references(EMPLOYEES),
                ParamSpec::string("machine_id", "Machine to assign to")
                    .required()
                    .references(MACHINES),
                ParamSpec::string("start_time", "Start (RFC 3339)").required(),
                ParamSpec::string("end_time", "End (RFC 3339)").required(),
                ParamSpec::string("assignment_type", "operation, maintenance, training or setup")
                    .default_value(json!("operation")),
            ],
            create_machine_assignment,
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
struct EmployeeFilter {
    role: Option<String>,
    shift: Option<String>,
    department: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmployeeArgs {
    employee_id: String,
}

#[derive(Debug, Deserialize)]
struct AssignmentFilter {
    employee_id: Option<String>,
    machine_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScheduleFilter {
    employee_id: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OptionalEmployee {
    employee_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QualifiedArgs {
    machine_id: String,
    min_skill_level: i64,
}

#[derive(Debug, Deserialize)]
struct AvailabilityArgs {
    shift: String,
    date: String,
}

#[derive(Debug, Deserialize)]
struct CreateAssignmentArgs {
    employee_id: String,
    machine_id: String,
    start_time: String,
    end_time: String,
    assignment_type: String,
}

async fn get_factory_management(store: Arc<DataStore>, _args: NoArgs) -> Result<Value> {
    let management = store.section(DocumentKind::Factory, "management").await?;
    let part = |key: &str| management.get(key).cloned().unwrap_or_else(|| json!({}));
    Ok(json!({
        "plant_manager": part("plant_manager"),
        "maintenance_manager": part("maintenance_manager"),
        "purchasing_department": part("purchasing_department"),
        "management": management,
    }))
}

async fn get_employees(store: Arc<DataStore>, args: EmployeeFilter) -> Result<Value> {
    let role = args.role.map(|r| r.to_lowercase());
    let shift = args.shift.map(|s| s.to_lowercase());
    let employees = store
        .query(&EMPLOYEES, |e| {
            matches(e, "role", role.as_deref())
                && matches(e, "shift", shift.as_deref())
                && matches(e, "department", args.department.as_deref())
        })
        .await?;
    Ok(json!({
        "total_employees": employees.len(),
        "employees": employees,
    }))
}

async fn get_employee_skills(store: Arc<DataStore>, args: EmployeeArgs) -> Result<Value> {
    let employee = match store.get_by_id(&EMPLOYEES, &args.employee_id).await? {
        Lookup::Found(employee) => employee,
        Lookup::NotFound(nf) => return Ok(nf.to_value()),
    };
    let id = Some(args.employee_id.as_str());
    let skills = store
        .query(&EMPLOYEE_SKILLS, |s| matches(s, "employee_id", id))
        .await?;
    Ok(json!({
        "found": true,
        "employee": employee,
        "total_skills": skills.len(),
        "skills": skills,
    }))
}

async fn get_machine_assignments(store: Arc<DataStore>, args: AssignmentFilter) -> Result<Value> {
    let assignments = store
        .query(&MACHINE_ASSIGNMENTS, |a| {
            matches(a, "employee_id", args.employee_id.as_deref())
                && matches(a, "machine_id", args.machine_id.as_deref())
        })
        .await?;
    Ok(json!({
        "total_assignments": assignments.len(),
        "machine_assignments": assignments,
    }))
}

async fn get_shift_schedules(store: Arc<DataStore>, args: ScheduleFilter) -> Result<Value> {
    let schedules = store
        .query(&SHIFT_SCHEDULES, |s| {
            matches(s, "employee_id", args.employee_id.as_deref())
                && matches(s, "date", args.date.as_deref())
        })
        .await?;
    Ok(json!({
        "total_schedules": schedules.len(),
        "shift_schedules": schedules,
    }))
}

async fn get_workforce_metrics(store: Arc<DataStore>, _args: NoArgs) -> Result<Value> {
    let metrics = store
        .section(DocumentKind::Workforce, "workforce_metrics")
        .await?;
    Ok(json!({
        "workforce_metrics": metrics,
        "timestamp": now(),
    }))
}

async fn get_training_records(store: Arc<DataStore>, args: OptionalEmployee) -> Result<Value> {
    let records = store
        .query(&TRAINING_RECORDS, |r| {
            matches(r, "employee_id", args.employee_id.as_deref())
        })
        .await?;
    let mut out = json!({
        "total_records": records.len(),
        "training_records": records,
    });
    if let Some(employee_id) = args.employee_id {
        out["employee_id"] = json!(employee_id);
    }
    Ok(out)
}

async fn find_qualified_employees(store: Arc<DataStore>, args: QualifiedArgs) -> Result<Value> {
    let id = Some(args.machine_id.as_str());
    let skills = store
        .query(&EMPLOYEE_SKILLS, |s| {
            matches(s, "machine_id", id)
                && s.get("skill_level").and_then(Value::as_i64).unwrap_or(0) >= args.min_skill_level
        })
        .await?;

    let mut qualified = Vec::with_capacity(skills.len());
    for skill in &skills {
        let Some(employee_id) = skill.get("employee_id").and_then(Value::as_str) else {
            continue;
        };
        if let Lookup::Found(employee) = store.get_by_id(&EMPLOYEES, employee_id).await? {
            qualified.push(json!({
                "employee": employee,
                "skill_level": skill.get("skill_level"),
                "proficiency_level": skill.get("proficiency_level"),
                "certification_date": skill.get("certification_date"),
                "notes": skill.get("notes"),
            }));
        }
    }

    Ok(json!({
        "machine_id": args.machine_id,
        "min_skill_level": args.min_skill_level,
        "total_qualified": qualified.len(),
        "qualified_employees": qualified,
    }))
}

async fn get_available_employees(store: Arc<DataStore>, args: AvailabilityArgs) -> Result<Value> {
    let shift = args.shift.to_lowercase();
    let schedules = store
        .query(&SHIFT_SCHEDULES, |s| {
            matches(s, "shift", Some(shift.as_str()))
                && matches(s, "date", Some(args.date.as_str()))
                && s.get("status").and_then(Value::as_str) != Some("absent")
        })
        .await?;

    let mut available = Vec::with_capacity(schedules.len());
    for schedule in schedules {
        let Some(employee_id) = schedule.get("employee_id").and_then(Value::as_str) else {
            continue;
        };
        if let Lookup::Found(employee) = store.get_by_id(&EMPLOYEES, employee_id).await? {
            available.push(json!({"employee": employee, "schedule": schedule}));
        }
    }

    Ok(json!({
        "shift": args.shift,
        "date": args.date,
        "total_available": available.len(),
        "available_employees": available,
    }))
}

fn parse_time(field: &str, text: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text)
        .map_err(|e| Error::validation(format!("parameter '{field}' is not an RFC 3339 time: {e}")))
}

async fn create_machine_assignment(store: Arc<DataStore>, args: CreateAssignmentArgs) -> Result<Value> {
    let start = parse_time("start_time", &args.start_time)?;
    let end = parse_time("end_time", &args.end_time)?;
    if end <= start {
        return Err(Error::validation("end_time must be after start_time"));
    }

    let assignment = json!({
        "assignment_id": null,
        "employee_id": args.employee_id,
        "machine_id": args.machine_id,
        "start_time": args.start_time,
        "end_time": args.end_time,
        "assignment_type": args.assignment_type.to_lowercase(),
        "status": "scheduled",
    });

    let assignment = store
        .append(&MACHINE_ASSIGNMENTS, assignment, || generated_id("ASSIGN", 3, false))
        .await?;
    let assignment_id = assignment["assignment_id"].as_str().unwrap_or_default().to_string();
    log::info!(
        "Assigned {} to {} as {assignment_id}",
        args.employee_id,
        args.machine_id
    );

    Ok(json!({
        "assignment": assignment,
        "message": format!("Machine assignment {assignment_id} created successfully"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::registry;
    use crate::registry::ToolRegistry;
    use shopfloor_core::{ErrorKind, ServerDomain};
    use shopfloor_store::fixtures::fixture_dir;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ToolRegistry) {
        let dir = fixture_dir().unwrap();
        let store = Arc::new(DataStore::new(dir.path().to_path_buf()));
        (dir, registry(ServerDomain::Workforce, store).unwrap())
    }

    #[tokio::test]
    async fn test_factory_management() {
        let (_dir, reg) = setup();
        let env = reg.invoke("get_factory_management", Value::Null).await;
        let data = env.data().unwrap();
        assert_eq!(data["maintenance_manager"]["name"], json!("Tomas Berg"));
        assert!(data["purchasing_department"]["email"].is_string());
    }

    #[tokio::test]
    async fn test_employee_filters() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke("get_employees", json!({"role": "OPERATOR", "shift": "morning"}))
            .await;
        let data = env.data().unwrap();
        assert_eq!(data["total_employees"], json!(1));
        assert_eq!(data["employees"][0]["employee_id"], json!("E001"));
    }

    #[tokio::test]
    async fn test_employee_skills_found_and_not_found() {
        let (_dir, reg) = setup();
        let env = reg.invoke("get_employee_skills", json!({"employee_id": "E001"})).await;
        assert_eq!(env.data().unwrap()["total_skills"], json!(2));

        let missing = reg.invoke("get_employee_skills", json!({"employee_id": "E999"})).await;
        assert!(missing.is_success());
        assert_eq!(missing.data().unwrap()["found"], json!(false));
        assert_eq!(missing.data().unwrap()["entity"], json!("employee"));
    }

    #[tokio::test]
    async fn test_find_qualified_employees() {
        let (_dir, reg) = setup();
        let default_level = reg
            .invoke("find_qualified_employees", json!({"machine_id": "GB001"}))
            .await;
        let data = default_level.data().unwrap();
        assert_eq!(data["min_skill_level"], json!(3));
        assert_eq!(data["total_qualified"], json!(1));

        let low = reg
            .invoke("find_qualified_employees", json!({"machine_id": "GB001", "min_skill_level": 1}))
            .await;
        assert_eq!(low.data().unwrap()["total_qualified"], json!(2));

        let out_of_range = reg
            .invoke("find_qualified_employees", json!({"machine_id": "GB001", "min_skill_level": 6}))
            .await;
        assert_eq!(out_of_range.error().unwrap().kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_available_employees_exclude_absent() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke("get_available_employees", json!({"shift": "Morning", "date": "2026-10-19"}))
            .await;
        let data = env.data().unwrap();
        assert_eq!(data["total_available"], json!(1));
        assert_eq!(data["available_employees"][0]["employee"]["employee_id"], json!("E001"));
    }

    #[tokio::test]
    async fn test_create_machine_assignment() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke(
                "create_machine_assignment",
                json!({
                    "employee_id": "E004",
                    "machine_id": "NC001",
                    "start_time": "2026-10-20T22:00:00Z",
                    "end_time": "2026-10-21T06:00:00Z",
                    "assignment_type": "Setup"
                }),
            )
            .await;
        let assignment = &env.data().unwrap()["assignment"];
        assert_eq!(assignment["assignment_type"], json!("setup"));
        assert!(assignment["assignment_id"].as_str().unwrap().starts_with("ASSIGN-"));

        let listed = reg
            .invoke("get_machine_assignments", json!({"employee_id": "E004"}))
            .await;
        assert_eq!(listed.data().unwrap()["total_assignments"], json!(1));
    }

    #[tokio::test]
    async fn test_create_machine_assignment_rejects_bad_times() {
        let (_dir, reg) = setup();
        let reversed = reg
            .invoke(
                "create_machine_assignment",
                json!({
                    "employee_id": "E001",
                    "machine_id": "GB001",
                    "start_time": "2026-10-20T14:00:00Z",
                    "end_time": "2026-10-20T06:00:00Z"
                }),
            )
            .await;
        assert_eq!(reversed.error().unwrap().kind, ErrorKind::ValidationError);

        let garbage = reg
            .invoke(
                "create_machine_assignment",
                json!({
                    "employee_id": "E001",
                    "machine_id": "GB001",
                    "start_time": "tomorrow",
                    "end_time": "2026-10-20T06:00:00Z"
                }),
            )
            .await;
        assert_eq!(garbage.error().unwrap().kind, ErrorKind::ValidationError);

        let unknown_employee = reg
            .invoke(
                "create_machine_assignment",
                json!({
                    "employee_id": "E999",
                    "machine_id": "GB001",
                    "start_time": "2026-10-20T06:00:00Z",
                    "end_time": "2026-10-20T14:00:00Z"
                }),
            )
            .await;
        assert_eq!(unknown_employee.error().unwrap().kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_schedules_training_metrics() {
        let (_dir, reg) = setup();
        let shifts = reg.invoke("get_shift_schedules", json!({"date": "2026-10-19"})).await;
        assert_eq!(shifts.data().unwrap()["total_schedules"], json!(4));
        let training = reg.invoke("get_training_records", json!({"employee_id": "E004"})).await;
        assert_eq!(training.data().unwrap()["total_records"], json!(1));
        let metrics = reg.invoke("get_workforce_metrics", Value::Null).await;
        assert_eq!(metrics.data().unwrap()["workforce_metrics"]["headcount"], json!(4));
    }
}

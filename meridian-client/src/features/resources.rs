//! Resource management: employees and their assignments.

use crate::context::SyncContext;
use crate::http::{ApiRequest, ApiResponse};
use crate::resource::{record_path, Resource, ResourceSpec, Saved};
use meridian_cache::{InvalidationPlan, Mutation, MutationSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub allocation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEmployee {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmployeeChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

pub struct EmployeeSpec;

impl ResourceSpec for EmployeeSpec {
    type Record = Employee;
    type Create = NewEmployee;
    type Update = EmployeeChanges;

    const NAMESPACE: &'static str = "employees";
    const PATH: &'static str = "/employees";
    const LABEL: &'static str = "Employee";

    fn record_id(record: &Employee) -> String {
        record.id.clone()
    }
}

pub type Employees = Resource<EmployeeSpec>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    #[serde(skip)]
    pub employee_id: String,
    pub project_id: String,
    /// Share of the employee's capacity, 0.0 to 1.0.
    pub allocation: f64,
}

impl Resource<EmployeeSpec> {
    pub fn assign(&self) -> Mutation<Assignment, Saved<Employee>> {
        let keys = self.keys().clone();
        let spec = MutationSpec::new(
            "employees.assign",
            "Employee assigned",
            "Failed to assign employee",
        )
        .invalidates(move |assignment: &Assignment, _: &Saved<Employee>| {
            InvalidationPlan::new()
                .exact_refetch(keys.detail(assignment.employee_id.clone()))
                .subtree(keys.lists())
        })
        .server_message(|saved: &Saved<Employee>| saved.message.clone());

        self.context().mutation(
            spec,
            |assignment: &Assignment| {
                let employee = record_path(EmployeeSpec::PATH, &assignment.employee_id);
                let path = format!("{}/assign", employee);
                ApiRequest::post(path).with_json(assignment)
            },
            |_: &Assignment, response: &ApiResponse| Saved::from_response(response),
        )
    }
}

impl SyncContext {
    pub fn employees(&self) -> Employees {
        self.resource::<EmployeeSpec>()
    }
}

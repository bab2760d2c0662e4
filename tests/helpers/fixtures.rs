use gatekeeper::abac::Schema;
use serde_json::{json, Value};

/// Subject with the given role; `id` and `profile.id` are both 1.
pub fn subject(role: &str) -> Value {
    json!({
        "id": 1,
        "login": format!("{role}@demo.com"),
        "status": "active",
        "role": role,
        "profile": { "id": 1, "name": "John" }
    })
}

/// Clients with an employee link and a payments list.
pub fn crm_schema() -> Schema {
    Schema::from_value(json!([
        {
            "name": "t_employee",
            "fields": [
                {"name": "id", "type": "number"},
                {"name": "total", "type": "number"}
            ]
        },
        {
            "name": "t_payment",
            "fields": [
                {"name": "id", "type": "number"},
                {"name": "client", "type": "number"},
                {"name": "responsible", "type": "number"},
                {"name": "total", "type": "number"}
            ]
        },
        {
            "name": "t_client",
            "fields": [
                {"name": "id", "type": "number"},
                {"name": "name", "type": "string"},
                {"name": "total", "type": "number"},
                {"name": "owner", "type": "number"},
                {"name": "manager", "type": "number"},
                {"name": "employee", "type": "object", "linkMeta": "t_employee"},
                {"name": "payments", "type": "array", "linkMeta": "t_payment"}
            ]
        }
    ]))
    .expect("Failed to parse schema")
}

pub fn crm_rules() -> Value {
    json!({
        "t_client": {
            "data_GET": [
                {"result": "allow", "rule": {"sbj.role": "admin"}, "mask": []},
                {"result": "allow", "rule": {"sbj.role": "partner", "obj.owner": "sbj.id"}, "mask": []},
                {"result": "allow", "rule": {"sbj.role": "manager", "obj.manager": "sbj.id"}, "mask": ["total"]}
            ]
        },
        "t_payment": {
            "data_GET": [
                {"result": "allow", "rule": {"sbj.role": {"in": ["admin", "partner"]}}, "mask": []},
                {"result": "allow", "rule": {"sbj.role": "manager", "obj.responsible": "sbj.id"}, "mask": []}
            ]
        },
        "t_employee": {
            "data_GET": [
                {"result": "allow", "rule": {"sbj.role": "admin"}, "mask": []},
                {"result": "deny", "rule": {"sbj.role": {"not": "admin"}}, "mask": []}
            ]
        }
    })
}

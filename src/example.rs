// ============================================================================
// Household domain - Example subjects and rule payloads
// ============================================================================
#[cfg(test)]
pub mod test {
    use serde_json::{Value, json};

    use crate::{ForbiddenError, Guarded, ReactiveAbility, codec, define_subject};

    define_subject! {
        /// Household as seen by the signed-in member; `role` is that member's role in it.
        #[derive(Debug, Clone, PartialEq)]
        pub struct Household: "household" {
            pub id: u64,
            pub name: String,
            pub description: Option<String>,
            pub owner_id: u64,
            pub role: String,
            pub members: u32,
        }
    }

    define_subject! {
        /// Household chore
        #[derive(Debug, Clone)]
        pub struct Task: "task" {
            pub id: u64,
            pub household_id: u64,
            pub assignee_id: Option<u64>,
            pub status: String,
            pub due: String,
        }
    }

    define_subject! {
        #[derive(Debug, Clone)]
        pub struct Member: "user" {
            pub id: u64,
            pub name: String,
        }
    }

    pub const USER_ID: u64 = 42;

    pub fn household(role: &str) -> Household {
        Household {
            id: 1,
            name: "Maple Street".to_string(),
            description: None,
            owner_id: if role == "owner" { USER_ID } else { 7 },
            role: role.to_string(),
            members: 3,
        }
    }

    pub fn task(assignee_id: Option<u64>, status: &str) -> Task {
        Task {
            id: 10,
            household_id: 1,
            assignee_id,
            status: status.to_string(),
            due: "2025-06-01".to_string(),
        }
    }

    /// Rule payload the backend sends for a household member (normally fetched after
    /// a `user.permissions.recompute` event).
    pub fn member_permissions() -> Value {
        json!([
            { "action": "read", "subject": ["household", "task", "user"] },
            {
                "action": "update",
                "subject": "household",
                "conditions": { "field": "role", "op": "eq", "value": "owner" },
                "fields": ["name", "description"]
            },
            {
                "action": "manage",
                "subject": "task",
                "conditions": {
                    "op": "or",
                    "children": [
                        { "field": "assignee_id", "op": "eq", "value": USER_ID },
                        { "op": "not", "child": { "field": "assignee_id", "op": "exists" } }
                    ]
                }
            },
            {
                "action": ["update", "delete"],
                "subject": "task",
                "conditions": { "field": "status", "op": "eq", "value": "done" },
                "inverted": true,
                "reason": "Finished tasks are read-only"
            },
            {
                "action": "delete",
                "subject": "household",
                "inverted": true,
                "reason": "Only support can delete a household"
            }
        ])
    }

    pub fn setup_ability() -> ReactiveAbility {
        let ability = ReactiveAbility::new();
        ability
            .update(codec::decode(&member_permissions()).unwrap_or_default())
            .unwrap_or_else(|e| panic!("fixture rules must compile: {e}"));
        ability
    }

    pub fn example_rename_household(
        household: &mut Guarded<Household>,
        ability: &ReactiveAbility,
        name: &str,
    ) -> Result<String, ForbiddenError> {
        household.write(ability, "name", |h| h.name = name.to_string())?;
        household.read(ability, "name", |h| h.name.clone())
    }
}

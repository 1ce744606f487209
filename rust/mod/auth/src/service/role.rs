use fabrica_core::now_rfc3339;
use fabrica_sql::{Row, Value};

use crate::model::{CreateRole, Role};
use crate::service::{AuthError, AuthService};

impl AuthService {
    /// Create a role in `company_id`.
    pub fn create_role(&self, company_id: &str, input: CreateRole) -> Result<Role, AuthError> {
        let id = input.id.trim().to_string();
        if id.is_empty() {
            return Err(AuthError::Validation("role id is required".into()));
        }
        let role = Role {
            id,
            company_id: company_id.to_string(),
            description: input.description,
            permissions: input
                .permissions
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            created_at: now_rfc3339(),
        };

        self.sql
            .exec(
                "INSERT INTO roles (company_id, id, description, permissions, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                &[
                    role.company_id.as_str().into(),
                    role.id.as_str().into(),
                    role.description.as_str().into(),
                    Value::Text(serde_json::to_string(&role.permissions)?),
                    role.created_at.as_str().into(),
                ],
            )
            .map_err(|e| match AuthError::from(e) {
                AuthError::Conflict(_) => AuthError::Conflict(format!("role {} already exists", role.id)),
                other => other,
            })?;
        Ok(role)
    }

    /// All roles of a company, by id.
    pub fn list_roles(&self, company_id: &str) -> Result<Vec<Role>, AuthError> {
        let rows = self.sql.query(
            "SELECT company_id, id, description, permissions, created_at FROM roles \
             WHERE company_id = ?1 ORDER BY id",
            &[company_id.into()],
        )?;
        rows.iter().map(row_to_role).collect()
    }

    /// Union of the permissions granted by `role_ids`, in first-seen order.
    /// Role ids that do not exist in the company grant nothing.
    pub fn permissions_for(&self, company_id: &str, role_ids: &[String]) -> Result<Vec<String>, AuthError> {
        let roles = self.list_roles(company_id)?;
        let mut perms: Vec<String> = Vec::new();
        for role in roles.iter().filter(|r| role_ids.contains(&r.id)) {
            for p in &role.permissions {
                if !perms.contains(p) {
                    perms.push(p.clone());
                }
            }
        }
        Ok(perms)
    }
}

fn row_to_role(row: &Row) -> Result<Role, AuthError> {
    let text = |name: &str| {
        row.get_str(name)
            .map(str::to_string)
            .ok_or_else(|| AuthError::Storage(format!("missing {name} column")))
    };
    Ok(Role {
        id: text("id")?,
        company_id: text("company_id")?,
        description: text("description")?,
        permissions: serde_json::from_str(&text("permissions")?)?,
        created_at: text("created_at")?,
    })
}

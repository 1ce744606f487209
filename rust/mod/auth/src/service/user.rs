use fabrica_core::{new_id, now_rfc3339, ListParams, ListResult};
use fabrica_sql::{Row, Value};

use crate::model::{CreateUser, User, ROOT_USERNAME};
use crate::service::password::hash_password;
use crate::service::{AuthError, AuthService};

const MIN_PASSWORD_LEN: usize = 8;

const USER_COLUMNS: &str =
    "id, username, company_id, roles, extended_view, active, created_at, updated_at";

impl AuthService {
    /// Create a user in `company_id`. Every role must exist in that company.
    pub fn create_user(&self, company_id: &str, input: CreateUser) -> Result<User, AuthError> {
        let username = input.username.trim().to_string();
        if username.is_empty() {
            return Err(AuthError::Validation("username is required".into()));
        }
        if username == ROOT_USERNAME {
            return Err(AuthError::Validation(format!("username '{ROOT_USERNAME}' is reserved")));
        }
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let known = self.list_roles(company_id)?;
        if let Some(missing) = input.roles.iter().find(|r| !known.iter().any(|k| &k.id == *r)) {
            return Err(AuthError::Validation(format!("unknown role {missing}")));
        }

        let now = now_rfc3339();
        let user = User {
            id: new_id(),
            username,
            company_id: company_id.to_string(),
            roles: input.roles,
            extended_view: input.extended_view,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        let hash = hash_password(&input.password)?;

        self.sql
            .exec(
                "INSERT INTO users (id, username, company_id, password_hash, roles, extended_view, \
                 active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                &[
                    user.id.as_str().into(),
                    user.username.as_str().into(),
                    user.company_id.as_str().into(),
                    hash.into(),
                    Value::Text(serde_json::to_string(&user.roles)?),
                    Value::Integer(user.extended_view as i64),
                    Value::Integer(1),
                    user.created_at.as_str().into(),
                    user.updated_at.as_str().into(),
                ],
            )
            .map_err(|e| match AuthError::from(e) {
                AuthError::Conflict(_) => {
                    AuthError::Conflict(format!("username {} is taken", user.username))
                }
                other => other,
            })?;
        Ok(user)
    }

    /// Get a user of `company_id` by id.
    pub fn get_user(&self, company_id: &str, id: &str) -> Result<User, AuthError> {
        let rows = self.sql.query(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE company_id = ?1 AND id = ?2"),
            &[company_id.into(), id.into()],
        )?;
        match rows.first() {
            Some(row) => row_to_user(row),
            None => Err(AuthError::NotFound(format!("user {id} not found"))),
        }
    }

    /// List users of a company with pagination.
    pub fn list_users(&self, company_id: &str, params: &ListParams) -> Result<ListResult<User>, AuthError> {
        let total = self
            .sql
            .query("SELECT COUNT(*) AS n FROM users WHERE company_id = ?1", &[company_id.into()])?
            .first()
            .and_then(|r| r.get_i64("n"))
            .unwrap_or(0) as usize;

        let rows = self.sql.query(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE company_id = ?1 \
                 ORDER BY username LIMIT ?2 OFFSET ?3"
            ),
            &[
                company_id.into(),
                Value::Integer(params.effective_limit() as i64),
                Value::Integer(params.offset() as i64),
            ],
        )?;
        let items = rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total, next_cursor: None })
    }

    /// Active user and stored password hash by username.
    pub(crate) fn find_credentials(&self, username: &str) -> Result<Option<(User, String)>, AuthError> {
        let rows = self.sql.query(
            &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?1 AND active = 1"),
            &[username.into()],
        )?;
        match rows.first() {
            Some(row) => {
                let hash = row.get_str("password_hash").unwrap_or_default().to_string();
                Ok(Some((row_to_user(row)?, hash)))
            }
            None => Ok(None),
        }
    }
}

fn row_to_user(row: &Row) -> Result<User, AuthError> {
    let text = |name: &str| {
        row.get_str(name)
            .map(str::to_string)
            .ok_or_else(|| AuthError::Storage(format!("missing {name} column")))
    };
    Ok(User {
        id: text("id")?,
        username: text("username")?,
        company_id: text("company_id")?,
        roles: serde_json::from_str(&text("roles")?)?,
        extended_view: row.get_i64("extended_view").unwrap_or(0) != 0,
        active: row.get_i64("active").unwrap_or(0) != 0,
        created_at: text("created_at")?,
        updated_at: text("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use fabrica_core::ListParams;

    use crate::model::{CreateRole, CreateUser};
    use crate::service::tests::service;
    use crate::service::AuthError;

    fn new_user(name: &str, roles: &[&str]) -> CreateUser {
        CreateUser {
            username: name.into(),
            password: "correct-horse".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            extended_view: false,
        }
    }

    #[test]
    fn create_and_list_within_company() {
        let svc = service();
        svc.create_role(
            "c1",
            CreateRole { id: "tech".into(), description: String::new(), permissions: vec![] },
        )
        .unwrap();

        let ana = svc.create_user("c1", new_user("ana", &["tech"])).unwrap();
        svc.create_user("c2", new_user("bob", &[])).unwrap();

        assert_eq!(svc.get_user("c1", &ana.id).unwrap().roles, vec!["tech"]);
        assert!(matches!(svc.get_user("c2", &ana.id).unwrap_err(), AuthError::NotFound(_)));

        let page = svc.list_users("c1", &ListParams::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].username, "ana");
    }

    #[test]
    fn usernames_are_unique_across_companies() {
        let svc = service();
        svc.create_user("c1", new_user("ana", &[])).unwrap();
        let err = svc.create_user("c2", new_user("ana", &[])).unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[test]
    fn rejects_bad_input() {
        let svc = service();
        assert!(svc.create_user("c1", new_user("root", &[])).is_err());
        assert!(svc.create_user("c1", new_user("ana", &["ghost"])).is_err());
        let mut short = new_user("ana", &[]);
        short.password = "short".into();
        assert!(svc.create_user("c1", short).is_err());
    }
}

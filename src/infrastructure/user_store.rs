//! Credential verification against the `users` table

use crate::pipeline::auth::Authenticator;
use crate::pipeline::credentials::verify_password;
use crate::pipeline::types::{PipelineError, PipelineResult, Role, UserName};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::warn;

const FETCH_USER: &str = r#"
SELECT salt, hashed_password, role
FROM users
WHERE user_name = $1
"#;

pub struct PostgresAuthenticator {
    pool: PgPool,
}

impl PostgresAuthenticator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Authenticator for PostgresAuthenticator {
    async fn authenticate(
        &self,
        user_name: &UserName,
        password: &str,
    ) -> PipelineResult<Option<Role>> {
        let row = sqlx::query(FETCH_USER)
            .bind(user_name.as_ref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::CredentialStore(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let column = |name: &str| -> PipelineResult<String> {
            row.try_get(name)
                .map_err(|e| PipelineError::CredentialStore(e.to_string()))
        };
        let (salt, hashed_password, role) =
            (column("salt")?, column("hashed_password")?, column("role")?);

        if !verify_password(password, &salt, &hashed_password) {
            return Ok(None);
        }

        match Role::try_new(role) {
            Ok(role) => Ok(Some(role)),
            Err(e) => {
                warn!(user_name = %user_name, error = %e, "Stored user has no usable role");
                Ok(None)
            }
        }
    }
}

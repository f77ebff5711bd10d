use async_trait::async_trait;
use carpool_domain::UserId;
use carpool_shared::pii::Masked;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Missing credentials")]
    Missing,

    #[error("Invalid credentials: {0}")]
    Invalid(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a caller token to a stable user id. Used for authorization only.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &Masked<String>) -> Result<UserId, IdentityError>;
}

/// Treats the token itself as the user's UUID. For tests and local development.
pub struct MockIdentityResolver;

#[async_trait]
impl IdentityResolver for MockIdentityResolver {
    async fn resolve(&self, token: &Masked<String>) -> Result<UserId, IdentityError> {
        tracing::debug!("Resolving caller token {}", token);

        if token.expose().is_empty() {
            return Err(IdentityError::Missing);
        }
        Uuid::parse_str(token.expose()).map_err(|e| IdentityError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_resolver() {
        let user = Uuid::new_v4();
        let resolved = MockIdentityResolver.resolve(&Masked(user.to_string())).await.unwrap();
        assert_eq!(resolved, user);

        assert!(matches!(
            MockIdentityResolver.resolve(&Masked(String::new())).await,
            Err(IdentityError::Missing)
        ));
        assert!(matches!(
            MockIdentityResolver.resolve(&Masked("nope".into())).await,
            Err(IdentityError::Invalid(_))
        ));
    }
}

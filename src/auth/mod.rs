use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Learner,
    Tutor,
    Admin,
}

/// Bearer token body. Issued by the account service; this service only
/// verifies it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: i64,
}

impl Claims {
    pub fn new(sub: Uuid, roles: Vec<Role>, ttl: Duration) -> Self {
        Self {
            sub,
            roles,
            permissions: Vec::new(),
            exp: (Utc::now() + ttl).timestamp(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Any failure, including expiry and a wrong algorithm, is `Unauthorized`.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Rejected bearer token: {}", e);
                AppError::Unauthorized
            })
    }

    /// Signs claims with the shared secret; used by the seed tool and tests.
    pub fn issue(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_decodes_to_same_claims() {
        let verifier = JwtVerifier::new("secret");
        let claims = Claims::new(Uuid::new_v4(), vec![Role::Tutor], Duration::hours(1));

        let token = verifier.issue(&claims).unwrap();
        assert_eq!(verifier.decode(&token).unwrap(), claims);
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let claims = Claims::new(Uuid::new_v4(), vec![Role::Learner], Duration::hours(1));
        let token = JwtVerifier::new("one").issue(&claims).unwrap();

        assert!(matches!(JwtVerifier::new("two").decode(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let verifier = JwtVerifier::new("secret");
        let claims = Claims::new(Uuid::new_v4(), vec![Role::Learner], Duration::hours(-2));
        let token = verifier.issue(&claims).unwrap();

        assert!(matches!(verifier.decode(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_garbage_is_unauthorized() {
        let verifier = JwtVerifier::new("secret");
        assert!(matches!(verifier.decode("not.a.jwt"), Err(AppError::Unauthorized)));
    }
}

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::Role;

const EXPIRATION_HOURS: i64 = 1;

/// Claims carried by the short-lived session token issued at login/accept
/// invite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub tenant_id: String,
    pub role: Role,
    pub exp: i64,
}

pub fn issue(user_id: &str, tenant_id: &str, role: Role, secret: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        tenant_id: tenant_id.to_string(),
        role,
        exp: (Utc::now() + Duration::hours(EXPIRATION_HOURS)).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_rejects_wrong_secret() {
        let token = issue("user-1", "tenant-1", Role::Owner, "secret-a").unwrap();
        let claims = verify(&token, "secret-a").unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, Role::Owner);
        assert!(verify(&token, "secret-b").is_err());
    }
}

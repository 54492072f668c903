//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::role::{Role, RoleFlags};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SwitchRoleRequest {
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SwitchRoleResponse {
    pub success: bool,
    pub role: String,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub timezone: String,
    pub roles: RoleFlags,
    pub role: Role,
    /// Unix timestamp of the absolute session expiry.
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            email: "ana@example.com".to_string(),
            password: "secret".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "ana@example.com");
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.password, "secret");
        Ok(())
    }

    #[test]
    fn switch_role_response_round_trips() -> Result<()> {
        let response = SwitchRoleResponse {
            success: true,
            role: "teacher".to_string(),
            message: "role switched".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        let decoded: SwitchRoleResponse = serde_json::from_value(value)?;
        assert!(decoded.success);
        assert_eq!(decoded.role, "teacher");
        Ok(())
    }

    #[test]
    fn session_response_serializes_flags() -> Result<()> {
        let response = SessionResponse {
            user_id: "id".to_string(),
            email: "ana@example.com".to_string(),
            name: "Ana".to_string(),
            timezone: "UTC".to_string(),
            roles: RoleFlags::new(true, true, false),
            role: Role::Teacher,
            expires_at: 1_700_000_000,
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(value["roles"]["teacher"], serde_json::json!(true));
        assert_eq!(value["role"], serde_json::json!("teacher"));
        Ok(())
    }
}

use serde::Serialize;

use warden_core::IdentityId;

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub msg: &'static str,
    pub id: IdentityId,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub msg: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl LoginResponse {
    pub fn token(token: String) -> Self {
        Self {
            msg: "Successful login!",
            token: Some(token),
        }
    }

    pub fn session() -> Self {
        Self {
            msg: "Successful login!",
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub msg: &'static str,
}

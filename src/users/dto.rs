use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo::{Phone, User};

/// Transport shape of a phone record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhonePayload {
    pub number: String,
    pub city_code: String,
    pub country_code: String,
}

/// Request body for user creation.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phones: Option<Vec<PhonePayload>>,
}

/// Request body for a full replace. An absent phone list leaves the stored
/// collection untouched; a present one (even empty) replaces it wholesale.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phones: Option<Vec<PhonePayload>>,
}

/// Request body for a partial update; absent fields keep their prior values.
#[derive(Debug, Default, Deserialize)]
pub struct PatchUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phones: Option<Vec<PhonePayload>>,
}

/// Full user as returned to the client. The password hash never leaves the
/// repository layer.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phones: Vec<PhonePayload>,
    pub token: Option<String>,
    pub active: bool,
    pub created_at: Option<OffsetDateTime>,
    pub modified_at: Option<OffsetDateTime>,
    pub last_login_at: Option<OffsetDateTime>,
}

impl UserResponse {
    pub fn from_parts(user: User, phones: Vec<Phone>) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phones: phones
                .into_iter()
                .map(|p| PhonePayload {
                    number: p.number,
                    city_code: p.city_code,
                    country_code: p.country_code,
                })
                .collect(),
            token: user.token,
            active: user.active,
            created_at: user.created_at,
            modified_at: user.modified_at,
            last_login_at: user.last_login_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_body_distinguishes_absent_from_empty_phones() {
        let absent: PatchUserRequest = serde_json::from_str(r#"{"name":"Pedro"}"#).unwrap();
        assert!(absent.phones.is_none());

        let empty: PatchUserRequest =
            serde_json::from_str(r#"{"name":"Pedro","phones":[]}"#).unwrap();
        let phones = empty.phones.expect("present empty list");
        assert!(phones.is_empty());
    }

    #[test]
    fn patch_body_parses_a_single_field() {
        let req: PatchUserRequest =
            serde_json::from_str(r#"{"email":"pedro@picapiedra.org"}"#).unwrap();
        assert!(req.name.is_none());
        assert_eq!(req.email.as_deref(), Some("pedro@picapiedra.org"));
        assert!(req.password.is_none());
        assert!(req.phones.is_none());
    }

    #[test]
    fn create_body_parses_phone_list() {
        let req: CreateUserRequest = serde_json::from_str(
            r#"{
                "name": "Pedro Picapiedra",
                "email": "pedro@picapiedra.org",
                "password": "Password1",
                "phones": [{"number":"987654321","city_code":"2","country_code":"56"}]
            }"#,
        )
        .unwrap();
        let phones = req.phones.unwrap();
        assert_eq!(phones.len(), 1);
        assert_eq!(phones[0].number, "987654321");
        assert_eq!(phones[0].country_code, "56");
    }

    #[test]
    fn response_never_carries_a_password_field() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Pedro Picapiedra".into(),
            email: "pedro@picapiedra.org".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            token: Some("fake-jwt-token".into()),
            active: true,
            created_at: Some(OffsetDateTime::now_utc()),
            modified_at: None,
            last_login_at: Some(OffsetDateTime::now_utc()),
        };
        let json = serde_json::to_string(&UserResponse::from_parts(user, vec![])).unwrap();
        assert!(json.contains("pedro@picapiedra.org"));
        assert!(json.contains("fake-jwt-token"));
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }
}

use anyhow::Context;
use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::{jwt::JwtKeys, password::hash_password},
    error::ApiError,
    state::AppState,
    users::{
        dto::{CreateUserRequest, PatchUserRequest, PhonePayload, UpdateUserRequest, UserResponse},
        repo::{self, Phone, User},
    },
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Fields-present set shared by the full and partial update paths. The PUT
/// handler fills every field, PATCH passes its options through; both funnel
/// into the same merge below.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phones: Option<Vec<PhonePayload>>,
}

impl From<UpdateUserRequest> for UserChanges {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            name: Some(req.name),
            email: Some(req.email),
            password: Some(req.password),
            phones: req.phones,
        }
    }
}

impl From<PatchUserRequest> for UserChanges {
    fn from(req: PatchUserRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
            password: req.password,
            phones: req.phones,
        }
    }
}

/// Ownership gate for mutations. The caller identity is compared before the
/// lookup result is even considered, so a non-owner request against a
/// missing id reads as forbidden, not as not-found.
fn precheck_owned(caller: Uuid, target: Uuid, found: Option<User>) -> Result<User, ApiError> {
    if caller != target {
        return Err(ApiError::Forbidden);
    }
    found.ok_or(ApiError::NotFound)
}

/// An email conflicts only when it is taken and differs from the record's
/// current address; re-submitting one's own email is not a conflict.
fn email_conflicts(taken: bool, current_email: &str, requested_email: &str) -> bool {
    taken && current_email != requested_email
}

/// Maps transport phone records onto rows owned by the given user,
/// preserving payload order. Empty input maps to an empty list.
pub(crate) fn map_phones(user_id: Uuid, payloads: &[PhonePayload]) -> Vec<Phone> {
    payloads
        .iter()
        .enumerate()
        .map(|(i, p)| Phone {
            id: Uuid::new_v4(),
            user_id,
            number: p.number.clone(),
            city_code: p.city_code.clone(),
            country_code: p.country_code.clone(),
            sort_order: i as i32,
        })
        .collect()
}

fn merge_changes(user: &mut User, changes: &UserChanges, now: OffsetDateTime) {
    if let Some(name) = &changes.name {
        user.name = name.clone();
    }
    if let Some(email) = &changes.email {
        user.email = email.clone();
    }
    user.modified_at = Some(now);
}

/// Best-effort last-login refresh; never fails the enclosing operation.
async fn refresh_last_login(db: &PgPool, id: Uuid) {
    match repo::touch_last_login(db, id, OffsetDateTime::now_utc()).await {
        Ok(touched) => debug!(user_id = %id, touched, "last login refreshed"),
        Err(e) => warn!(error = %e, user_id = %id, "last login refresh failed"),
    }
}

pub async fn create_user(state: &AppState, req: CreateUserRequest) -> Result<UserResponse, ApiError> {
    if repo::exists_by_email(&state.db, &req.email).await? {
        warn!(email = %req.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let password_hash = hash_password(&req.password)?;
    let keys = JwtKeys::from_ref(state);

    let mut tx = state.db.begin().await.context("begin transaction")?;

    let user = repo::insert_tx(&mut tx, &req.name, &req.email, &password_hash).await?;

    let phones = map_phones(user.id, req.phones.as_deref().unwrap_or(&[]));
    repo::insert_phones_tx(&mut tx, &phones).await?;

    // The id has to be persisted before a token can be minted from it.
    let token = keys.sign(user.id)?;
    let now = OffsetDateTime::now_utc();
    let user = repo::finalize_tx(&mut tx, user.id, &token, now).await?;

    tx.commit().await.context("commit transaction")?;

    info!(user_id = %user.id, email = %user.email, "user created");
    Ok(UserResponse::from_parts(user, phones))
}

pub async fn get_user(db: &PgPool, caller: Uuid, id: Uuid) -> Result<UserResponse, ApiError> {
    let user = repo::find_by_id(db, id).await?.ok_or(ApiError::NotFound)?;
    let phones = repo::list_phones(db, user.id).await?;

    // Refreshes the caller's own session timestamp, not the target's; the
    // returned record is the pre-refresh target.
    refresh_last_login(db, caller).await;

    Ok(UserResponse::from_parts(user, phones))
}

pub async fn update_user(
    db: &PgPool,
    caller: Uuid,
    id: Uuid,
    req: UpdateUserRequest,
) -> Result<UserResponse, ApiError> {
    apply_update(db, caller, id, req.into(), true).await
}

pub async fn patch_user(
    db: &PgPool,
    caller: Uuid,
    id: Uuid,
    req: PatchUserRequest,
) -> Result<UserResponse, ApiError> {
    apply_update(db, caller, id, req.into(), false).await
}

/// Shared read-modify-write path for full and partial updates. The full
/// path additionally stamps `last_login_at` on the row itself; both paths
/// run the best-effort refresh for the caller afterwards.
async fn apply_update(
    db: &PgPool,
    caller: Uuid,
    id: Uuid,
    changes: UserChanges,
    stamp_last_login: bool,
) -> Result<UserResponse, ApiError> {
    let found = repo::find_by_id(db, id).await?;
    let mut user = precheck_owned(caller, id, found)?;

    if let Some(email) = &changes.email {
        let taken = repo::exists_by_email(db, email).await?;
        if email_conflicts(taken, &user.email, email) {
            warn!(user_id = %id, email = %email, "email already registered by another user");
            return Err(ApiError::DuplicateEmail);
        }
    }

    let now = OffsetDateTime::now_utc();
    merge_changes(&mut user, &changes, now);
    if let Some(password) = &changes.password {
        user.password_hash = hash_password(password)?;
    }
    if stamp_last_login {
        user.last_login_at = Some(now);
    }

    let mut tx = db.begin().await.context("begin transaction")?;
    let user = repo::update_tx(&mut tx, &user).await?;
    let phones = match &changes.phones {
        Some(payloads) => {
            let rows = map_phones(user.id, payloads);
            repo::delete_phones_tx(&mut tx, user.id).await?;
            repo::insert_phones_tx(&mut tx, &rows).await?;
            rows
        }
        None => repo::list_phones(db, user.id).await?,
    };
    tx.commit().await.context("commit transaction")?;

    refresh_last_login(db, caller).await;

    info!(user_id = %user.id, "user updated");
    Ok(UserResponse::from_parts(user, phones))
}

pub async fn delete_user(db: &PgPool, caller: Uuid, id: Uuid) -> Result<(), ApiError> {
    let found = repo::find_by_id(db, id).await?;
    let user = precheck_owned(caller, id, found)?;

    repo::delete(db, user.id).await?;

    info!(user_id = %user.id, "user deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Pedro Picapiedra".into(),
            email: "pedro@picapiedra.org".into(),
            password_hash: "hash".into(),
            token: Some("token-value".into()),
            active: true,
            created_at: Some(OffsetDateTime::now_utc()),
            modified_at: None,
            last_login_at: Some(OffsetDateTime::now_utc()),
        }
    }

    #[test]
    fn owner_with_existing_record_passes_precheck() {
        let user = sample_user();
        let id = user.id;
        let checked = precheck_owned(id, id, Some(user)).expect("owner should pass");
        assert_eq!(checked.id, id);
    }

    #[test]
    fn non_owner_is_forbidden_regardless_of_payload() {
        let user = sample_user();
        let target = user.id;
        let err = precheck_owned(Uuid::new_v4(), target, Some(user)).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[test]
    fn forbidden_supersedes_not_found_for_non_owners() {
        // A non-owner probing a missing id must not learn it does not exist.
        let err = precheck_owned(Uuid::new_v4(), Uuid::new_v4(), None).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[test]
    fn owner_with_missing_record_is_not_found() {
        let id = Uuid::new_v4();
        let err = precheck_owned(id, id, None).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn taken_email_of_another_user_conflicts() {
        assert!(email_conflicts(true, "pedro@picapiedra.org", "vilma@picapiedra.org"));
    }

    #[test]
    fn own_current_email_never_conflicts() {
        assert!(!email_conflicts(true, "pedro@picapiedra.org", "pedro@picapiedra.org"));
    }

    #[test]
    fn free_email_never_conflicts() {
        assert!(!email_conflicts(false, "pedro@picapiedra.org", "vilma@picapiedra.org"));
    }

    #[test]
    fn merge_applies_only_present_fields_and_stamps_modified() {
        let mut user = sample_user();
        let before_email = user.email.clone();
        let now = OffsetDateTime::now_utc();

        let changes = UserChanges {
            name: Some("Pedro Picapiedra Partial".into()),
            ..Default::default()
        };
        merge_changes(&mut user, &changes, now);

        assert_eq!(user.name, "Pedro Picapiedra Partial");
        assert_eq!(user.email, before_email);
        assert_eq!(user.modified_at, Some(now));
    }

    #[test]
    fn merge_always_stamps_modified_even_with_no_fields() {
        let mut user = sample_user();
        let now = OffsetDateTime::now_utc();
        merge_changes(&mut user, &UserChanges::default(), now);
        assert_eq!(user.modified_at, Some(now));
    }

    #[test]
    fn full_request_converts_to_an_all_present_change_set() {
        let changes: UserChanges = UpdateUserRequest {
            name: "Pedro".into(),
            email: "pedro@picapiedra.org".into(),
            password: "Password1".into(),
            phones: None,
        }
        .into();
        assert!(changes.name.is_some());
        assert!(changes.email.is_some());
        assert!(changes.password.is_some());
        assert!(changes.phones.is_none());
    }

    #[test]
    fn phone_mapper_stamps_owner_and_preserves_order() {
        let owner = Uuid::new_v4();
        let payloads = vec![
            PhonePayload {
                number: "987654321".into(),
                city_code: "2".into(),
                country_code: "56".into(),
            },
            PhonePayload {
                number: "123123123".into(),
                city_code: "9".into(),
                country_code: "56".into(),
            },
        ];

        let rows = map_phones(owner, &payloads);

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|p| p.user_id == owner));
        assert_eq!(rows[0].number, "987654321");
        assert_eq!(rows[0].sort_order, 0);
        assert_eq!(rows[1].number, "123123123");
        assert_eq!(rows[1].sort_order, 1);
    }

    #[test]
    fn phone_mapper_maps_empty_to_empty() {
        assert!(map_phones(Uuid::new_v4(), &[]).is_empty());
    }

    #[test]
    fn accepts_plausible_emails_and_rejects_junk() {
        assert!(is_valid_email("pedro@picapiedra.org"));
        assert!(!is_valid_email("pedro"));
        assert!(!is_valid_email("pedro@"));
        assert!(!is_valid_email("pedro picapiedra@example.com"));
    }
}

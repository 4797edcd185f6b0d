use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. Phone rows live in their own table and are
/// loaded separately.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 hash, not exposed in JSON
    pub token: Option<String>,
    pub active: bool,
    pub created_at: Option<OffsetDateTime>,
    pub modified_at: Option<OffsetDateTime>,
    pub last_login_at: Option<OffsetDateTime>,
}

/// Phone record owned by exactly one user. Rows are destroyed and recreated
/// wholesale whenever the parent's phone list is replaced.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Phone {
    pub id: Uuid,
    pub user_id: Uuid,
    pub number: String,
    pub city_code: String,
    pub country_code: String,
    pub sort_order: i32,
}

pub async fn exists_by_email(db: &PgPool, email: &str) -> anyhow::Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)
        "#,
    )
    .bind(email)
    .fetch_one(db)
    .await
    .context("check email existence")?;
    Ok(exists)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password_hash, token, active,
               created_at, modified_at, last_login_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Phase one of the create protocol: reserve an identity. The generated id
/// must exist before a token can be minted from it.
pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    email: &str,
    password_hash: &str,
) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING id, name, email, password_hash, token, active,
                  created_at, modified_at, last_login_at
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .fetch_one(&mut **tx)
    .await
    .context("insert user")?;
    Ok(user)
}

/// Phase two of the create protocol: attach the minted token, stamp the
/// creation timestamps and activate the account.
pub async fn finalize_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    token: &str,
    now: OffsetDateTime,
) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET token = $2, active = TRUE, created_at = $3, last_login_at = $3
        WHERE id = $1
        RETURNING id, name, email, password_hash, token, active,
                  created_at, modified_at, last_login_at
        "#,
    )
    .bind(id)
    .bind(token)
    .bind(now)
    .fetch_one(&mut **tx)
    .await
    .context("finalize user")?;
    Ok(user)
}

pub async fn update_tx(tx: &mut Transaction<'_, Postgres>, user: &User) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET name = $2, email = $3, password_hash = $4,
            modified_at = $5, last_login_at = $6
        WHERE id = $1
        RETURNING id, name, email, password_hash, token, active,
                  created_at, modified_at, last_login_at
        "#,
    )
    .bind(user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.modified_at)
    .bind(user.last_login_at)
    .fetch_one(&mut **tx)
    .await
    .context("update user")?;
    Ok(user)
}

/// Hard delete. Owned phone rows go with the user via the foreign key
/// cascade.
pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
        .bind(id)
        .execute(db)
        .await
        .context("delete user")?;
    Ok(())
}

/// Refresh a user's last-login timestamp. Returns whether a row was
/// touched; a missing user is an ordinary `false`, not an error.
pub async fn touch_last_login(
    db: &PgPool,
    id: Uuid,
    now: OffsetDateTime,
) -> anyhow::Result<bool> {
    let result = sqlx::query(r#"UPDATE users SET last_login_at = $2 WHERE id = $1"#)
        .bind(id)
        .bind(now)
        .execute(db)
        .await
        .context("touch last login")?;
    Ok(result.rows_affected() > 0)
}

// ---- phones ----

pub async fn list_phones(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Phone>> {
    let rows = sqlx::query_as::<_, Phone>(
        r#"
        SELECT id, user_id, number, city_code, country_code, sort_order
        FROM phones
        WHERE user_id = $1
        ORDER BY sort_order ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn insert_phones_tx(
    tx: &mut Transaction<'_, Postgres>,
    phones: &[Phone],
) -> anyhow::Result<()> {
    for phone in phones {
        sqlx::query(
            r#"
            INSERT INTO phones (id, user_id, number, city_code, country_code, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(phone.id)
        .bind(phone.user_id)
        .bind(&phone.number)
        .bind(&phone.city_code)
        .bind(&phone.country_code)
        .bind(phone.sort_order)
        .execute(&mut **tx)
        .await
        .context("insert phone")?;
    }
    Ok(())
}

pub async fn delete_phones_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query(r#"DELETE FROM phones WHERE user_id = $1"#)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("delete phones")?;
    Ok(())
}

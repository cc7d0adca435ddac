//! Users repository for patrons, staff and token revocation
//!
//! Handles user rows, group membership (mirroring the membership type) and
//! revoked access tokens.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{new_id, now_utc};

// ============================================================================
// Enums
// ============================================================================

/// Patron category; drives loan duration and group membership
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MembershipType {
    Student,
    Faculty,
    Staff,
    #[default]
    Public,
}

impl MembershipType {
    pub const ALL: [MembershipType; 4] = [
        MembershipType::Student,
        MembershipType::Faculty,
        MembershipType::Staff,
        MembershipType::Public,
    ];

    /// Days a loan runs before it is due
    pub fn loan_period_days(&self) -> i64 {
        match self {
            MembershipType::Student => 14,
            MembershipType::Faculty => 30,
            MembershipType::Staff => 21,
            MembershipType::Public => 7,
        }
    }

    /// Name of the group this tier belongs to
    pub fn group_name(&self) -> &'static str {
        match self {
            MembershipType::Student => "Students",
            MembershipType::Faculty => "Faculty",
            MembershipType::Staff => "Staff",
            MembershipType::Public => "Public",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipType::Student => "student",
            MembershipType::Faculty => "faculty",
            MembershipType::Staff => "staff",
            MembershipType::Public => "public",
        }
    }
}

/// Account role; admins may manage everything
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub membership_type: MembershipType,
    pub department: String,
    pub student_id: Option<String>,
    pub faculty_id: Option<String>,
    pub staff_id: Option<String>,
    pub phone: String,
    pub emergency_contact: String,
    pub role: Role,
    pub is_staff_approved: bool,
    pub email_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub membership_type: MembershipType,
    pub department: String,
    pub student_id: Option<String>,
    pub faculty_id: Option<String>,
    pub staff_id: Option<String>,
    pub phone: String,
    pub role: Role,
    pub is_staff_approved: bool,
    pub email_verified: bool,
    pub is_active: bool,
}

/// Partial profile update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub membership_type: Option<MembershipType>,
    pub is_active: Option<bool>,
    pub department: Option<String>,
}

/// Columns that must be unique across users when set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    StudentId,
    FacultyId,
    StaffId,
}

impl UniqueField {
    fn column(&self) -> &'static str {
        match self {
            UniqueField::Username => "username",
            UniqueField::Email => "email",
            UniqueField::StudentId => "student_id",
            UniqueField::FacultyId => "faculty_id",
            UniqueField::StaffId => "staff_id",
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
    membership_type, department, student_id, faculty_id, staff_id, phone, emergency_contact, \
    role, is_staff_approved, email_verified, is_active, last_login_at, date_joined, updated_at";

// ============================================================================
// Repository
// ============================================================================

pub struct UsersRepository {
    pool: SqlitePool,
}

impl UsersRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // User CRUD
    // ========================================================================

    /// Create a new user and put them in their membership group
    pub async fn create(&self, user: CreateUser) -> Result<UserRecord> {
        let id = new_id();
        let now = now_utc();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name,
                membership_type, department, student_id, faculty_id, staff_id, phone,
                role, is_staff_approved, email_verified, is_active, date_joined, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.membership_type)
        .bind(&user.department)
        .bind(&user.student_id)
        .bind(&user.faculty_id)
        .bind(&user.staff_id)
        .bind(&user.phone)
        .bind(user.role)
        .bind(user.is_staff_approved)
        .bind(user.email_verified)
        .bind(user.is_active)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO user_groups (user_id, group_name) VALUES (?, ?)")
            .bind(&id)
            .bind(user.membership_type.group_name())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create user"))
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Get user by username (case-insensitive)
    pub async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE username = ? COLLATE NOCASE",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Get user by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE email = ? COLLATE NOCASE",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Whether another user already holds `value` in a unique column
    pub async fn is_taken(
        &self,
        field: UniqueField,
        value: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM users WHERE {} = ? COLLATE NOCASE AND id != ?",
            field.column()
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(value)
            .bind(exclude_id.unwrap_or(""))
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// List users matching the filter, newest first
    pub async fn list(&self, filter: &UserFilter) -> Result<Vec<UserRecord>> {
        let mut sql = format!("SELECT {} FROM users WHERE 1 = 1", USER_COLUMNS);
        if filter.membership_type.is_some() {
            sql.push_str(" AND membership_type = ?");
        }
        if filter.is_active.is_some() {
            sql.push_str(" AND is_active = ?");
        }
        if filter.department.is_some() {
            sql.push_str(" AND department = ? COLLATE NOCASE");
        }
        sql.push_str(" ORDER BY date_joined DESC, username");

        let mut query = sqlx::query_as::<_, UserRecord>(&sql);
        if let Some(membership) = filter.membership_type {
            query = query.bind(membership);
        }
        if let Some(active) = filter.is_active {
            query = query.bind(active);
        }
        if let Some(ref department) = filter.department {
            query = query.bind(department);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Apply a partial profile update
    pub async fn update_profile(&self, id: &str, update: UpdateProfile) -> Result<Option<UserRecord>> {
        sqlx::query(
            r#"
            UPDATE users SET
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                department = COALESCE(?, department),
                phone = COALESCE(?, phone),
                emergency_contact = COALESCE(?, emergency_contact),
                password_hash = COALESCE(?, password_hash),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(update.department)
        .bind(update.phone)
        .bind(update.emergency_contact)
        .bind(update.password_hash)
        .bind(now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    /// Persist the staff approval and e-mail verification flags together with
    /// the resulting activation state
    pub async fn set_activation_flags(
        &self,
        id: &str,
        is_staff_approved: bool,
        email_verified: bool,
        is_active: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET is_staff_approved = ?, email_verified = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(is_staff_approved)
        .bind(email_verified)
        .bind(is_active)
        .bind(now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_active(&self, id: &str, is_active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Change the membership tier and move the user to the matching group
    pub async fn set_membership_type(&self, id: &str, membership: MembershipType) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET membership_type = ?, updated_at = ? WHERE id = ?")
            .bind(membership)
            .bind(now_utc())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Only tier groups are rewritten; any other group stays
        let tier_groups: Vec<&str> = MembershipType::ALL.iter().map(|m| m.group_name()).collect();
        sqlx::query("DELETE FROM user_groups WHERE user_id = ? AND group_name IN (?, ?, ?, ?)")
            .bind(id)
            .bind(tier_groups[0])
            .bind(tier_groups[1])
            .bind(tier_groups[2])
            .bind(tier_groups[3])
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_name) VALUES (?, ?)")
            .bind(id)
            .bind(membership.group_name())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn update_last_login(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub async fn groups(&self, id: &str) -> Result<Vec<String>> {
        let groups: Vec<String> =
            sqlx::query_scalar("SELECT group_name FROM user_groups WHERE user_id = ? ORDER BY group_name")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(groups)
    }

    pub async fn is_in_group(&self, id: &str, group_name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_groups WHERE user_id = ? AND group_name = ?",
        )
        .bind(id)
        .bind(group_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    // ========================================================================
    // Token Revocation
    // ========================================================================

    pub async fn revoke_token(
        &self,
        jti_hash: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO revoked_tokens (jti_hash, user_id, expires_at, revoked_at) VALUES (?, ?, ?, ?)",
        )
        .bind(jti_hash)
        .bind(user_id)
        .bind(expires_at)
        .bind(now_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_token_revoked(&self, jti_hash: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM revoked_tokens WHERE jti_hash = ?")
            .bind(jti_hash)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Drop revocation entries whose tokens have expired anyway
    pub async fn cleanup_revoked_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

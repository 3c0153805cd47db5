use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FansClub {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "CreatedAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "UpdatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub name: String,
    pub description: String,
    pub avatar: String,
    pub owner_id: i64,
    pub member_count: i64,
    pub level: i64,
    /// 0 pending review, 1 active, 2 disabled.
    pub status: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    pub fn can_moderate(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClubMember {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "CreatedAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "UpdatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub club_id: i64,
    pub user_id: i64,
    pub role: MemberRole,
    pub level: i64,
    pub points: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club: Option<FansClub>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClubPost {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "CreatedAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "UpdatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub club_id: i64,
    pub user_id: i64,
    pub content: String,
    /// JSON array of image URLs.
    pub images: String,
    pub like_count: i64,
    pub comment_count: i64,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club: Option<FansClub>,
}

/// Page number and size after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: i64,
    pub page_size: i64,
}

pub const MAX_PAGE_SIZE: i64 = 100;

impl Paging {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: page.max(1),
            page_size: if page_size < 1 { 10 } else { page_size.min(MAX_PAGE_SIZE) },
        }
    }

    /// Saturates, so a page far past the end is simply empty.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub list: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T> Page<T> {
    pub fn new(list: Vec<T>, total: i64, paging: Paging) -> Self {
        Self {
            list,
            total,
            page: paging.page,
            page_size: paging.page_size,
        }
    }
}

/// A club as seen by one caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubView {
    pub club: FansClub,
    pub is_member: bool,
    pub is_owner: bool,
    pub role: Option<MemberRole>,
}

impl ClubView {
    pub fn new(club: FansClub, user_id: i64, role: Option<MemberRole>) -> Self {
        Self {
            is_member: role.is_some(),
            is_owner: club.owner_id == user_id,
            role,
            club,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClubSearch {
    pub page: i64,
    pub page_size: i64,
    pub keyword: String,
    pub status: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemberSearch {
    pub club_id: i64,
    pub user_id: i64,
    pub role: Option<MemberRole>,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PostSearch {
    pub club_id: i64,
    pub user_id: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageQuery {
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ById {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByClub {
    pub club_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClub {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateClub {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub status: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMemberRole {
    pub id: i64,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePost {
    pub club_id: i64,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePost {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

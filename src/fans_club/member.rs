use axum::{
    debug_handler,
    extract::{Query, State},
    Json,
};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    auth::User,
    res::{self, Reply},
    AppError, AppResult, AppState, Reject,
};

use super::{
    club::{clubs_by_id, find_club},
    membership, missing,
    model::{ById, ByClub, ClubMember, MemberRole, MemberSearch, Page, Paging, UpdateMemberRole},
};

async fn find_member(db_pool: &SqlitePool, id: i64) -> AppResult<ClubMember> {
    sqlx::query_as("SELECT * FROM gva_fans_club_member WHERE id = ?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| missing("member"))
}

/// Duplicates are caught by the `(club_id, user_id)` unique key.
pub async fn join_club(db_pool: &SqlitePool, club_id: i64, user_id: i64) -> AppResult<ClubMember> {
    find_club(db_pool, club_id).await?;
    let now = OffsetDateTime::now_utc();

    let mut tx = db_pool.begin().await?;
    let member: ClubMember = sqlx::query_as(
        "INSERT INTO gva_fans_club_member (created_at, updated_at, club_id, user_id, role, level, points, joined_at)
         VALUES (?, ?, ?, ?, ?, 1, 0, ?) RETURNING *",
    )
    .bind(now)
    .bind(now)
    .bind(club_id)
    .bind(user_id)
    .bind(MemberRole::Member)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(already_member)?;
    sqlx::query("UPDATE gva_fans_club SET member_count = member_count + 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(club_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(event = "member_joined", club_id, user_id);
    Ok(member)
}

fn already_member(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return Reject::Conflict("already a member of this fans club".to_owned()).into();
        }
    }
    err.into()
}

pub async fn quit_club(db_pool: &SqlitePool, club_id: i64, user_id: i64) -> AppResult<()> {
    let member = membership(db_pool, club_id, user_id)
        .await?
        .ok_or_else(|| Reject::NotFound("not a member of this fans club".to_owned()))?;
    if member.role == MemberRole::Owner {
        return Err(Reject::Forbidden(
            "the owner cannot quit; transfer ownership or delete the fans club".to_owned(),
        )
        .into());
    }

    leave(db_pool, &member).await?;
    info!(event = "member_quit", club_id, user_id);
    Ok(())
}

async fn leave(db_pool: &SqlitePool, member: &ClubMember) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;
    sqlx::query("DELETE FROM gva_fans_club_member WHERE id = ?")
        .bind(member.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE gva_fans_club SET member_count = member_count - 1, updated_at = ? WHERE id = ?")
        .bind(OffsetDateTime::now_utc())
        .bind(member.club_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, search: &MemberSearch) {
    if search.club_id > 0 {
        query.push(" AND club_id = ").push_bind(search.club_id);
    }
    if search.user_id > 0 {
        query.push(" AND user_id = ").push_bind(search.user_id);
    }
    if let Some(role) = search.role {
        query.push(" AND role = ").push_bind(role);
    }
}

pub async fn member_list(db_pool: &SqlitePool, search: &MemberSearch) -> AppResult<Page<ClubMember>> {
    let paging = Paging::new(search.page, search.page_size);

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM gva_fans_club_member WHERE 1 = 1");
    push_filters(&mut count, search);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(db_pool).await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM gva_fans_club_member WHERE 1 = 1");
    push_filters(&mut query, search);
    query
        .push(" ORDER BY id ASC LIMIT ")
        .push_bind(paging.page_size)
        .push(" OFFSET ")
        .push_bind(paging.offset());
    let mut members: Vec<ClubMember> = query.build_query_as::<ClubMember>().fetch_all(db_pool).await?;

    let clubs = clubs_by_id(db_pool, members.iter().map(|member| member.club_id)).await?;
    for member in &mut members {
        member.club = clubs.get(&member.club_id).cloned();
    }
    Ok(Page::new(members, total, paging))
}

/// Only the owner may change roles, and never their own.
pub async fn update_member_role(db_pool: &SqlitePool, request: UpdateMemberRole, operator_id: i64) -> AppResult<ClubMember> {
    if request.role == MemberRole::Owner {
        return Err(Reject::BadRequest("role must be admin or member".to_owned()).into());
    }
    let member = find_member(db_pool, request.id).await?;
    let operator = membership(db_pool, member.club_id, operator_id)
        .await?
        .ok_or_else(|| Reject::Forbidden("not a member of this fans club".to_owned()))?;
    if operator.role != MemberRole::Owner {
        return Err(Reject::Forbidden("only the owner can change member roles".to_owned()).into());
    }
    if member.role == MemberRole::Owner {
        return Err(Reject::Forbidden("the owner's role cannot be changed".to_owned()).into());
    }

    let member = sqlx::query_as("UPDATE gva_fans_club_member SET role = ?, updated_at = ? WHERE id = ? RETURNING *")
        .bind(request.role)
        .bind(OffsetDateTime::now_utc())
        .bind(member.id)
        .fetch_one(db_pool)
        .await?;
    Ok(member)
}

/// Owners and admins may remove anyone but the owner.
pub async fn remove_member(db_pool: &SqlitePool, id: i64, operator_id: i64) -> AppResult<()> {
    let member = find_member(db_pool, id).await?;
    let operator = membership(db_pool, member.club_id, operator_id)
        .await?
        .ok_or_else(|| Reject::Forbidden("not a member of this fans club".to_owned()))?;
    if !operator.role.can_moderate() {
        return Err(Reject::Forbidden("only the owner and admins can remove members".to_owned()).into());
    }
    if member.role == MemberRole::Owner {
        return Err(Reject::Forbidden("the owner cannot be removed".to_owned()).into());
    }

    leave(db_pool, &member).await?;
    info!(event = "member_removed", club_id = member.club_id, user_id = member.user_id, operator_id);
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn join(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(ByClub { club_id }): Json<ByClub>,
) -> AppResult<Json<Reply<ClubMember>>> {
    let member = join_club(&db_pool, club_id, user.numeric_id()?).await?;
    Ok(res::ok_with_data(member))
}

#[debug_handler(state = AppState)]
pub(crate) async fn quit(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(ByClub { club_id }): Json<ByClub>,
) -> AppResult<Json<Reply<Value>>> {
    quit_club(&db_pool, club_id, user.numeric_id()?).await?;
    Ok(res::ok_with_message("left the fans club"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    _user: User,
    State(db_pool): State<SqlitePool>,
    Query(search): Query<MemberSearch>,
) -> AppResult<Json<Reply<Page<ClubMember>>>> {
    let page = member_list(&db_pool, &search).await?;
    Ok(res::ok_with_data(page))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_role(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(request): Json<UpdateMemberRole>,
) -> AppResult<Json<Reply<ClubMember>>> {
    let member = update_member_role(&db_pool, request, user.numeric_id()?).await?;
    Ok(res::ok_with_data(member))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(ById { id }): Json<ById>,
) -> AppResult<Json<Reply<Value>>> {
    remove_member(&db_pool, id, user.numeric_id()?).await?;
    Ok(res::ok_with_message("member removed"))
}

use std::collections::HashMap;

use axum::{
    debug_handler,
    extract::{Query, State},
    Json,
};
use serde_json::Value;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    auth::User,
    res::{self, Reply},
    AppResult, AppState, Reject,
};

use super::{
    membership, missing,
    model::{ById, ClubSearch, ClubView, CreateClub, FansClub, MemberRole, Page, PageQuery, Paging, UpdateClub},
};

/// Returns the name without surrounding whitespace, which is what gets stored.
fn validate_name(name: &str) -> Result<&str, Reject> {
    let name = name.trim();
    if !(1..=100).contains(&name.chars().count()) {
        return Err(Reject::BadRequest("name must be 1 to 100 characters".to_owned()));
    }
    Ok(name)
}

pub async fn find_club(db_pool: &SqlitePool, id: i64) -> AppResult<FansClub> {
    sqlx::query_as("SELECT * FROM gva_fans_club WHERE id = ?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| missing("fans club"))
}

pub(crate) async fn clubs_by_id(db_pool: &SqlitePool, ids: impl IntoIterator<Item = i64>) -> AppResult<HashMap<i64, FansClub>> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM gva_fans_club WHERE id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let clubs: Vec<FansClub> = query.build_query_as::<FansClub>().fetch_all(db_pool).await?;
    Ok(clubs.into_iter().map(|club| (club.id, club)).collect())
}

/// The creator becomes the owner and first member.
pub async fn create_club(db_pool: &SqlitePool, request: CreateClub, user_id: i64) -> AppResult<FansClub> {
    let name = validate_name(&request.name)?;
    let now = OffsetDateTime::now_utc();

    let mut tx = db_pool.begin().await?;
    let club: FansClub = sqlx::query_as(
        "INSERT INTO gva_fans_club (created_at, updated_at, name, description, avatar, owner_id, member_count, level, status)
         VALUES (?, ?, ?, ?, ?, ?, 1, 1, 1) RETURNING *",
    )
    .bind(now)
    .bind(now)
    .bind(name)
    .bind(&request.description)
    .bind(&request.avatar)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO gva_fans_club_member (created_at, updated_at, club_id, user_id, role, level, points, joined_at)
         VALUES (?, ?, ?, ?, ?, 1, 0, ?)",
    )
    .bind(now)
    .bind(now)
    .bind(club.id)
    .bind(user_id)
    .bind(MemberRole::Owner)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(event = "fans_club_created", club_id = club.id, owner_id = user_id);
    Ok(club)
}

pub async fn update_club(db_pool: &SqlitePool, request: UpdateClub, user_id: i64) -> AppResult<FansClub> {
    let name = validate_name(&request.name)?;
    let club = find_club(db_pool, request.id).await?;
    if club.owner_id != user_id {
        return Err(Reject::Forbidden("only the owner can update this fans club".to_owned()).into());
    }

    let club = sqlx::query_as(
        "UPDATE gva_fans_club SET name = ?, description = ?, avatar = ?, status = COALESCE(?, status), updated_at = ?
         WHERE id = ? RETURNING *",
    )
    .bind(name)
    .bind(&request.description)
    .bind(&request.avatar)
    .bind(request.status)
    .bind(OffsetDateTime::now_utc())
    .bind(club.id)
    .fetch_one(db_pool)
    .await?;
    Ok(club)
}

/// Removes the club with all of its members and posts.
pub async fn delete_club(db_pool: &SqlitePool, id: i64, user_id: i64) -> AppResult<()> {
    let club = find_club(db_pool, id).await?;
    if club.owner_id != user_id {
        return Err(Reject::Forbidden("only the owner can delete this fans club".to_owned()).into());
    }

    let mut tx = db_pool.begin().await?;
    for statement in [
        "DELETE FROM gva_fans_club_member WHERE club_id = ?",
        "DELETE FROM gva_fans_club_post WHERE club_id = ?",
        "DELETE FROM gva_fans_club WHERE id = ?",
    ] {
        sqlx::query(statement).bind(id).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    info!(event = "fans_club_deleted", club_id = id);
    Ok(())
}

pub async fn get_club(db_pool: &SqlitePool, id: i64, user_id: i64) -> AppResult<ClubView> {
    let club = find_club(db_pool, id).await?;
    let role = membership(db_pool, id, user_id).await?.map(|member| member.role);
    Ok(ClubView::new(club, user_id, role))
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, search: &ClubSearch) {
    if !search.keyword.is_empty() {
        query.push(" AND name LIKE ").push_bind(format!("%{}%", search.keyword));
    }
    if let Some(status) = search.status {
        query.push(" AND status = ").push_bind(status);
    }
}

pub async fn list_clubs(db_pool: &SqlitePool, search: &ClubSearch, user_id: i64) -> AppResult<Page<ClubView>> {
    let paging = Paging::new(search.page, search.page_size);

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM gva_fans_club WHERE 1 = 1");
    push_filters(&mut count, search);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(db_pool).await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM gva_fans_club WHERE 1 = 1");
    push_filters(&mut query, search);
    query
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(paging.page_size)
        .push(" OFFSET ")
        .push_bind(paging.offset());
    let clubs: Vec<FansClub> = query.build_query_as::<FansClub>().fetch_all(db_pool).await?;

    let roles = roles_in(db_pool, user_id, clubs.iter().map(|club| club.id)).await?;
    let views = clubs
        .into_iter()
        .map(|club| {
            let role = roles.get(&club.id).copied();
            ClubView::new(club, user_id, role)
        })
        .collect();
    Ok(Page::new(views, total, paging))
}

async fn roles_in(
    db_pool: &SqlitePool,
    user_id: i64,
    club_ids: impl Iterator<Item = i64>,
) -> AppResult<HashMap<i64, MemberRole>> {
    let club_ids: Vec<i64> = club_ids.collect();
    if user_id <= 0 || club_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new("SELECT club_id, role FROM gva_fans_club_member WHERE user_id = ");
    query.push_bind(user_id).push(" AND club_id IN (");
    let mut separated = query.separated(", ");
    for id in club_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows: Vec<(i64, MemberRole)> = query.build_query_as::<(i64, MemberRole)>().fetch_all(db_pool).await?;
    Ok(rows.into_iter().collect())
}

#[derive(FromRow)]
struct JoinedClub {
    #[sqlx(flatten)]
    club: FansClub,
    member_role: MemberRole,
}

/// Clubs the user belongs to, most recently joined first.
pub async fn my_clubs(db_pool: &SqlitePool, paging: Paging, user_id: i64) -> AppResult<Page<ClubView>> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM gva_fans_club_member WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(db_pool)
        .await?;

    let rows: Vec<JoinedClub> = sqlx::query_as(
        "SELECT c.*, m.role AS member_role FROM gva_fans_club_member m
         JOIN gva_fans_club c ON c.id = m.club_id
         WHERE m.user_id = ? ORDER BY m.id DESC LIMIT ? OFFSET ?",
    )
    .bind(user_id)
    .bind(paging.page_size)
    .bind(paging.offset())
    .fetch_all(db_pool)
    .await?;

    let views = rows
        .into_iter()
        .map(|row| ClubView::new(row.club, user_id, Some(row.member_role)))
        .collect();
    Ok(Page::new(views, total, paging))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(request): Json<CreateClub>,
) -> AppResult<Json<Reply<FansClub>>> {
    let club = create_club(&db_pool, request, user.numeric_id()?).await?;
    Ok(res::ok_with_data(club))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(request): Json<UpdateClub>,
) -> AppResult<Json<Reply<FansClub>>> {
    let club = update_club(&db_pool, request, user.numeric_id()?).await?;
    Ok(res::ok_with_data(club))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(ById { id }): Json<ById>,
) -> AppResult<Json<Reply<Value>>> {
    delete_club(&db_pool, id, user.numeric_id()?).await?;
    Ok(res::ok_with_message("fans club deleted"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get(
    user: User,
    State(db_pool): State<SqlitePool>,
    Query(ById { id }): Query<ById>,
) -> AppResult<Json<Reply<ClubView>>> {
    let view = get_club(&db_pool, id, user.numeric_id()?).await?;
    Ok(res::ok_with_data(view))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    user: User,
    State(db_pool): State<SqlitePool>,
    Query(search): Query<ClubSearch>,
) -> AppResult<Json<Reply<Page<ClubView>>>> {
    let page = list_clubs(&db_pool, &search, user.numeric_id()?).await?;
    Ok(res::ok_with_data(page))
}

#[debug_handler(state = AppState)]
pub(crate) async fn mine(
    user: User,
    State(db_pool): State<SqlitePool>,
    Query(PageQuery { page, page_size }): Query<PageQuery>,
) -> AppResult<Json<Reply<Page<ClubView>>>> {
    let page = my_clubs(&db_pool, Paging::new(page, page_size), user.numeric_id()?).await?;
    Ok(res::ok_with_data(page))
}

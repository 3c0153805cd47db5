use axum::{
    debug_handler,
    extract::{Query, State},
    Json,
};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;

use crate::{
    auth::User,
    res::{self, Reply},
    AppResult, AppState, Reject,
};

use super::{
    club::{clubs_by_id, find_club},
    membership, missing,
    model::{ById, ClubPost, CreatePost, Page, Paging, PostSearch, UpdatePost},
};

fn validate_content(content: &str) -> Result<(), Reject> {
    if !(1..=1000).contains(&content.trim().chars().count()) {
        return Err(Reject::BadRequest("content must be 1 to 1000 characters".to_owned()));
    }
    Ok(())
}

async fn find_post(db_pool: &SqlitePool, id: i64) -> AppResult<ClubPost> {
    sqlx::query_as("SELECT * FROM gva_fans_club_post WHERE id = ?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| missing("post"))
}

pub async fn create_post(db_pool: &SqlitePool, request: CreatePost, user_id: i64) -> AppResult<ClubPost> {
    validate_content(&request.content)?;
    if membership(db_pool, request.club_id, user_id).await?.is_none() {
        return Err(Reject::Forbidden("only members can post".to_owned()).into());
    }
    let now = OffsetDateTime::now_utc();

    let post = sqlx::query_as(
        "INSERT INTO gva_fans_club_post (created_at, updated_at, club_id, user_id, content, images, like_count, comment_count)
         VALUES (?, ?, ?, ?, ?, ?, 0, 0) RETURNING *",
    )
    .bind(now)
    .bind(now)
    .bind(request.club_id)
    .bind(user_id)
    .bind(&request.content)
    .bind(serde_json::to_string(&request.images)?)
    .fetch_one(db_pool)
    .await?;
    Ok(post)
}

pub async fn update_post(db_pool: &SqlitePool, request: UpdatePost, user_id: i64) -> AppResult<ClubPost> {
    validate_content(&request.content)?;
    let post = find_post(db_pool, request.id).await?;
    if post.user_id != user_id {
        return Err(Reject::Forbidden("only the author can edit this post".to_owned()).into());
    }

    let post = sqlx::query_as("UPDATE gva_fans_club_post SET content = ?, images = ?, updated_at = ? WHERE id = ? RETURNING *")
        .bind(&request.content)
        .bind(serde_json::to_string(&request.images)?)
        .bind(OffsetDateTime::now_utc())
        .bind(post.id)
        .fetch_one(db_pool)
        .await?;
    Ok(post)
}

/// Authors delete their own posts; club owners and admins delete any.
pub async fn delete_post(db_pool: &SqlitePool, id: i64, user_id: i64) -> AppResult<()> {
    let post = find_post(db_pool, id).await?;
    if post.user_id != user_id {
        let moderator = membership(db_pool, post.club_id, user_id)
            .await?
            .is_some_and(|member| member.role.can_moderate());
        if !moderator {
            return Err(Reject::Forbidden("no permission to delete this post".to_owned()).into());
        }
    }

    sqlx::query("DELETE FROM gva_fans_club_post WHERE id = ?")
        .bind(post.id)
        .execute(db_pool)
        .await?;
    Ok(())
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, search: &PostSearch) {
    if search.club_id > 0 {
        query.push(" AND club_id = ").push_bind(search.club_id);
    }
    if search.user_id > 0 {
        query.push(" AND user_id = ").push_bind(search.user_id);
    }
}

pub async fn post_list(db_pool: &SqlitePool, search: &PostSearch) -> AppResult<Page<ClubPost>> {
    let paging = Paging::new(search.page, search.page_size);

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM gva_fans_club_post WHERE 1 = 1");
    push_filters(&mut count, search);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(db_pool).await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM gva_fans_club_post WHERE 1 = 1");
    push_filters(&mut query, search);
    query
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(paging.page_size)
        .push(" OFFSET ")
        .push_bind(paging.offset());
    let mut posts: Vec<ClubPost> = query.build_query_as::<ClubPost>().fetch_all(db_pool).await?;

    let clubs = clubs_by_id(db_pool, posts.iter().map(|post| post.club_id)).await?;
    for post in &mut posts {
        post.club = clubs.get(&post.club_id).cloned();
    }
    Ok(Page::new(posts, total, paging))
}

pub async fn get_post(db_pool: &SqlitePool, id: i64) -> AppResult<ClubPost> {
    let mut post = find_post(db_pool, id).await?;
    post.club = Some(find_club(db_pool, post.club_id).await?);
    Ok(post)
}

pub async fn like_post(db_pool: &SqlitePool, id: i64, user_id: i64) -> AppResult<()> {
    let post = find_post(db_pool, id).await?;
    if membership(db_pool, post.club_id, user_id).await?.is_none() {
        return Err(Reject::Forbidden("only members can like posts".to_owned()).into());
    }

    sqlx::query("UPDATE gva_fans_club_post SET like_count = like_count + 1 WHERE id = ?")
        .bind(post.id)
        .execute(db_pool)
        .await?;
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(request): Json<CreatePost>,
) -> AppResult<Json<Reply<ClubPost>>> {
    let post = create_post(&db_pool, request, user.numeric_id()?).await?;
    Ok(res::ok_with_data(post))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(request): Json<UpdatePost>,
) -> AppResult<Json<Reply<ClubPost>>> {
    let post = update_post(&db_pool, request, user.numeric_id()?).await?;
    Ok(res::ok_with_data(post))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(ById { id }): Json<ById>,
) -> AppResult<Json<Reply<Value>>> {
    delete_post(&db_pool, id, user.numeric_id()?).await?;
    Ok(res::ok_with_message("post deleted"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    _user: User,
    State(db_pool): State<SqlitePool>,
    Query(search): Query<PostSearch>,
) -> AppResult<Json<Reply<Page<ClubPost>>>> {
    let page = post_list(&db_pool, &search).await?;
    Ok(res::ok_with_data(page))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get(
    _user: User,
    State(db_pool): State<SqlitePool>,
    Query(ById { id }): Query<ById>,
) -> AppResult<Json<Reply<ClubPost>>> {
    let post = get_post(&db_pool, id).await?;
    Ok(res::ok_with_data(post))
}

#[debug_handler(state = AppState)]
pub(crate) async fn like(
    user: User,
    State(db_pool): State<SqlitePool>,
    Json(ById { id }): Json<ById>,
) -> AppResult<Json<Reply<Value>>> {
    like_post(&db_pool, id, user.numeric_id()?).await?;
    Ok(res::ok_with_message("liked"))
}

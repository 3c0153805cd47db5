pub mod club;
pub mod member;
pub mod model;
pub mod post;

use axum::{routing, Router};
use sqlx::SqlitePool;

use crate::{AppError, AppResult, AppState, Reject};

use model::ClubMember;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest(
            "/fansClub",
            Router::new()
                .route("/createFansClub", routing::post(club::create))
                .route("/updateFansClub", routing::put(club::update))
                .route("/deleteFansClub", routing::delete(club::delete))
                .route("/getFansClub", routing::get(club::get))
                .route("/getFansClubList", routing::get(club::list))
                .route("/getMyClubs", routing::get(club::mine)),
        )
        .nest(
            "/fansClubMember",
            Router::new()
                .route("/joinClub", routing::post(member::join))
                .route("/quitClub", routing::post(member::quit))
                .route("/getMemberList", routing::get(member::list))
                .route("/updateMemberRole", routing::put(member::update_role))
                .route("/removeMember", routing::delete(member::remove)),
        )
        .nest(
            "/fansClubPost",
            Router::new()
                .route("/createPost", routing::post(post::create))
                .route("/updatePost", routing::put(post::update))
                .route("/deletePost", routing::delete(post::delete))
                .route("/getPostList", routing::get(post::list))
                .route("/getPost", routing::get(post::get))
                .route("/likePost", routing::post(post::like)),
        )
}

fn missing(what: &str) -> AppError {
    Reject::NotFound(format!("{what} not found")).into()
}

/// The user's membership row in a club, if any.
pub async fn membership(db_pool: &SqlitePool, club_id: i64, user_id: i64) -> AppResult<Option<ClubMember>> {
    let member = sqlx::query_as("SELECT * FROM gva_fans_club_member WHERE club_id = ? AND user_id = ?")
        .bind(club_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(member)
}

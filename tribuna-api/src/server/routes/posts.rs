use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json,
};
use axum::{extract::State, response::Redirect};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tribuna_common::model::{
    Id, ModelValidationError,
    comment::{Comment, CommentText},
    group::{GroupMarker, Slug},
    post::{Post, PostMarker, PostText},
};
use tribuna_db::client::DbClient;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(post_detail)
        .typed_get(create_form)
        .typed_post(post_create)
        .typed_get(edit_form)
        .typed_post(post_edit)
        .typed_post(add_comment)
}

/// The submitted shape of the create and edit flows. Raw strings here;
/// validation happens in the handlers so failures name the offending field.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
struct PostForm {
    text: String,
    group: Option<String>,
    image: Option<String>,
}

struct ValidatedPostForm {
    text: PostText,
    group: Option<Id<GroupMarker>>,
    image: Option<String>,
}

/// Validate the text rules and resolve the submitted group slug to its id.
async fn validate_form(db: &DbClient, form: PostForm) -> Result<ValidatedPostForm> {
    let text = PostText::new(form.text).map_err(ModelValidationError::from)?;

    let group = match form.group {
        Some(slug) => {
            let slug = Slug::new(slug).map_err(ModelValidationError::from)?;
            let group = db
                .fetch_group_by_slug(&slug)
                .await?
                .ok_or(ServerError::GroupBySlugNotFound(slug))?;
            Some(group.id)
        }
        None => None,
    };

    Ok(ValidatedPostForm {
        text,
        group,
        image: form.image,
    })
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/", rejection(ServerError))]
struct PostDetailPath {
    id: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct PostDetail {
    post: Post,
    comments: Vec<Comment>,
}

async fn post_detail(
    PostDetailPath { id }: PostDetailPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostDetail>> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    let comments = db.list_post_comments(id).await?;

    Ok(Json(PostDetail { post, comments }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/create/", rejection(ServerError))]
struct CreatePath();

async fn create_form(CreatePath(): CreatePath, _user: AuthenticatedUser) -> Json<PostForm> {
    Json(PostForm::default())
}

async fn post_create(
    CreatePath(): CreatePath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(form): Json<PostForm>,
) -> Result<Redirect> {
    let form = validate_form(&db, form).await?;

    db.create_post(user.user_id(), &form.text, form.group, form.image.as_deref())
        .await?;

    Ok(Redirect::to(&format!("/profile/{}/", user.username())))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/edit/", rejection(ServerError))]
struct PostEditPath {
    id: Id<PostMarker>,
}

/// The edit form, prefilled. Requested by id *and* author, so someone
/// else's post looks exactly like a missing one.
async fn edit_form(
    PostEditPath { id }: PostEditPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<PostForm>> {
    let post = db
        .fetch_post_by_author(id, user.user_id())
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(PostForm {
        text: post.text.into_inner(),
        group: post.group.map(|group| group.slug.get().to_owned()),
        image: post.image,
    }))
}

async fn post_edit(
    PostEditPath { id }: PostEditPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(form): Json<PostForm>,
) -> Result<Redirect> {
    let form = validate_form(&db, form).await?;

    let updated = db
        .update_post(
            id,
            user.user_id(),
            &form.text,
            form.group,
            form.image.as_deref(),
        )
        .await?;
    if !updated {
        return Err(ServerError::PostByIdNotFound(id));
    }

    Ok(Redirect::to(&format!("/posts/{id}/")))
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
struct CommentForm {
    text: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comment/", rejection(ServerError))]
struct AddCommentPath {
    id: Id<PostMarker>,
}

async fn add_comment(
    AddCommentPath { id }: AddCommentPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(form): Json<CommentForm>,
) -> Result<Redirect> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    let text = CommentText::new(form.text).map_err(ModelValidationError::from)?;
    db.create_comment(post.id, user.user_id(), &text).await?;

    Ok(Redirect::to(&format!("/posts/{id}/")))
}

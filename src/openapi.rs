use crate::models::{PostView, Role, UserSummary};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_users,
        crate::routes::stats,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::delete_post,
        crate::routes::like_post,
        crate::routes::unlike_post,
        crate::routes::me,
    ),
    components(schemas(
        Role, UserSummary, PostView,
        crate::routes::RegisterForm, crate::routes::LoginForm,
        crate::routes::NewPostRequest, crate::routes::PostCreatedResponse,
        crate::routes::LikeResponse, crate::routes::MeResponse,
        crate::routes::StatsResponse,
    )),
    tags(
        (name = "users", description = "User directory"),
        (name = "posts", description = "Post operations"),
        (name = "likes", description = "Like/unlike operations"),
    )
)]
pub struct ApiDoc;

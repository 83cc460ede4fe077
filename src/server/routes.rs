//! Route table. Every path carries a trailing slash, which the mobile client
//! relies on.

use axum::{middleware, routing::get, routing::post, Extension, Router};
use tower_http::trace::TraceLayer;

use super::auth::auth_middleware;
use super::handlers::{farmer_data, health, reference, users};
use super::AppState;
use crate::models::ReferenceKind;

pub const API_PREFIX: &str = "/api/v1";

fn reference_routes(kind: ReferenceKind) -> Router<AppState> {
    let segment = match kind {
        ReferenceKind::FarmType => "farm-types",
        ReferenceKind::Crop => "crops",
    };
    let collection = format!("{}/{}/", API_PREFIX, segment);
    let member = format!("{}/{}/{{id}}/", API_PREFIX, segment);

    Router::new()
        .route(&collection, get(reference::list).post(reference::create))
        .route(
            &member,
            get(reference::retrieve)
                .put(reference::update)
                .patch(reference::partial_update)
                .delete(reference::destroy),
        )
        .layer(Extension(kind))
}

fn farmer_data_routes() -> Router<AppState> {
    Router::new()
        .route(
            &format!("{}/farmer-data/", API_PREFIX),
            get(farmer_data::list).post(farmer_data::create),
        )
        .route(
            &format!("{}/farmer-data/sync/", API_PREFIX),
            post(farmer_data::sync),
        )
        .route(
            &format!("{}/farmer-data/{{id}}/", API_PREFIX),
            get(farmer_data::retrieve)
                .put(farmer_data::update)
                .patch(farmer_data::partial_update)
                .delete(farmer_data::destroy),
        )
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route(&format!("{}/users/", API_PREFIX), get(users::list))
        .route(&format!("{}/users/me/", API_PREFIX), get(users::me))
        .route(
            &format!("{}/users/{{id}}/", API_PREFIX),
            get(users::retrieve).patch(users::partial_update),
        )
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth); `get` also answers HEAD.
    let public_routes = Router::new().route(&format!("{}/health/", API_PREFIX), get(health::health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .merge(reference_routes(ReferenceKind::FarmType))
        .merge(reference_routes(ReferenceKind::Crop))
        .merge(farmer_data_routes())
        .merge(user_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, UserRepository};
    use crate::models::Role;
    use crate::server::tokens::hash_token;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use sqlx::SqlitePool;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const ADMIN: &str = "admin-token";
    const CLERK: &str = "clerk-token";
    const OTHER_CLERK: &str = "other-clerk-token";

    struct TestContext {
        app: Router,
        pool: SqlitePool,
        admin_id: i64,
        clerk_id: i64,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();

        let users = UserRepository::new(pool.clone());
        let admin = users
            .create("admin", None, Role::Admin, &hash_token(ADMIN))
            .await
            .unwrap();
        let clerk = users
            .create("clerk", None, Role::Clerk, &hash_token(CLERK))
            .await
            .unwrap();
        users
            .create("clerk2", None, Role::Clerk, &hash_token(OTHER_CLERK))
            .await
            .unwrap();

        TestContext {
            app: router(AppState::new(pool.clone())),
            pool,
            admin_id: admin.id,
            clerk_id: clerk.id,
            _temp_dir: temp_dir,
        }
    }

    impl TestContext {
        async fn send(
            &self,
            method: Method,
            path: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method(method)
                .uri(format!("{}{}", API_PREFIX, path));
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        /// Creates a farm type and a crop as admin, returning their ids.
        async fn seed_references(&self) -> (i64, i64) {
            let (_, farm_type) = self
                .send(Method::POST, "/farm-types/", Some(ADMIN), Some(json!({"name": "Dairy"})))
                .await;
            let (_, crop) = self
                .send(Method::POST, "/crops/", Some(ADMIN), Some(json!({"name": "Maize"})))
                .await;
            (
                farm_type["id"].as_i64().unwrap(),
                crop["id"].as_i64().unwrap(),
            )
        }

        async fn farmer_data_count(&self) -> i64 {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM farmer_data")
                .fetch_one(&self.pool)
                .await
                .unwrap();
            count
        }
    }

    fn record(farm_type: i64, crop: i64, local_id: &str, name: &str) -> Value {
        json!({
            "local_id": local_id,
            "farmer_name": name,
            "national_id": "2211",
            "farm_type": farm_type,
            "crop": crop,
            "location": "Meru",
        })
    }

    #[tokio::test]
    async fn test_health_needs_no_credentials() {
        let ctx = setup().await;

        let (status, body) = ctx.send(Method::GET, "/health/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "ok", "message": "API server is running"})
        );

        let (status, _) = ctx.send(Method::HEAD, "/health/", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_or_bad_credentials_are_401() {
        let ctx = setup().await;

        let (status, body) = ctx.send(Method::GET, "/farm-types/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            json!({"detail": "Authentication credentials were not provided."})
        );

        let (status, _) = ctx
            .send(Method::GET, "/farm-types/", Some("not-a-token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_jwt_scheme_is_accepted() {
        let ctx = setup().await;
        let request = Request::builder()
            .uri(format!("{}/users/me/", API_PREFIX))
            .header(header::AUTHORIZATION, format!("JWT {}", CLERK))
            .body(Body::empty())
            .unwrap();

        let response = ctx.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_inactive_user_is_401() {
        let ctx = setup().await;
        let (status, _) = ctx
            .send(
                Method::PATCH,
                &format!("/users/{}/", ctx.clerk_id),
                Some(ADMIN),
                Some(json!({"is_active": false})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = ctx.send(Method::GET, "/farmer-data/", Some(CLERK), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"detail": "User inactive or deleted."}));
    }

    #[tokio::test]
    async fn test_reference_writes_need_admin() {
        let ctx = setup().await;

        let (status, body) = ctx
            .send(Method::POST, "/farm-types/", Some(CLERK), Some(json!({"name": "Poultry"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body,
            json!({"detail": "You do not have permission to perform this action."})
        );

        let (status, body) = ctx
            .send(
                Method::POST,
                "/farm-types/",
                Some(ADMIN),
                Some(json!({"name": "Poultry", "created_by": 999})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Poultry");
        assert_eq!(body["description"], "");
        assert_eq!(body["created_by"], ctx.admin_id);

        // Any authenticated caller may read.
        let (status, list) = ctx.send(Method::GET, "/farm-types/", Some(CLERK), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let id = body["id"].as_i64().unwrap();
        let (status, _) = ctx
            .send(Method::DELETE, &format!("/farm-types/{}/", id), Some(CLERK), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_reference_update_and_validation() {
        let ctx = setup().await;
        let (_, crop) = ctx
            .send(
                Method::POST,
                "/crops/",
                Some(ADMIN),
                Some(json!({"name": "Beans", "description": "Legume"})),
            )
            .await;
        let path = format!("/crops/{}/", crop["id"]);

        let (status, body) = ctx
            .send(Method::PATCH, &path, Some(ADMIN), Some(json!({"name": "Beans (dry)"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Beans (dry)");
        assert_eq!(body["description"], "Legume");

        let (status, body) = ctx
            .send(Method::PUT, &path, Some(ADMIN), Some(json!({"description": "x"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"name": ["This field is required."]}));

        let (status, body) = ctx
            .send(Method::PUT, &path, Some(ADMIN), Some(json!({"name": "Peas"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["description"], "");

        let (status, _) = ctx
            .send(Method::GET, "/crops/999/", Some(CLERK), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_farmer_data_create_ignores_client_creator() {
        let ctx = setup().await;
        let (farm_type, crop) = ctx.seed_references().await;
        let mut payload = record(farm_type, crop, "", "Njeri");
        payload["created_by"] = json!(ctx.admin_id);
        payload["is_synced"] = json!(false);

        let (status, body) = ctx
            .send(Method::POST, "/farmer-data/", Some(CLERK), Some(payload))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["created_by"], ctx.clerk_id);
        assert_eq!(body["is_synced"], true);
        assert_eq!(body["local_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_farmer_data_create_validation() {
        let ctx = setup().await;
        let (farm_type, _) = ctx.seed_references().await;

        let (status, body) = ctx
            .send(
                Method::POST,
                "/farmer-data/",
                Some(CLERK),
                Some(json!({"farmer_name": "", "farm_type": farm_type, "crop": 404})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["farmer_name"], json!(["This field may not be blank."]));
        assert_eq!(body["national_id"], json!(["This field is required."]));
        assert_eq!(body["location"], json!(["This field is required."]));

        let (status, body) = ctx
            .send(
                Method::POST,
                "/farmer-data/",
                Some(CLERK),
                Some(record(farm_type, 404, "", "Njeri")),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"crop": ["Invalid pk \"404\" - object does not exist."]})
        );
    }

    #[tokio::test]
    async fn test_duplicate_local_id_on_create_is_400() {
        let ctx = setup().await;
        let (farm_type, crop) = ctx.seed_references().await;
        let payload = record(farm_type, crop, "dev-1", "Njeri");

        let (status, _) = ctx
            .send(Method::POST, "/farmer-data/", Some(CLERK), Some(payload.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = ctx
            .send(Method::POST, "/farmer-data/", Some(CLERK), Some(payload))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("local_id").is_some());
    }

    #[tokio::test]
    async fn test_clerk_sees_only_own_records() {
        let ctx = setup().await;
        let (farm_type, crop) = ctx.seed_references().await;

        let (_, mine) = ctx
            .send(Method::POST, "/farmer-data/", Some(CLERK), Some(record(farm_type, crop, "", "Mine")))
            .await;
        let (_, theirs) = ctx
            .send(
                Method::POST,
                "/farmer-data/",
                Some(OTHER_CLERK),
                Some(record(farm_type, crop, "", "Theirs")),
            )
            .await;

        let (_, list) = ctx.send(Method::GET, "/farmer-data/", Some(CLERK), None).await;
        let names: Vec<&str> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["farmer_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Mine"]);

        let (_, list) = ctx.send(Method::GET, "/farmer-data/", Some(ADMIN), None).await;
        assert_eq!(list.as_array().unwrap().len(), 2);

        // Out-of-scope records look absent.
        let theirs_path = format!("/farmer-data/{}/", theirs["id"]);
        for method in [Method::GET, Method::DELETE] {
            let (status, _) = ctx.send(method, &theirs_path, Some(CLERK), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
        let (status, _) = ctx
            .send(Method::PATCH, &theirs_path, Some(CLERK), Some(json!({"location": "X"})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = ctx
            .send(Method::GET, &format!("/farmer-data/{}/", mine["id"]), Some(CLERK), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = ctx.send(Method::GET, &theirs_path, Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_farmer_data_update_and_delete() {
        let ctx = setup().await;
        let (farm_type, crop) = ctx.seed_references().await;
        let (_, created) = ctx
            .send(Method::POST, "/farmer-data/", Some(CLERK), Some(record(farm_type, crop, "", "Old")))
            .await;
        let path = format!("/farmer-data/{}/", created["id"]);

        let (status, body) = ctx
            .send(Method::PATCH, &path, Some(CLERK), Some(json!({"farmer_name": "New"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["farmer_name"], "New");
        assert_eq!(body["location"], "Meru");
        assert_eq!(body["created_at"], created["created_at"]);

        let (status, body) = ctx
            .send(Method::PUT, &path, Some(CLERK), Some(json!({"farmer_name": "Only"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["location"], json!(["This field is required."]));

        let (status, _) = ctx.send(Method::DELETE, &path, Some(CLERK), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(ctx.farmer_data_count().await, 0);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let ctx = setup().await;
        let (farm_type, crop) = ctx.seed_references().await;
        let batch = json!([
            record(farm_type, crop, "L1", "Kamau"),
            record(farm_type, crop, "L2", "Wambui"),
            record(farm_type, crop, "L3", "Odhiambo"),
        ]);

        let (status, body) = ctx
            .send(Method::POST, "/farmer-data/sync/", Some(CLERK), Some(batch.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"created": 3, "updated": 0, "status": "Sync completed successfully"})
        );

        let (_, body) = ctx
            .send(Method::POST, "/farmer-data/sync/", Some(CLERK), Some(batch))
            .await;
        assert_eq!(body["created"], 0);
        assert_eq!(body["updated"], 3);
        assert_eq!(ctx.farmer_data_count().await, 3);
    }

    #[tokio::test]
    async fn test_sync_rolls_back_on_invalid_item() {
        let ctx = setup().await;
        let (farm_type, crop) = ctx.seed_references().await;
        let batch = json!([
            record(farm_type, crop, "L1", "Kamau"),
            {"local_id": "L2", "farmer_name": "Wambui"},
        ]);

        let (status, body) = ctx
            .send(Method::POST, "/farmer-data/sync/", Some(CLERK), Some(batch))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["item"], 1);
        assert_eq!(body["errors"]["crop"], json!(["This field is required."]));
        assert_eq!(ctx.farmer_data_count().await, 0);
    }

    #[tokio::test]
    async fn test_sync_requires_a_list() {
        let ctx = setup().await;

        let (status, body) = ctx
            .send(Method::POST, "/farmer-data/sync/", Some(CLERK), Some(json!({"local_id": "x"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("Expected a list"));

        let (status, _) = ctx
            .send(Method::POST, "/farmer-data/sync/", None, Some(json!([])))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_deleting_farm_type_cascades_to_records() {
        let ctx = setup().await;
        let (farm_type, crop) = ctx.seed_references().await;
        ctx.send(Method::POST, "/farmer-data/", Some(CLERK), Some(record(farm_type, crop, "", "A")))
            .await;

        let (status, _) = ctx
            .send(Method::DELETE, &format!("/farm-types/{}/", farm_type), Some(ADMIN), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(ctx.farmer_data_count().await, 0);

        let (status, _) = ctx
            .send(Method::DELETE, &format!("/farm-types/{}/", farm_type), Some(ADMIN), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_user_endpoints() {
        let ctx = setup().await;

        let (status, me) = ctx.send(Method::GET, "/users/me/", Some(CLERK), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "clerk");
        assert_eq!(me["role"], "clerk");
        assert!(me.get("token_hash").is_none());

        let (status, _) = ctx.send(Method::GET, "/users/", Some(CLERK), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, list) = ctx.send(Method::GET, "/users/", Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 3);

        let (status, promoted) = ctx
            .send(
                Method::PATCH,
                &format!("/users/{}/", ctx.clerk_id),
                Some(ADMIN),
                Some(json!({"role": "admin"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(promoted["role"], "admin");

        // The promotion takes effect on the next request.
        let (status, _) = ctx
            .send(Method::POST, "/crops/", Some(CLERK), Some(json!({"name": "Tea"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = ctx
            .send(Method::PATCH, "/users/999/", Some(ADMIN), Some(json!({"role": "clerk"})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = ctx
            .send(
                Method::PATCH,
                &format!("/users/{}/", ctx.clerk_id),
                Some(ADMIN),
                Some(json!({"email": "x@example.com"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Supply role or is_active.");
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_json_404() {
        let ctx = setup().await;

        for path in ["/farmer-data/abc/", "/crops/1.5/", "/users/me2/"] {
            let (status, body) = ctx.send(Method::GET, path, Some(ADMIN), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
            assert_eq!(body, json!({"detail": "Not found."}), "{path}");
        }

        let (status, _) = ctx.send(Method::DELETE, "/farm-types/x/", Some(CLERK), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let ctx = setup().await;
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/farmer-data/", API_PREFIX))
            .header(header::AUTHORIZATION, format!("Bearer {}", CLERK))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = ctx.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

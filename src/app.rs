//! Application state and HTTP router construction.

use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::ACCEPT};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::api;
use crate::config::Config;
use crate::db::Database;
use crate::graphql::{BearerToken, ClientInfo, StacksSchema, bearer_token};
use crate::services::{Actor, Services};

/// Shared state for HTTP handlers (GraphQL, API routes).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub schema: StacksSchema,
    pub services: Services,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: Database, services: Services) -> Self {
        let schema = crate::graphql::build_schema(services.clone());
        Self {
            config,
            db,
            schema,
            services,
        }
    }

    /// Resolve the caller behind a bearer token. Invalid or revoked tokens
    /// leave the request anonymous.
    pub async fn actor_from_headers(&self, headers: &HeaderMap) -> Option<Actor> {
        let token = bearer_token(headers)?;
        match self.services.auth.authenticate(&token).await {
            Ok(actor) => Some(actor),
            Err(e) => {
                debug!(error = %e, "Ignoring unusable bearer token");
                None
            }
        }
    }
}

/// Build the full Axum router: health probes, /api, /graphql and layers.
pub fn build_app(state: AppState) -> Router<()> {
    Router::new()
        .merge(api::health::router())
        .nest("/api", api::exports::router())
        .route("/graphql", get(graphiql).post(graphql_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GraphQL query/mutation handler with auth context
async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let metrics = &state.services.metrics;
    metrics.record_request();

    let mut request = req.into_inner().data(ClientInfo::from_headers(&headers));
    if let Some(actor) = state.actor_from_headers(&headers).await {
        request = request.data(actor);
        if let Some(token) = bearer_token(&headers) {
            request = request.data(BearerToken(token));
        }
    }

    let response = state.schema.execute(request).await;
    if let Some(err) = response.errors.first() {
        metrics.record_error(&err.message);
    }
    response.into()
}

/// GraphiQL playground for browsers
async fn graphiql(headers: HeaderMap) -> impl IntoResponse {
    let accepts_html = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"));

    if accepts_html {
        Html(GraphiQLSource::build().endpoint("/graphql").finish()).into_response()
    } else {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            axum::Json(serde_json::json!({
                "success": false,
                "error": "Use POST with Content-Type: application/json for GraphQL requests"
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{staff_actor, test_db, test_services};
    use crate::config::CirculationPolicy;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            host: None,
            port: 0,
            database_url: "sqlite::memory:".into(),
            database_max_connections: 1,
            jwt_secret: "test-secret".into(),
            token_lifetime_secs: 3600,
            bcrypt_cost: 4,
            scheduler_enabled: false,
            policy: CirculationPolicy::default(),
        }
    }

    async fn test_state() -> AppState {
        let db = test_db().await;
        let services = test_services(&db);
        AppState::new(Arc::new(test_config()), db, services)
    }

    async fn post_graphql(app: Router, token: Option<&str>, query: &str) -> serde_json::Value {
        let mut req = Request::post("/graphql").header("content-type", "application/json");
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {}", token));
        }
        let body = serde_json::json!({ "query": query }).to_string();
        let response = app.oneshot(req.body(Body::from(body)).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = build_app(test_state().await);
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_then_query_me() {
        let state = test_state().await;
        let app = build_app(state.clone());

        let body = post_graphql(
            app.clone(),
            None,
            r#"mutation {
                register(input: {
                    username: "ada", email: "ada@uni.edu", password: "longpassword",
                    firstName: "Ada", lastName: "Lovelace", membershipType: STUDENT
                }) { success code payload { token user { username role } } }
            }"#,
        )
        .await;
        let result = &body["data"]["register"];
        assert_eq!(result["success"], true);
        // first account becomes the administrator
        assert_eq!(result["payload"]["user"]["role"], "ADMIN");
        let token = result["payload"]["token"].as_str().unwrap().to_string();

        let me = post_graphql(app.clone(), Some(&token), "{ me { username fullName } }").await;
        assert_eq!(me["data"]["me"]["username"], "ada");
        assert_eq!(me["data"]["me"]["fullName"], "Ada Lovelace");

        let anonymous = post_graphql(app, None, "{ me { username } }").await;
        assert_eq!(anonymous["errors"][0]["extensions"]["code"], "UNAUTHORIZED");
        assert!(state.services.metrics.take_counters().errors >= 1);
    }

    #[tokio::test]
    async fn test_mutation_failures_carry_codes() {
        let state = test_state().await;
        let staff = staff_actor(&state.db, "sam").await;
        let token = state
            .services
            .auth
            .issue_token(&state.services.accounts.get_user(&staff.user_id).await.unwrap())
            .unwrap()
            .token;
        let app = build_app(state);

        let body = post_graphql(
            app,
            Some(&token),
            r#"mutation { reserveBook(bookId: "missing") { success code error } }"#,
        )
        .await;
        assert_eq!(body["data"]["reserveBook"]["success"], false);
        assert_eq!(body["data"]["reserveBook"]["code"], "NOT_FOUND");
    }
}

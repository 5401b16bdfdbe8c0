use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{self, IntoResponse};
use axum::routing::post;
use axum::Router;
use db2gql_core::gql::cache::RelationCache;

use super::AppState;
use crate::cnf::ENABLE_GRAPHQL_DASHBOARD;

pub(super) fn router() -> Router<AppState> {
	let router = Router::new().route("/refresh", post(refresh));
	if *ENABLE_GRAPHQL_DASHBOARD {
		warn!(
			"IMPORTANT: GraphQL Dashboard is a pre-release feature. This is not recomended for production use."
		);
		router.route("/graphql", post(handler).get(graphiql))
	} else {
		router.route("/graphql", post(handler))
	}
}

async fn handler(State(state): State<AppState>, req: GraphQLRequest) -> GraphQLResponse {
	// Every request gets its own relation cache
	let req = req.into_inner().data(Arc::new(RelationCache::new()));
	state.schema.load_full().execute(req).await.into()
}

async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
	match state.refresh().await {
		Ok(()) => StatusCode::NO_CONTENT.into_response(),
		Err(e) => {
			error!("Schema refresh failed: {e}");
			(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
		}
	}
}

pub async fn graphiql() -> impl IntoResponse {
	response::Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

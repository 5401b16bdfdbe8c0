use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;

use super::AppState;

pub(super) fn router() -> Router<AppState> {
	Router::new().route("/health", get(handler))
}

async fn handler(State(state): State<AppState>) -> impl IntoResponse {
	let ds = state.api.datastore();
	// Listing the tables proves the database still answers
	match ds.adapter().tables(ds.namespace(), &[]).await {
		Ok(_) => StatusCode::OK,
		Err(e) => {
			trace!("Health check failed: {e}");
			StatusCode::SERVICE_UNAVAILABLE
		}
	}
}

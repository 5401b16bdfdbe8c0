mod gql;
mod health;
mod signals;

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_graphql::dynamic::Schema;
use axum::Router;
use db2gql_core::dbs::Db2Graphql;

use crate::err::Error;

const LOG: &str = "db2gql::net";

/// Shared by every request handler
#[derive(Clone)]
pub struct AppState {
	pub api: Arc<Db2Graphql>,
	/// The executable schema, swapped in place on refresh
	pub schema: Arc<ArcSwap<Schema>>,
}

impl AppState {
	pub async fn new(api: Arc<Db2Graphql>) -> Result<Self, Error> {
		let schema = api.get_executable_schema(false).await?;
		Ok(Self {
			api,
			schema: Arc::new(ArcSwap::from_pointee(schema)),
		})
	}

	/// Introspects the database again and replaces the served schema
	pub async fn refresh(&self) -> Result<(), Error> {
		let schema = self.api.get_executable_schema(true).await?;
		self.schema.store(Arc::new(schema));
		Ok(())
	}
}

pub fn router(state: AppState) -> Router {
	Router::new().merge(gql::router()).merge(health::router()).with_state(state)
}

pub async fn init(api: Arc<Db2Graphql>, bind: SocketAddr) -> Result<(), Error> {
	let state = AppState::new(api).await?;
	let listener = tokio::net::TcpListener::bind(bind).await?;
	info!(target: LOG, "Started web server on {}", bind);
	axum::serve(listener, router(state)).with_graceful_shutdown(signals::shutdown()).await?;
	info!(target: LOG, "Web server stopped. Bye!");
	Ok(())
}

#[cfg(test)]
mod tests {
	use async_graphql::Request;
	use db2gql_core::kvs::{ColumnDef, Descriptor, TableDef};

	use super::*;

	#[tokio::test]
	async fn refresh_swaps_the_served_schema() {
		let api = Arc::new(Db2Graphql::connect(Descriptor::memory()).await.unwrap());
		let table = TableDef::new("foo").column(ColumnDef::new("id", "integer").primary());
		api.create_table(&table).await.unwrap();
		let state = AppState::new(api.clone()).await.unwrap();
		let table = TableDef::new("bar").column(ColumnDef::new("id", "integer").primary());
		api.create_table(&table).await.unwrap();
		let query = "{ getPageBar { total } }";
		let res = state.schema.load_full().execute(Request::new(query)).await;
		assert!(!res.errors.is_empty());
		state.refresh().await.unwrap();
		let res = state.schema.load_full().execute(Request::new(query)).await;
		assert!(res.errors.is_empty(), "{:?}", res.errors);
	}
}

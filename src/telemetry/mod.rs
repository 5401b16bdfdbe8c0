use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;

use crate::err::Error;

#[derive(Default, Debug, Clone)]
pub struct Builder {
	log_level: Option<String>,
}

pub fn builder() -> Builder {
	Builder::default()
}

impl Builder {
	/// Set the log level on the builder
	pub fn with_log_level(mut self, log_level: &str) -> Self {
		self.log_level = Some(log_level.to_string());
		self
	}

	/// The filter for the configured level, which `RUST_LOG` may refine
	pub fn filter(&self) -> Result<EnvFilter, Error> {
		let level = match self.log_level.as_deref() {
			None => "info",
			Some("none") => "off",
			Some("full") => "trace",
			Some(level) => level,
		};
		let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| {
			// Only our own crates log above warn
			match level {
				"off" => "off".to_owned(),
				level => format!("warn,db2gql={level},db2gql_core={level}"),
			}
		});
		EnvFilter::builder().parse(directives).map_err(|e| Error::Telemetry(e.to_string()))
	}

	/// Build a tracing dispatcher with the fmt subscriber
	pub fn build(self) -> Result<Box<dyn Subscriber + Send + Sync + 'static>, Error> {
		let filter = self.filter()?;
		let layer = tracing_subscriber::fmt::layer()
			.compact()
			.with_ansi(true)
			.with_target(true)
			.with_span_events(FmtSpan::NONE)
			.with_writer(std::io::stderr)
			.with_filter(filter);
		Ok(Box::new(tracing_subscriber::registry().with(layer)))
	}

	/// Install the subscriber globally
	pub fn init(self) -> Result<(), Error> {
		self.build()?.try_init().map_err(|e| Error::Telemetry(e.to_string()))
	}
}

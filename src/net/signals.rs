use crate::err::Error;

/// Resolves once a shutdown signal arrives
pub async fn shutdown() {
	match listen().await {
		Ok(signal) => info!(target: super::LOG, "{} received. Waiting for graceful shutdown...", signal),
		Err(e) => error!(target: super::LOG, "Failed to listen to shutdown signal: {e}"),
	}
}

#[cfg(unix)]
pub async fn listen() -> Result<String, Error> {
	// Import the OS signals
	use tokio::signal::unix::{SignalKind, signal};
	// Get the operating system signal types
	let mut sighup = signal(SignalKind::hangup())?;
	let mut sigint = signal(SignalKind::interrupt())?;
	let mut sigquit = signal(SignalKind::quit())?;
	let mut sigterm = signal(SignalKind::terminate())?;
	// Listen and wait for the system signals
	tokio::select! {
		_ = sighup.recv() => Ok(String::from("SIGHUP")),
		_ = sigint.recv() => Ok(String::from("SIGINT")),
		_ = sigquit.recv() => Ok(String::from("SIGQUIT")),
		_ = sigterm.recv() => Ok(String::from("SIGTERM")),
	}
}

#[cfg(windows)]
pub async fn listen() -> Result<String, Error> {
	tokio::signal::ctrl_c().await?;
	Ok(String::from("CTRL-C"))
}

//! Process shutdown signals

use tracing::info;

#[cfg(unix)]
const SIGABRT: i32 = 6;

/// Wait for SIGINT, SIGTERM, SIGABRT or SIGQUIT
///
/// Handlers are installed on first poll. Once installed, the default action
/// for these signals stays disabled for the rest of the process.
#[cfg(unix)]
pub async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut abort = signal(SignalKind::from_raw(SIGABRT))?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = abort.recv() => "SIGABRT",
        _ = quit.recv() => "SIGQUIT",
    };
    info!(signal = name, "Received shutdown signal");
    Ok(())
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "ctrl-c", "Received shutdown signal");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::signal::unix::{signal, SignalKind};

    #[tokio::test]
    async fn test_sigabrt_requests_shutdown() {
        // Keep the process alive even if the waiter below is not polled yet
        let mut guard = signal(SignalKind::from_raw(SIGABRT)).unwrap();

        let waiter = tokio::spawn(shutdown_signal());
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = std::process::Command::new("kill")
            .args(["-ABRT", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let result = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        tokio_test::assert_ok!(result);
        assert!(guard.recv().await.is_some());
    }
}

use crate::state::State;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub(crate) fn build_health_json(state: &State) -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "uptime_secs": state.metrics.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) fn build_stats_json(state: &State) -> serde_json::Value {
    serde_json::json!({
        "uptime_secs": state.metrics.start_time.elapsed().as_secs(),
        "events": state.metrics.events(),
        "emails_sent": state.metrics.emails_sent(),
        "emails_scheduled": state.metrics.emails_scheduled(),
        "reminders_scheduled": state.metrics.reminders_scheduled(),
        "active_sessions": state.store.len(),
        "error_count": state.metrics.errors(),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) async fn run_health_server(listener: TcpListener, state: Arc<State>) {
    match listener.local_addr() {
        Ok(addr) => info!(addr = %addr, "Health server listening"),
        Err(e) => error!("Health server has no local addr: {e}"),
    }
    loop {
        let (mut stream, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Health accept error: {e}");
                continue;
            }
        };
        debug!(peer = %addr, "Health connection");
        let state = state.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
            let request = String::from_utf8_lossy(&buf);
            let path = request.split_whitespace().nth(1).unwrap_or("/");
            let body = if path == "/healthz" {
                build_health_json(&state).to_string()
            } else {
                build_stats_json(&state).to_string()
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state_with;
    use crate::traits::{MockChatApi, MockEmailGenerator, MockMailer, MockScheduler};

    fn quiet_state() -> State {
        test_state_with(
            MockChatApi::new(),
            MockEmailGenerator::new(),
            MockMailer::new(),
            MockScheduler::new(),
        )
    }

    #[test]
    fn test_build_health_json_has_status_ok() {
        let state = quiet_state();
        let json = build_health_json(&state);
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].is_u64());
        assert!(!json["version"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_build_stats_json_initially_zero() {
        let state = quiet_state();
        let json = build_stats_json(&state);
        assert_eq!(json["events"], 0);
        assert_eq!(json["emails_sent"], 0);
        assert_eq!(json["emails_scheduled"], 0);
        assert_eq!(json["reminders_scheduled"], 0);
        assert_eq!(json["active_sessions"], 0);
        assert_eq!(json["error_count"], 0);
    }

    #[test]
    fn test_build_stats_json_reflects_mutations() {
        let state = quiet_state();
        state.metrics.inc_events();
        state.metrics.inc_events();
        state.metrics.inc_emails_sent();
        state.metrics.inc_errors();
        state.store.start_compose(1);

        let json = build_stats_json(&state);
        assert_eq!(json["events"], 2);
        assert_eq!(json["emails_sent"], 1);
        assert_eq!(json["error_count"], 1);
        assert_eq!(json["active_sessions"], 1);
    }

    #[tokio::test]
    async fn test_health_endpoint_responds() {
        let state = Arc::new(quiet_state());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_health_server(listener, state.clone()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(
            &mut stream,
            b"GET /healthz HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await
        .unwrap();

        let mut response = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response)
            .await
            .unwrap();
        let response_str = String::from_utf8(response).unwrap();
        assert!(response_str.starts_with("HTTP/1.1 200 OK"));
        let body = response_str.split("\r\n\r\n").nth(1).unwrap();
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json.get("events").is_none());
    }

    #[tokio::test]
    async fn test_stats_endpoint_responds() {
        let state = Arc::new(quiet_state());
        state.metrics.inc_events();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_health_server(listener, state.clone()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(
            &mut stream,
            b"GET /stats HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await
        .unwrap();

        let mut response = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response)
            .await
            .unwrap();
        let response_str = String::from_utf8(response).unwrap();
        assert!(response_str.contains("Content-Type: application/json"));
        let body = response_str.split("\r\n\r\n").nth(1).unwrap();
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["events"], 1);
        assert!(json["version"].is_string());
    }
}

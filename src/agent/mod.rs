//! Node agent.
//!
//! Connects to the controller's agent endpoint, registers, reports host
//! telemetry on a fixed interval and runs forwarded tasks. The connection is
//! re-established with exponential backoff until shutdown.

pub mod executor;

use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::types::agent;
use crate::protocol::{ExecuteTask, Frame, RegisterPayload, StatsReport, AGENT_PATH};
use crate::telemetry::Sampler;

pub use executor::Activity;

const MIN_STATS_INTERVAL: Duration = Duration::from_secs(1);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

type ControllerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub controller_url: Url,
    pub node_id: String,
    pub label: String,
    pub stats_interval: Duration,
    pub register_only: bool,
}

impl AgentConfig {
    pub fn new(
        controller: &str,
        node_id: &str,
        label: Option<&str>,
        stats_interval: Duration,
        register_only: bool,
    ) -> Result<Self> {
        let node_id = node_id.trim();
        if node_id.is_empty() {
            return Err(Error::Config("Node id must not be empty".to_string()));
        }
        let label = label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(node_id)
            .to_string();

        Ok(Self {
            controller_url: controller_ws_url(controller)?,
            node_id: node_id.to_string(),
            label,
            stats_interval: stats_interval.max(MIN_STATS_INTERVAL),
            register_only,
        })
    }
}

/// Turn a controller base URL into its agent websocket URL.
///
/// `http`/`https` map to `ws`/`wss`, a missing scheme means `http`, and the
/// agent path is appended unless already present.
pub fn controller_ws_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|e| Error::Config(format!("Invalid controller URL '{}': {}", raw, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::Config(format!(
                "Unsupported controller URL scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("Invalid controller URL '{}'", raw)))?;

    if !url.path().ends_with(AGENT_PATH) {
        let path = format!("{}{}", url.path().trim_end_matches('/'), AGENT_PATH);
        url.set_path(&path);
    }
    Ok(url)
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

enum SessionEnd {
    Disconnected,
    Shutdown,
}

struct Agent {
    config: AgentConfig,
    activity: Activity,
    sampler: Sampler,
    tx: mpsc::UnboundedSender<Frame>,
}

impl Agent {
    fn new(config: AgentConfig, tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            config,
            activity: Activity::new(),
            sampler: Sampler::new(),
            tx,
        }
    }

    fn register_frame(&mut self) -> Frame {
        let sample = self.sampler.sample();
        Frame::with_payload(
            agent::REGISTER,
            &RegisterPayload {
                pi_id: self.config.node_id.clone(),
                label: Some(self.config.label.clone()),
                ram_total_gb: Some(sample.ram_total_gb),
                active_task: Some(self.activity.get()),
            },
        )
    }

    fn stats_frame(&mut self) -> Frame {
        let sample = self.sampler.sample();
        Frame::with_payload(
            agent::STATS_REPORT,
            &StatsReport {
                pi_id: self.config.node_id.clone(),
                cpu_percent: Some(sample.cpu_percent),
                ram_percent: Some(sample.ram_percent),
                ram_used_gb: Some(sample.ram_used_gb),
                ram_total_gb: Some(sample.ram_total_gb),
                active_task: Some(self.activity.get()),
            },
        )
    }

    /// React to a frame from the controller. Only `execute_task` is acted on.
    fn handle_frame(&self, frame: Frame) {
        if frame.event != agent::EXECUTE_TASK {
            tracing::debug!("Ignoring '{}' from controller", frame.event);
            return;
        }
        if self.config.register_only {
            tracing::info!("Ignoring task request because agent is in register-only mode");
            return;
        }

        let job = match frame.payload::<ExecuteTask>() {
            Ok(job) => job,
            Err(e) => match frame.data["request_id"].as_str() {
                // Still answer the request so the controller can close it.
                Some(request_id) if !request_id.is_empty() => {
                    tracing::error!("Task payload has invalid command: {}", e);
                    ExecuteTask {
                        request_id: request_id.to_string(),
                        task_id: frame.data["task_id"].as_str().map(str::to_string),
                        command: Vec::new(),
                        label: frame.data["label"].as_str().map(str::to_string),
                    }
                }
                _ => {
                    tracing::error!("Task payload missing request_id: {}", frame.data);
                    return;
                }
            },
        };
        if job.request_id.is_empty() {
            tracing::error!("Task payload missing request_id: {}", frame.data);
            return;
        }

        tokio::spawn(executor::execute(
            job,
            self.config.node_id.clone(),
            self.activity.clone(),
            self.tx.clone(),
        ));
    }

    async fn session<F>(
        &mut self,
        ws: ControllerSocket,
        outbound: &mut mpsc::UnboundedReceiver<Frame>,
        shutdown: &mut Pin<&mut F>,
    ) -> SessionEnd
    where
        F: Future<Output = ()>,
    {
        let (mut sink, mut stream) = ws.split();

        tracing::info!("Connected to controller; registering as {}", self.config.node_id);
        let register = self.register_frame();
        if let Some(msg) = encode(&register) {
            if sink.send(msg).await.is_err() {
                return SessionEnd::Disconnected;
            }
        }

        let mut ticker = tokio::time::interval(self.config.stats_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.as_mut() => {
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => match Frame::parse(&text) {
                        Ok(frame) => self.handle_frame(frame),
                        Err(e) => tracing::warn!("Malformed frame from controller: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("Controller connection error: {}", e);
                        return SessionEnd::Disconnected;
                    }
                },
                Some(frame) = outbound.recv() => {
                    if let Some(msg) = encode(&frame) {
                        if sink.send(msg).await.is_err() {
                            return SessionEnd::Disconnected;
                        }
                    }
                }
                _ = ticker.tick() => {
                    let stats = self.stats_frame();
                    if let Some(msg) = encode(&stats) {
                        if sink.send(msg).await.is_err() {
                            return SessionEnd::Disconnected;
                        }
                    }
                }
            }
        }
    }
}

fn encode(frame: &Frame) -> Option<Message> {
    match frame.to_text() {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::warn!("Dropping unencodable '{}' frame: {}", frame.event, e);
            None
        }
    }
}

/// Run the agent until `shutdown` resolves.
///
/// Task events produced while disconnected are queued and sent after the
/// next successful registration.
pub async fn run<F>(config: AgentConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let (tx, mut outbound) = mpsc::unbounded_channel();
    let mut agent = Agent::new(config, tx);
    let mut backoff = INITIAL_BACKOFF;

    tracing::info!(
        "Connecting to {} as {} (register-only={})",
        agent.config.controller_url,
        agent.config.node_id,
        agent.config.register_only
    );

    loop {
        let connect = tokio::select! {
            _ = shutdown.as_mut() => break,
            result = connect_async(agent.config.controller_url.clone()) => result,
        };

        let ws = match connect {
            Ok((ws, _)) => ws,
            Err(e) => {
                tracing::warn!("Unable to connect to controller: {}; retrying in {:?}", e, backoff);
                tokio::select! {
                    _ = shutdown.as_mut() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = next_backoff(backoff);
                continue;
            }
        };
        backoff = INITIAL_BACKOFF;

        match agent.session(ws, &mut outbound, &mut shutdown).await {
            SessionEnd::Shutdown => break,
            SessionEnd::Disconnected => tracing::warn!("Disconnected from controller"),
        }
    }

    tracing::info!("Agent stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TaskSpec;
    use crate::config::Settings;
    use crate::controller::Controller;
    use crate::hub::ChannelGroup;
    use crate::protocol::RunTaskRequest;
    use crate::registry::{Registry, IDLE};
    use crate::web::router::create_app_router;
    use serde_json::json;
    use std::sync::Arc;

    fn config(register_only: bool) -> AgentConfig {
        AgentConfig::new(
            "http://127.0.0.1:8000",
            "rpi-07",
            None,
            Duration::from_secs(5),
            register_only,
        )
        .unwrap()
    }

    #[test]
    fn test_controller_url_normalization() {
        let cases = [
            ("http://10.0.0.2:8000", "ws://10.0.0.2:8000/ws/pi"),
            ("https://fleet.example/", "wss://fleet.example/ws/pi"),
            ("10.0.0.2:8000", "ws://10.0.0.2:8000/ws/pi"),
            ("ws://10.0.0.2:8000/ws/pi", "ws://10.0.0.2:8000/ws/pi"),
            ("http://host/prefix/", "ws://host/prefix/ws/pi"),
        ];
        for (raw, expected) in cases {
            assert_eq!(controller_ws_url(raw).unwrap().as_str(), expected, "{}", raw);
        }
        assert!(controller_ws_url("ftp://host").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = AgentConfig::new("host:8000", " rpi-07 ", Some(" "), Duration::ZERO, false)
            .unwrap();
        assert_eq!(config.node_id, "rpi-07");
        assert_eq!(config.label, "rpi-07");
        assert_eq!(config.stats_interval, MIN_STATS_INTERVAL);
        assert!(AgentConfig::new("host", "", None, Duration::ZERO, false).is_err());
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = INITIAL_BACKOFF;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(backoff.as_secs());
            backoff = next_backoff(backoff);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_register_and_stats_frames() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut agent = Agent::new(config(false), tx);

        let register = agent.register_frame();
        assert_eq!(register.event, "register");
        assert_eq!(register.data["pi_id"], "rpi-07");
        assert_eq!(register.data["active_task"], IDLE);
        assert!(register.data["ram_total_gb"].as_f64().unwrap() > 0.0);

        let stats = agent.stats_frame();
        assert_eq!(stats.event, "stats_report");
        assert!(stats.data["ram_percent"].is_number());
    }

    #[tokio::test]
    async fn test_register_only_ignores_execution() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agent = Agent::new(config(true), tx);

        agent.handle_frame(Frame::new(
            "execute_task",
            json!({ "request_id": "r1", "command": ["true"] }),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_command_is_answered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agent = Agent::new(config(false), tx);

        agent.handle_frame(Frame::new(
            "execute_task",
            json!({ "request_id": "r1", "task_id": "uptime", "command": "uptime" }),
        ));

        let mut events = Vec::new();
        while let Ok(Some(frame)) =
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await
        {
            let done = frame.event == "task_finished";
            events.push(frame.event);
            if done {
                break;
            }
        }
        assert_eq!(events, vec!["task_started", "task_error", "task_finished"]);
    }

    #[tokio::test]
    async fn test_agent_round_trip_through_controller() {
        crate::logging::init_test();
        let mut settings = Settings::default();
        settings.tasks = vec![TaskSpec::new(
            "hello",
            "Hello",
            "",
            &["sh", "-c", "echo from-agent"],
        )];
        let ctl = Arc::new(Controller::with_registry(
            settings,
            Arc::new(Registry::in_memory()),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_app_router(ctl.clone(), None);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let agent_config = AgentConfig::new(
            &format!("http://{}", addr),
            "rpi-test",
            Some("Test Pi"),
            Duration::from_secs(1),
            false,
        )
        .unwrap();
        let agent = tokio::spawn(run(agent_config, async {
            let _ = stop_rx.await;
        }));

        let mut registered = false;
        for _ in 0..100 {
            if ctl.registry().get("rpi-test").map_or(false, |n| n.online) {
                registered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(registered, "agent never registered");
        assert_eq!(ctl.registry().get("rpi-test").unwrap().label, "Test Pi");

        let (viewer, mut viewer_rx) = ctl.hub().open(ChannelGroup::Viewer);
        let ack = ctl
            .run_task(
                viewer,
                RunTaskRequest {
                    task: Some("hello".to_string()),
                    pi_id: Some("rpi-test".to_string()),
                },
            )
            .unwrap();
        assert_eq!(ack["status"], "forwarded");

        let mut lines = Vec::new();
        let mut exit_code = None;
        while exit_code.is_none() {
            let frame = tokio::time::timeout(Duration::from_secs(10), viewer_rx.recv())
                .await
                .expect("timed out waiting for relay")
                .expect("viewer channel closed");
            match frame.event.as_str() {
                "task_output" => lines.push(frame.data["line"].as_str().unwrap_or_default().to_string()),
                "task_finished" => exit_code = frame.data["exit_code"].as_i64(),
                _ => {}
            }
        }
        assert_eq!(lines, vec!["from-agent"]);
        assert_eq!(exit_code, Some(0));

        let _ = stop_tx.send(());
        tokio::time::timeout(Duration::from_secs(5), agent)
            .await
            .expect("agent did not stop")
            .unwrap()
            .unwrap();
    }
}

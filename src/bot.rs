//! Bot
//!
//! Ties the pieces together: one push connection driven by a [`Session`],
//! a [`BotRegistry`] filled by bot creation, and a broadcast channel of
//! [`BotEvent`]s for the owner.
//!
//! The session runs in its own task. It is the only reader of the
//! connection and the only writer of frames; bot creation and posting are
//! spawned and never awaited by the session.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::{BotConfig, Config, ConfigError};
use crate::events::{BotCreated, BotEvent};
use crate::faye::{encode_batch, Action, Session};
use crate::groupme::{Actuator, ActuatorError, BotRegistry, GroupMeClient, GroupMeConfig};
use crate::transport::{Connection, Transport, TransportEvent, WebSocketTransport};

const EVENT_CAPACITY: usize = 256;

/// Disconnect reason when the owner stops the session
pub const CLOSED_BY_CLIENT: &str = "closed by client";

/// A GroupMe bot: push session plus per-group bots
pub struct Bot {
    config: BotConfig,
    push_url: String,
    transport: Arc<dyn Transport>,
    bots: Bots,
    session_task: Mutex<Option<JoinHandle<()>>>,
}

impl Bot {
    /// Create a bot over the given collaborators
    pub fn new(
        config: BotConfig,
        push_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        actuator: Arc<dyn Actuator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            config,
            push_url: push_url.into(),
            transport,
            bots: Bots {
                actuator,
                registry: BotRegistry::new(),
                events,
            },
            session_task: Mutex::new(None),
        }
    }

    /// Create a bot talking to GroupMe over WebSocket and REST
    pub fn from_config(config: &Config) -> Result<Self, BotError> {
        config.validate()?;

        let client = GroupMeClient::new(GroupMeConfig::from_config(config))?;

        Ok(Self::new(
            config.bot.clone(),
            config.endpoints.push_url.clone(),
            Arc::new(WebSocketTransport::new()),
            Arc::new(client),
        ))
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.bots.events.subscribe()
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn registry(&self) -> &BotRegistry {
        &self.bots.registry
    }

    /// Open the push connection and start a fresh session
    ///
    /// A running session is stopped first and reported as
    /// [`BotEvent::Disconnected`]. Failure to connect is reported as
    /// [`BotEvent::ConnectFailed`].
    pub async fn connect(&self) {
        let mut task = self.session_task.lock().await;
        if let Some(previous) = task.take() {
            self.stop_session(previous).await;
        }

        match self.transport.connect(&self.push_url).await {
            Ok(connection) => {
                tracing::info!(url = %self.push_url, "Connected to push service");
                let session = Session::new(self.config.clone());
                *task = Some(tokio::spawn(run_session(
                    session,
                    connection,
                    self.bots.clone(),
                )));
            }
            Err(e) => {
                tracing::error!(url = %self.push_url, error = %e, "Connection failed");
                self.bots.emit(BotEvent::ConnectFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Stop the running session, if any
    ///
    /// Publishes [`BotEvent::Disconnected`] unless the session had already
    /// ended on its own. Dropping the bot stops the session silently.
    pub async fn disconnect(&self) {
        if let Some(task) = self.session_task.lock().await.take() {
            self.stop_session(task).await;
        }
    }

    async fn stop_session(&self, task: JoinHandle<()>) {
        task.abort();
        // A session that finished first has already published its disconnect
        if let Err(e) = task.await {
            if e.is_cancelled() {
                tracing::info!("Session stopped");
                self.bots.emit(BotEvent::Disconnected {
                    reason: Some(CLOSED_BY_CLIENT.to_string()),
                });
            }
        }
    }

    /// Create a bot in a group
    ///
    /// On success the registry is updated and [`BotEvent::BotCreated`] is
    /// published; failures are only logged. The handle may be ignored.
    pub fn create_bot(&self, name: &str, group_id: &str) -> JoinHandle<()> {
        self.bots.spawn_create(name.to_string(), group_id.to_string())
    }

    /// Post text through the group's bot, or through every bot if no group
    /// is given
    ///
    /// Groups without a bot are skipped. Returns the number of posts issued;
    /// their outcome is not observed.
    pub async fn post_message(&self, text: &str, group_id: Option<&str>) -> usize {
        let targets = self
            .bots
            .registry
            .targets(group_id, &self.config.groups)
            .await;

        if targets.is_empty() {
            tracing::debug!(group_id = ?group_id, "No bot to post through");
        }
        for (group, bot_id) in &targets {
            tracing::debug!(group_id = %group, bot_id = %bot_id, "Posting message");
            self.bots.spawn_post(bot_id.clone(), text.to_string());
        }

        targets.len()
    }
}

impl Drop for Bot {
    fn drop(&mut self) {
        if let Some(task) = self.session_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Handles shared with the session task and spawned REST calls
#[derive(Clone)]
struct Bots {
    actuator: Arc<dyn Actuator>,
    registry: BotRegistry,
    events: broadcast::Sender<BotEvent>,
}

impl Bots {
    fn emit(&self, event: BotEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn spawn_create(&self, name: String, group_id: String) -> JoinHandle<()> {
        let bots = self.clone();
        tokio::spawn(async move { bots.create(name, group_id).await })
    }

    async fn create(&self, name: String, group_id: String) {
        match self.actuator.create_bot(&name, &group_id).await {
            Ok(bot_id) => {
                self.registry.record(&group_id, &bot_id).await;
                tracing::info!(group_id = %group_id, bot_id = %bot_id, "Bot created");
                self.emit(BotEvent::BotCreated(BotCreated {
                    name,
                    group_id,
                    bot_id,
                }));
            }
            Err(e) => {
                tracing::warn!(group_id = %group_id, error = %e, "Bot creation failed");
            }
        }
    }

    fn spawn_post(&self, bot_id: String, text: String) {
        let actuator = Arc::clone(&self.actuator);
        tokio::spawn(async move {
            if let Err(e) = actuator.post_message(&bot_id, &text).await {
                tracing::debug!(bot_id = %bot_id, error = %e, "Post failed");
            }
        });
    }

    fn apply(&self, connection: &Connection, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(frames) => match encode_batch(&frames) {
                    Ok(payload) => {
                        if let Err(e) = connection.send(payload) {
                            tracing::debug!(error = %e, "Dropping outbound frames");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to encode frames"),
                },
                Action::Emit(event) => self.emit(event),
                Action::CreateBot { name, group_id } => {
                    self.spawn_create(name, group_id);
                }
            }
        }
    }
}

async fn run_session(mut session: Session, mut connection: Connection, bots: Bots) {
    let actions = session.on_connected();
    bots.apply(&connection, actions);

    let reason = loop {
        match connection.recv().await {
            Some(TransportEvent::Frame(payload)) => {
                let actions = session.on_payload(&payload);
                bots.apply(&connection, actions);
            }
            Some(TransportEvent::Closed(reason)) => break reason,
            None => break None,
        }
    };

    session.on_disconnected();
    tracing::info!(reason = ?reason, "Disconnected from push service");
    bots.emit(BotEvent::Disconnected { reason });
}

/// Errors building a [`Bot`]
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bots API client error: {0}")]
    Actuator(#[from] ActuatorError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groupme::ActuatorError;
    use crate::transport::{ConnectionPeer, TransportError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    struct MockTransport {
        peers: mpsc::UnboundedSender<ConnectionPeer>,
        refuse: bool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
            if self.refuse {
                return Err(TransportError::Connect("refused".to_string()));
            }
            let (connection, peer) = Connection::pair();
            self.peers.send(peer).unwrap();
            Ok(connection)
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Create { name: String, group_id: String },
        Post { bot_id: String, text: String },
    }

    struct MockActuator {
        calls: mpsc::UnboundedSender<Call>,
        created: AtomicUsize,
        reject: Option<String>,
    }

    #[async_trait]
    impl Actuator for MockActuator {
        async fn create_bot(&self, name: &str, group_id: &str) -> Result<String, ActuatorError> {
            self.calls
                .send(Call::Create {
                    name: name.to_string(),
                    group_id: group_id.to_string(),
                })
                .unwrap();
            if self.reject.as_deref() == Some(group_id) {
                return Err(ActuatorError::Rejected { code: 400 });
            }
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{}-bot{}", group_id, n))
        }

        async fn post_message(&self, bot_id: &str, text: &str) -> Result<(), ActuatorError> {
            self.calls
                .send(Call::Post {
                    bot_id: bot_id.to_string(),
                    text: text.to_string(),
                })
                .unwrap();
            Ok(())
        }
    }

    struct Harness {
        bot: Bot,
        peers: mpsc::UnboundedReceiver<ConnectionPeer>,
        calls: mpsc::UnboundedReceiver<Call>,
    }

    fn harness_with(groups: &[&str], refuse: bool, reject: Option<&str>) -> Harness {
        let (peer_tx, peers) = mpsc::unbounded_channel();
        let (call_tx, calls) = mpsc::unbounded_channel();

        let mut config = BotConfig::new("u1", "tok").bot_name("Bot");
        for group in groups {
            config = config.group(*group);
        }

        let bot = Bot::new(
            config,
            "ws://push.test/faye",
            Arc::new(MockTransport {
                peers: peer_tx,
                refuse,
            }),
            Arc::new(MockActuator {
                calls: call_tx,
                created: AtomicUsize::new(0),
                reject: reject.map(String::from),
            }),
        );

        Harness { bot, peers, calls }
    }

    fn harness() -> Harness {
        harness_with(&["g1", "g2"], false, None)
    }

    async fn next_batch(peer: &mut ConnectionPeer) -> Vec<Value> {
        let payload = timeout(WAIT, peer.outbound.recv()).await.unwrap().unwrap();
        match serde_json::from_str(&payload).unwrap() {
            Value::Array(frames) => frames,
            other => panic!("Expected a JSON array, got {}", other),
        }
    }

    fn push(peer: &ConnectionPeer, payload: &str) {
        peer.events
            .send(TransportEvent::Frame(payload.to_string()))
            .unwrap();
    }

    async fn next_event(events: &mut broadcast::Receiver<BotEvent>) -> BotEvent {
        timeout(WAIT, events.recv()).await.unwrap().unwrap()
    }

    async fn next_call(calls: &mut mpsc::UnboundedReceiver<Call>) -> Call {
        timeout(WAIT, calls.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_full_session() {
        let mut h = harness();
        let mut events = h.bot.subscribe();

        h.bot.connect().await;
        let mut peer = timeout(WAIT, h.peers.recv()).await.unwrap().unwrap();

        let handshake = next_batch(&mut peer).await;
        assert_eq!(handshake.len(), 1);
        assert_eq!(handshake[0]["channel"], "/meta/handshake");
        assert_eq!(handshake[0]["id"], 1);

        push(&peer, r#"[{"channel":"/meta/handshake","clientId":"cid1","successful":true}]"#);
        let connect = next_batch(&mut peer).await;
        let subscribe = next_batch(&mut peer).await;
        assert_eq!(connect[0]["channel"], "/meta/connect");
        assert_eq!(connect[0]["clientId"], "cid1");
        assert_eq!(connect[0]["id"], 2);
        assert_eq!(subscribe[0]["channel"], "/meta/subscribe");
        assert_eq!(subscribe[0]["clientId"], "cid1");
        assert_eq!(subscribe[0]["id"], 3);

        push(&peer, r#"[{"channel":"/meta/connect","successful":true}]"#);
        let user = next_batch(&mut peer).await;
        assert_eq!(user.len(), 1);
        assert_eq!(user[0]["channel"], "/user/u1");
        assert_eq!(user[0]["data"]["type"], "subscribe");

        push(&peer, r#"[{"channel":"/user/u1","successful":true}]"#);
        assert_eq!(next_event(&mut events).await, BotEvent::Connected);

        let groups = next_batch(&mut peer).await;
        let channels: Vec<_> = groups.iter().map(|f| f["channel"].clone()).collect();
        assert_eq!(channels, vec!["/group/g1", "/group/g2"]);
        assert_eq!(groups[1]["id"], 6);

        let mut created = Vec::new();
        for _ in 0..2 {
            match next_event(&mut events).await {
                BotEvent::BotCreated(info) => created.push(info),
                other => panic!("Expected BotCreated, got {:?}", other),
            }
        }
        created.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        assert_eq!(created[0].group_id, "g1");
        assert_eq!(created[0].name, "Bot");
        assert_eq!(created[1].group_id, "g2");
        assert!(h.bot.registry().get("g1").await.is_some());
        assert!(h.bot.registry().get("g2").await.is_some());

        let mut creates = vec![next_call(&mut h.calls).await, next_call(&mut h.calls).await];
        creates.sort_by_key(|c| format!("{:?}", c));
        assert_eq!(
            creates,
            vec![
                Call::Create {
                    name: "Bot".to_string(),
                    group_id: "g1".to_string()
                },
                Call::Create {
                    name: "Bot".to_string(),
                    group_id: "g2".to_string()
                },
            ]
        );

        push(
            &peer,
            r#"[{"channel":"/group/g1","data":{"type":"line.create","subject":{"text":"hello world","group_id":"g1"}}}]"#,
        );
        match next_event(&mut events).await {
            BotEvent::Message(subject) => {
                assert_eq!(subject.text(), "hello world");
                assert_eq!(subject.group_id(), Some("g1"));
            }
            other => panic!("Expected Message, got {:?}", other),
        }

        peer.events
            .send(TransportEvent::Closed(Some("bye".to_string())))
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            BotEvent::Disconnected {
                reason: Some("bye".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_connect_failed() {
        let h = harness_with(&["g1"], true, None);
        let mut events = h.bot.subscribe();

        h.bot.connect().await;
        assert!(matches!(
            next_event(&mut events).await,
            BotEvent::ConnectFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_reconnect_starts_new_session() {
        let mut h = harness();

        h.bot.connect().await;
        let mut first = timeout(WAIT, h.peers.recv()).await.unwrap().unwrap();
        next_batch(&mut first).await;
        push(&first, r#"[{"channel":"/meta/handshake","clientId":"cid1"}]"#);
        next_batch(&mut first).await;

        h.bot.connect().await;
        let mut second = timeout(WAIT, h.peers.recv()).await.unwrap().unwrap();
        let handshake = next_batch(&mut second).await;
        assert_eq!(handshake[0]["channel"], "/meta/handshake");
        assert_eq!(handshake[0]["id"], 1);
    }

    #[tokio::test]
    async fn test_disconnect_publishes_event() {
        let mut h = harness();
        let mut events = h.bot.subscribe();

        h.bot.connect().await;
        let mut peer = timeout(WAIT, h.peers.recv()).await.unwrap().unwrap();
        next_batch(&mut peer).await;

        h.bot.disconnect().await;
        assert_eq!(
            next_event(&mut events).await,
            BotEvent::Disconnected {
                reason: Some(CLOSED_BY_CLIENT.to_string())
            }
        );

        h.bot.disconnect().await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_reconnect_reports_replaced_session() {
        let mut h = harness();
        let mut events = h.bot.subscribe();

        h.bot.connect().await;
        let mut first = timeout(WAIT, h.peers.recv()).await.unwrap().unwrap();
        next_batch(&mut first).await;

        h.bot.connect().await;
        assert_eq!(
            next_event(&mut events).await,
            BotEvent::Disconnected {
                reason: Some(CLOSED_BY_CLIENT.to_string())
            }
        );
        let mut second = timeout(WAIT, h.peers.recv()).await.unwrap().unwrap();
        assert_eq!(next_batch(&mut second).await[0]["id"], 1);
    }

    #[tokio::test]
    async fn test_transport_gone_disconnects_without_reason() {
        let mut h = harness();
        let mut events = h.bot.subscribe();

        h.bot.connect().await;
        let mut peer = timeout(WAIT, h.peers.recv()).await.unwrap().unwrap();
        next_batch(&mut peer).await;

        drop(peer);
        assert_eq!(
            next_event(&mut events).await,
            BotEvent::Disconnected { reason: None }
        );

        // Already ended, so stopping it publishes nothing more
        h.bot.disconnect().await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_create_bot_twice_last_write_wins() {
        let mut h = harness();
        let mut events = h.bot.subscribe();

        h.bot.create_bot("Bot", "g1").await.unwrap();
        h.bot.create_bot("Bot", "g1").await.unwrap();

        let first = next_event(&mut events).await;
        let second = next_event(&mut events).await;
        assert!(matches!(first, BotEvent::BotCreated(ref c) if c.bot_id == "g1-bot1"));
        assert!(matches!(second, BotEvent::BotCreated(ref c) if c.bot_id == "g1-bot2"));
        assert_eq!(h.bot.registry().get("g1").await.as_deref(), Some("g1-bot2"));
        assert_eq!(h.bot.registry().len().await, 1);

        next_call(&mut h.calls).await;
        next_call(&mut h.calls).await;
    }

    #[tokio::test]
    async fn test_create_bot_failure_is_silent() {
        let h = harness_with(&["g1"], false, Some("g1"));
        let mut events = h.bot.subscribe();

        h.bot.create_bot("Bot", "g1").await.unwrap();

        assert!(h.bot.registry().is_empty().await);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_broadcast_posts_only_to_registered_groups() {
        let mut h = harness_with(&["A", "B", "C"], false, None);
        h.bot.registry().record("A", "a1").await;
        h.bot.registry().record("B", "b2").await;

        assert_eq!(h.bot.post_message("hi all", None).await, 2);

        let mut bots = Vec::new();
        for _ in 0..2 {
            match next_call(&mut h.calls).await {
                Call::Post { bot_id, text } => {
                    assert_eq!(text, "hi all");
                    bots.push(bot_id);
                }
                other => panic!("Expected Post, got {:?}", other),
            }
        }
        bots.sort();
        assert_eq!(bots, vec!["a1", "b2"]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_post_to_group() {
        let mut h = harness();
        h.bot.registry().record("g1", "b1").await;

        assert_eq!(h.bot.post_message("hello", Some("g1")).await, 1);
        assert_eq!(
            next_call(&mut h.calls).await,
            Call::Post {
                bot_id: "b1".to_string(),
                text: "hello".to_string()
            }
        );

        assert_eq!(h.bot.post_message("hello", Some("g2")).await, 0);
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let result = Bot::from_config(&Config::default());
        assert!(matches!(result, Err(BotError::Config(ConfigError::Missing(_)))));
    }

    #[test]
    fn test_from_config_with_huge_timeout() {
        let mut config = Config::default();
        config.bot = BotConfig::new("u1", "tok");
        config.endpoints.request_timeout_secs = u64::MAX / 100;
        assert!(Bot::from_config(&config).is_ok());
    }
}

//! WebSocket listener transport.
//!
//! Each connection becomes one broker listener. The client subscribes to
//! task ids with `{"type":"subscribe","taskId":...}` and receives the
//! progress, complete and error events of those tasks. A transport-level
//! ping goes out every heartbeat interval; a listener that misses one full
//! interval is disconnected.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use stickerkit_core::notifier::generate_client_id;
use stickerkit_core::{ClientMessage, Heartbeat, HeartbeatAction, ListenerId, ServerMessage};

use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT, WS_STALE_TERMINATED,
};
use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    serve_listener(sender, receiver, &state).await;
}

/// Drives one listener until the client leaves, stops answering pings, or
/// the broker closes its channel. The listener is removed from the broker
/// on every exit path.
async fn serve_listener<S, R, E>(mut sender: S, mut receiver: R, state: &AppState)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let notifier = &state.config().notifier;
    let broker = state.broker();

    let (listener, mut outbound) = broker.connect(notifier.listener_buffer);
    let client_id = generate_client_id();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(%listener, client_id = %client_id, "WebSocket client connected");

    if send_message(&mut sender, &ServerMessage::connected(client_id.clone()))
        .await
        .is_ok()
    {
        let period = Duration::from_secs(notifier.heartbeat_secs);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = Heartbeat::new();

        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(message) = message else {
                        debug!(%listener, "Broker closed listener channel");
                        break;
                    };
                    if send_message(&mut sender, &message).await.is_err() {
                        debug!(%listener, "WebSocket send failed, client disconnected");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match heartbeat.on_tick() {
                        HeartbeatAction::Ping => {
                            if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                                break;
                            }
                        }
                        HeartbeatAction::Terminate => {
                            warn!(%listener, client_id = %client_id, "Terminating unresponsive WebSocket client");
                            WS_STALE_TERMINATED.inc();
                            break;
                        }
                    }
                }
                incoming = receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = handle_client_message(
                                state,
                                listener,
                                &mut heartbeat,
                                text.as_str(),
                            ) {
                                if send_message(&mut sender, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Pong(_))) => heartbeat.on_pong(),
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(%listener, "WebSocket client requested close");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Transport pings are answered by axum; binary frames are ignored
                        }
                        Some(Err(e)) => {
                            warn!(%listener, "WebSocket receive error: {}", e);
                            break;
                        }
                    }
                }
            }
        }
    }

    // Clean up
    let _ = sender.close().await;
    broker.remove_listener(listener);
    WS_CONNECTIONS_ACTIVE.dec();
    info!(%listener, client_id = %client_id, "WebSocket client disconnected");
}

/// Apply a client control message, returning the reply to send, if any.
fn handle_client_message(
    state: &AppState,
    listener: ListenerId,
    heartbeat: &mut Heartbeat,
    text: &str,
) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { task_id }) => {
            debug!(%listener, task_id = %task_id, "Listener subscribed");
            state.broker().subscribe(task_id, listener);
            None
        }
        Ok(ClientMessage::Unsubscribe { task_id }) => {
            debug!(%listener, task_id = %task_id, "Listener unsubscribed");
            state.broker().unsubscribe(task_id, listener);
            None
        }
        Ok(ClientMessage::Ping) => {
            heartbeat.on_pong();
            Some(ServerMessage::pong())
        }
        Err(e) => {
            debug!(%listener, "Ignoring unrecognized client message: {}", e);
            None
        }
    }
}

async fn send_message<S>(sender: &mut S, message: &ServerMessage) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize ServerMessage: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await?;
    WS_MESSAGES_SENT
        .with_label_values(&[message.type_name()])
        .inc();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use stickerkit_core::testing::{MockImageEncoder, MockTranscoder};
    use tokio::task::JoinHandle;
    use stickerkit_core::{
        create_broker, create_reaper, Config, ProcessorConfig, StickerProcessor,
    };

    fn test_state() -> Arc<AppState> {
        let config = Config::default();
        let (broker, broker_actor) = create_broker();
        tokio::spawn(broker_actor.run());
        let (reaper, reaper_task) = create_reaper(Duration::from_millis(10));
        tokio::spawn(reaper_task.run());
        let processor = Arc::new(StickerProcessor::new(
            ProcessorConfig::from_config(&config),
            Arc::new(MockTranscoder::new()),
            Arc::new(MockImageEncoder::new()),
            broker.clone(),
            reaper.clone(),
        ));
        Arc::new(AppState::new(config, processor, broker, reaper))
    }

    #[tokio::test]
    async fn test_subscribe_routes_task_events() {
        let state = test_state();
        let (listener, mut rx) = state.broker().connect(8);
        let mut heartbeat = Heartbeat::new();

        let reply = handle_client_message(
            &state,
            listener,
            &mut heartbeat,
            r#"{"type":"subscribe","taskId":"t-1"}"#,
        );
        assert!(reply.is_none());
        assert_eq!(state.broker().subscriber_count("t-1").await, 1);

        state.broker().broadcast(
            "t-1",
            ServerMessage::Error {
                task_id: "t-1".into(),
                message: "boom".into(),
                timestamp: 1,
            },
        );
        let message = rx.recv().await.unwrap();
        assert_eq!(message.task_id(), Some("t-1"));

        handle_client_message(
            &state,
            listener,
            &mut heartbeat,
            r#"{"type":"unsubscribe","taskId":"t-1"}"#,
        );
        assert_eq!(state.broker().subscriber_count("t-1").await, 0);
    }

    #[tokio::test]
    async fn test_ping_answers_pong_and_keeps_alive() {
        let state = test_state();
        let (listener, _rx) = state.broker().connect(8);
        let mut heartbeat = Heartbeat::new();
        assert_eq!(heartbeat.on_tick(), HeartbeatAction::Ping);

        let reply = handle_client_message(&state, listener, &mut heartbeat, r#"{"type":"ping"}"#);

        assert!(matches!(reply, Some(ServerMessage::Pong { .. })));
        assert!(heartbeat.is_alive());
    }

    #[tokio::test]
    async fn test_unknown_message_is_ignored() {
        let state = test_state();
        let (listener, _rx) = state.broker().connect(8);
        let mut heartbeat = Heartbeat::new();

        for text in [r#"{"type":"dance"}"#, "not json", r#"{"type":"subscribe"}"#] {
            assert!(handle_client_message(&state, listener, &mut heartbeat, text).is_none());
        }
        assert_eq!(state.broker().stats().await.subscriptions, 0);
    }

    /// In-memory client end of a listener connection.
    struct Client {
        to_server: mpsc::UnboundedSender<Result<Message, axum::Error>>,
        from_server: mpsc::UnboundedReceiver<Message>,
    }

    impl Client {
        async fn next_text(&mut self) -> String {
            match self.from_server.next().await {
                Some(Message::Text(text)) => text.as_str().to_string(),
                other => panic!("expected a text frame, got {:?}", other),
            }
        }

        async fn expect_ping(&mut self) {
            let frame = self.from_server.next().await;
            assert!(matches!(frame, Some(Message::Ping(_))), "got {:?}", frame);
        }
    }

    fn connect(state: &Arc<AppState>) -> (Client, JoinHandle<()>) {
        let (to_server, inbound) = mpsc::unbounded();
        let (outbound, from_server) = mpsc::unbounded();
        let state = Arc::clone(state);
        let handle = tokio::spawn(async move { serve_listener(outbound, inbound, &state).await });
        (
            Client {
                to_server,
                from_server,
            },
            handle,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_client_is_disconnected() {
        let state = test_state();
        let (mut client, handle) = connect(&state);

        assert!(client.next_text().await.contains(r#""type":"connected""#));
        assert_eq!(state.broker().stats().await.listeners, 1);

        // The client never answers.
        client.expect_ping().await;
        tokio::time::timeout(Duration::from_secs(120), handle)
            .await
            .expect("stale listener was kept open")
            .unwrap();

        assert_eq!(state.broker().stats().await.listeners, 0);
        assert!(client.from_server.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_answering_pings_stays_connected() {
        let state = test_state();
        let (mut client, handle) = connect(&state);
        client.next_text().await;

        for _ in 0..3 {
            client.expect_ping().await;
            client
                .to_server
                .unbounded_send(Ok(Message::Pong(Bytes::new())))
                .unwrap();
        }
        assert!(!handle.is_finished());
        assert_eq!(state.broker().stats().await.listeners, 1);

        drop(client.to_server);
        handle.await.unwrap();
        assert_eq!(state.broker().stats().await.listeners, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribed_client_receives_task_events() {
        let state = test_state();
        let (mut client, handle) = connect(&state);
        client.next_text().await;

        client
            .to_server
            .unbounded_send(Ok(Message::Text(
                r#"{"type":"subscribe","taskId":"t-9"}"#.into(),
            )))
            .unwrap();
        while state.broker().subscriber_count("t-9").await == 0 {
            tokio::task::yield_now().await;
        }

        state.broker().broadcast(
            "t-9",
            ServerMessage::Error {
                task_id: "t-9".into(),
                message: "boom".into(),
                timestamp: 1,
            },
        );
        let event: serde_json::Value = serde_json::from_str(&client.next_text().await).unwrap();
        assert_eq!(event["type"], "error");
        assert_eq!(event["taskId"], "t-9");

        client
            .to_server
            .unbounded_send(Ok(Message::Close(None)))
            .unwrap();
        handle.await.unwrap();
        assert_eq!(state.broker().stats().await.subscriptions, 0);
    }
}

use axum::extract::ws::{Message as Frame, WebSocket};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::{
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use crate::{auth::User, config::SocketConfig};

use super::{
    hub::{ClientId, Hub, Outbound},
    message::{Content, Inbound, Message, MessageKind, PrivateContent},
};

/// Turns one inbound frame into hub traffic on behalf of `user`.
pub fn dispatch(hub: &Hub, user: &User, frame: &[u8]) {
    match Inbound::parse(frame) {
        Err(err) => warn!(event = "frame_dropped", user_id = %user.id, error = %err),
        Ok(Inbound::Broadcast { kind, content }) => {
            hub.broadcast_message(&Message::new(kind, user.clone(), Content::Opaque(content)));
        }
        Ok(Inbound::Private(request)) => {
            let message = Message::new(
                MessageKind::PrivateMessage,
                user.clone(),
                Content::Private(PrivateContent {
                    message: request.message,
                    from: user.username.clone(),
                }),
            );
            hub.send_to_user(&request.target, message.clone());
            hub.send_to_user(&user.id, message);
        }
    }
}

/// Unregisters exactly once, however the read pump ends.
struct Registration<'a> {
    hub: &'a Hub,
    id: ClientId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

/// Runs an authenticated connection until either side gives up.
pub async fn serve(socket: WebSocket, hub: Hub, user: User, config: SocketConfig) {
    let (client, outbound) = hub.new_client(user.clone());
    let id = client.id;
    let (sink, stream) = socket.split();

    let mut writer = tokio::spawn(write_pump(sink, outbound, config, id));
    hub.register(client);
    let registration = Registration { hub: &hub, id };

    read_pump(stream, &hub, &user, config, &mut writer).await;
    drop(registration);

    if writer.is_finished() {
        return;
    }
    // the hub closes our queue, letting the writer send its close frame
    if time::timeout(config.write_wait, &mut writer).await.is_err() {
        writer.abort();
    }
    debug!(event = "connection_closed", client_id = %id, user_id = %user.id);
}

async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    hub: &Hub,
    user: &User,
    config: SocketConfig,
    writer: &mut JoinHandle<()>,
) {
    let mut deadline = Instant::now() + config.pong_wait;
    loop {
        let frame = tokio::select! {
            read = time::timeout_at(deadline, stream.next()) => read,
            _ = &mut *writer => {
                debug!(event = "writer_finished", user_id = %user.id);
                return;
            }
        };

        match frame {
            Err(_) => {
                info!(event = "read_timeout", user_id = %user.id);
                return;
            }
            Ok(None) | Ok(Some(Ok(Frame::Close(_)))) => return,
            Ok(Some(Err(err))) => {
                debug!(event = "read_failed", user_id = %user.id, error = %err);
                return;
            }
            Ok(Some(Ok(Frame::Pong(_)))) => deadline = Instant::now() + config.pong_wait,
            Ok(Some(Ok(Frame::Text(text)))) => dispatch(hub, user, text.as_str().as_bytes()),
            Ok(Some(Ok(Frame::Binary(bytes)))) => dispatch(hub, user, &bytes),
            Ok(Some(Ok(Frame::Ping(_)))) => {}
        }
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, Frame>,
    mut outbound: Outbound,
    config: SocketConfig,
    id: ClientId,
) {
    let mut ping = time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some(first) = queued else {
                    let _ = time::timeout(config.write_wait, sink.send(Frame::Close(None))).await;
                    return;
                };
                if let Err(reason) = write_batch(&mut sink, &mut outbound, first, config).await {
                    debug!(event = "write_failed", client_id = %id, reason);
                    return;
                }
            }
            _ = ping.tick() => {
                let sent = time::timeout(config.write_wait, sink.send(Frame::Ping(Default::default()))).await;
                if !matches!(sent, Ok(Ok(()))) {
                    debug!(event = "ping_failed", client_id = %id);
                    return;
                }
            }
        }
    }
}

/// Feeds everything already queued behind `first`, then flushes once.
async fn write_batch(
    sink: &mut SplitSink<WebSocket, Frame>,
    outbound: &mut Outbound,
    first: String,
    config: SocketConfig,
) -> Result<(), &'static str> {
    let write = async {
        sink.feed(Frame::Text(first.into())).await?;
        for _ in 0..outbound.len() {
            match outbound.try_recv() {
                Ok(frame) => sink.feed(Frame::Text(frame.into())).await?,
                Err(_) => break,
            }
        }
        sink.flush().await
    };

    match time::timeout(config.write_wait, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err("transport"),
        Err(_) => Err("deadline"),
    }
}

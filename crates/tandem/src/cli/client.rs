//! Headless replica client.
//!
//! Runs a [`ReplicaSession`] over a WebSocket connection to a relay. `watch`
//! mirrors the document to stdout as it evolves; `append` issues a single
//! edit and waits for its acknowledgment.

use futures_util::{SinkExt, StreamExt};
use futures_util::stream::{SplitSink, SplitStream};
use tandem_core::error::{Result, TandemError};
use tandem_core::ot::{Operation, ReplicaSession, SessionAction, SessionEvent, SessionState};
use tandem_core::protocol::{ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

fn lost(e: impl std::fmt::Display) -> TandemError {
    TandemError::ConnectionLost(e.to_string())
}

/// Build the sync endpoint URL for a document.
fn sync_url(server: &str, doc: &str) -> Result<Url> {
    let mut url = Url::parse(server).map_err(lost)?;
    url.set_path("/sync");
    url.query_pairs_mut().clear().append_pair("doc", doc);
    Ok(url)
}

async fn connect(server: &str, doc: &str) -> Result<(WsSink, WsSource)> {
    let url = sync_url(server, doc)?;
    log::info!("connecting to {url}");
    let (ws, _) = connect_async(url.as_str()).await.map_err(lost)?;
    Ok(ws.split())
}

/// Read frames until the next decodable server message.
async fn next_message(source: &mut WsSource) -> Result<Option<ServerMessage>> {
    while let Some(frame) = source.next().await {
        let frame = frame.map_err(lost)?;
        if let Message::Text(text) = frame {
            return Ok(Some(ServerMessage::from_json(text.as_str())?));
        }
    }
    Ok(None)
}

async fn send_message(sink: &mut WsSink, msg: &ClientMessage) -> Result<()> {
    sink.send(Message::Text(msg.to_json()?.into()))
        .await
        .map_err(lost)
}

/// Run the session actions for one inbound message; returns true if the
/// document changed.
async fn run_actions(
    session: &mut ReplicaSession,
    sink: &mut WsSink,
    msg: ServerMessage,
) -> Result<bool> {
    let mut changed = false;
    for action in session.handle(SessionEvent::Remote(msg))? {
        match action {
            SessionAction::Apply(_) | SessionAction::ReplaceDocument(_) => changed = true,
            SessionAction::Send(m) => send_message(sink, &m).await?,
        }
    }
    Ok(changed)
}

/// Connect and print the document every time it changes.
pub async fn watch(server: &str, doc: &str) -> Result<()> {
    let (mut sink, mut source) = connect(server, doc).await?;
    let mut session = ReplicaSession::new();

    while let Some(msg) = next_message(&mut source).await? {
        if run_actions(&mut session, &mut sink, msg).await? {
            println!("--- {} @ revision {} ---", doc, session.revision());
            println!("{}", session.document().to_text());
        }
    }

    log::info!("server closed the connection");
    Ok(())
}

/// Connect, append `text` as a new last line, and wait for the ack.
pub async fn append(server: &str, doc: &str, text: &str) -> Result<()> {
    let (mut sink, mut source) = connect(server, doc).await?;
    let mut session = ReplicaSession::new();

    // Wait for the snapshot before editing.
    loop {
        let msg = next_message(&mut source)
            .await?
            .ok_or_else(|| lost("connection closed before snapshot"))?;
        let is_init = matches!(msg, ServerMessage::Init { .. });
        run_actions(&mut session, &mut sink, msg).await?;
        if is_init {
            break;
        }
    }

    // An empty document gets the text as its first line; otherwise the text
    // starts a new line after the current end.
    let end = session.document().end_position();
    let lines = if session.document().to_text().is_empty() {
        vec![text.to_string()]
    } else {
        vec![String::new(), text.to_string()]
    };
    let op = Operation::Insert { start: end, lines };

    for action in session.handle(SessionEvent::LocalEdit(op))? {
        if let SessionAction::Send(m) = action {
            send_message(&mut sink, &m).await?;
        }
    }

    // Concurrent changes from other replicas may arrive before the ack; the
    // session transforms and absorbs them on the way.
    while session.state() == SessionState::Pending {
        let msg = next_message(&mut source)
            .await?
            .ok_or_else(|| lost("connection closed before ack"))?;
        run_actions(&mut session, &mut sink, msg).await?;
    }

    println!("appended to {} at revision {}", doc, session.revision());
    Ok(())
}

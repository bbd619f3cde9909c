//! Audio protocol listener
//!
//! One TCP listener per configured binding; each binding carries the dialed
//! extension it serves. A connection must present its handshake within the
//! configured window, pass admission, and resolve to a tenant before any
//! session state exists. After that the connection splits into a reader
//! pump (frames → controller events) and a writer pump (outbound queue →
//! socket), with the turn controller running in its own task.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uuid::Uuid;

use call_agent_agent::{CallEvent, TurnController};
use call_agent_config::ListenerBinding;
use call_agent_core::{AudioFrame, CallSession};
use call_agent_protocol::{Frame, FrameDecoder, OutboundQueue, ProtocolError};

use crate::metrics as srv_metrics;
use crate::session::SessionHandle;
use crate::state::AppState;
use crate::ServerError;

/// Accept loop for one binding. Runs until the listener socket fails.
pub async fn run_listener(binding: ListenerBinding, state: AppState) -> Result<(), ServerError> {
    let listener = TcpListener::bind(&binding.addr).await?;
    tracing::info!(addr = %binding.addr, extension = %binding.extension, "audio listener up");
    serve_on(listener, binding.extension, state).await
}

/// Accept loop over a pre-bound listener.
pub async fn serve_on(
    listener: TcpListener,
    extension: String,
    state: AppState,
) -> Result<(), ServerError> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let state = state.clone();
        let extension = extension.clone();
        tokio::spawn(async move {
            match handle_connection(socket, peer.to_string(), extension, state).await {
                Ok(()) => {}
                Err(ServerError::AdmissionRejected) => {}
                Err(e) => {
                    tracing::debug!(peer = %peer, error = %e, "connection ended");
                }
            }
        });
    }
}

/// Read until the decoder yields the handshake. Any other known frame first
/// is a protocol violation; unknown frames are skipped by the decoder.
async fn read_handshake(
    reader: &mut OwnedReadHalf,
    decoder: &mut FrameDecoder,
) -> Result<Uuid, ProtocolError> {
    let mut buf = [0u8; 256];
    loop {
        if let Some(frame) = decoder.next_frame()? {
            return match frame {
                Frame::Handshake { session_id } => Ok(session_id),
                other => Err(ProtocolError::UnexpectedFrame(other.frame_type().as_u8())),
            };
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(ProtocolError::Malformed("connection closed in handshake".into()));
        }
        decoder.feed(&buf[..n]);
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer: String,
    extension: String,
    state: AppState,
) -> Result<(), ServerError> {
    let _ = socket.set_nodelay(true);
    let (mut reader, mut writer) = socket.into_split();
    let mut decoder = FrameDecoder::new();

    // Handshake within the configured window, or the connection is dropped
    // unestablished.
    let handshake_window =
        Duration::from_millis(state.settings.server.handshake_timeout_ms);
    let session_id =
        match tokio::time::timeout(handshake_window, read_handshake(&mut reader, &mut decoder))
            .await
        {
            Ok(Ok(session_id)) => session_id,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ProtocolError::HandshakeTimeout.into()),
        };

    // Admission before any session object exists; a rejection closes the
    // connection and leaves the counter untouched.
    let permit = state.sessions.try_admit()?;

    // No tenant, no call.
    let Some(tenant) = state.directory.lookup(&extension) else {
        tracing::warn!(extension = %extension, %session_id, "no tenant for extension, dropping call");
        let _ = writer.write_all(&Frame::Hangup.encode()).await;
        return Ok(());
    };

    tracing::info!(
        %session_id,
        tenant = %tenant.slug,
        peer = %peer,
        "call admitted"
    );
    srv_metrics::record_session_started();

    let session = CallSession::new(session_id, tenant.slug.clone(), peer);
    let outbound = OutboundQueue::new(state.settings.turn.outbound_queue_frames);
    let (events_tx, events_rx) = mpsc::channel::<CallEvent>(256);
    let last_activity = Arc::new(Mutex::new(Instant::now()));

    state.sessions.insert(
        session_id,
        SessionHandle {
            tenant: tenant.slug.clone(),
            events: events_tx.clone(),
            last_activity: Arc::clone(&last_activity),
        },
    );

    let controller = TurnController::new(
        session,
        tenant,
        state.settings.turn.clone(),
        Duration::from_secs(state.settings.persistence.session_ttl_secs),
        state.deps.clone(),
        Arc::clone(&outbound),
    );
    let call = tokio::spawn(controller.run(events_rx));

    // Writer pump: outbound queue → socket. Ends when the controller closes
    // the queue or the socket dies.
    let writer_queue = Arc::clone(&outbound);
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = writer_queue.pop().await {
            if writer.write_all(&frame.encode()).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    // Reader pump: socket → controller events.
    let mut buf = [0u8; 4096];
    let mut sequence: u64 = 0;
    'pump: loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break 'pump,
            Ok(n) => n,
        };
        decoder.feed(&buf[..n]);
        loop {
            match decoder.next_frame() {
                Ok(Some(Frame::Audio { payload })) => {
                    sequence += 1;
                    *last_activity.lock() = Instant::now();
                    if events_tx
                        .send(CallEvent::Audio(AudioFrame::from_pcm16(&payload, sequence)))
                        .await
                        .is_err()
                    {
                        break 'pump;
                    }
                }
                Ok(Some(Frame::Hangup)) => {
                    let _ = events_tx.send(CallEvent::Hangup).await;
                    break 'pump;
                }
                Ok(Some(Frame::Handshake { .. })) => {
                    tracing::debug!(%session_id, "duplicate handshake ignored");
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(%session_id, error = %e, "malformed frame, closing call");
                    let _ = events_tx.send(CallEvent::Hangup).await;
                    break 'pump;
                }
            }
        }
    }
    drop(events_tx);

    // The controller owns teardown; it closes the queue, which ends the
    // writer pump.
    if let Ok(outcome) = call.await {
        srv_metrics::record_session_closed(outcome);
    }
    let _ = writer_task.await;

    srv_metrics::record_dropped_frames(outbound.dropped());
    state.sessions.remove(session_id);
    permit.release();
    Ok(())
}

//! Per-connection state machine: read/dispatch loop, write pump, and the
//! handle peers use to push frames into this connection's outbound queue.
//!
//! A connection starts unauthenticated. A successful LOGIN_REQ sets its
//! identity exactly once and registers it in the online registry before the
//! reply is enqueued; teardown removes the entry again. Framing violations
//! close the connection, anything else is answered or discarded in place.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fsx_protocol::messages::{
    FileAcceptReq, FileAcceptResp, FileChunk, FileDone, FileOfferReq, FileOfferResp, FileResult,
    LoginReq, LoginResp, OnlineListResp, RegisterReq, RegisterResp,
};
use fsx_protocol::{encode_frame, read_frame, Frame, MsgType};
use fsx_staging::sanitize_filename;

use crate::broker::{clamp_chunk_size, TransferState};
use crate::registry::OnlineEntry;
use crate::server::ServerState;
use crate::SEND_BUFFER_SIZE;

/// Handle for pushing frames into a connection's outbound queue.
///
/// Cloneable and cheap; wraps the connection's `mpsc` sender. Pushes enqueue
/// and return immediately, they never wait for the peer's flush.
#[derive(Clone)]
pub struct ConnectionSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ConnectionSender {
    pub(crate) fn new(tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self { tx }
    }

    /// Frames and enqueues a message.
    ///
    /// Returns `Err` if the queue is full or the connection is gone; the
    /// frame is dropped either way.
    pub fn send(&self, ty: MsgType, payload: &[u8]) -> Result<(), SendError> {
        self.tx.try_send(encode_frame(ty, payload)).map_err(|_| {
            tracing::warn!(msg = ?ty, "outbound queue full or closed, dropping frame");
            SendError
        })
    }

    /// `true` while the connection's write pump is still draining the queue.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Whether two handles point at the same connection.
    pub fn same_channel(&self, other: &ConnectionSender) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Error returned when a frame could not be enqueued.
#[derive(Debug, thiserror::Error)]
#[error("send failed: queue full or connection closed")]
pub struct SendError;

/// Identity attached to a connection by a successful login.
#[derive(Debug, Clone)]
struct Identity {
    token: String,
    user_id: i64,
    username: String,
}

fn token_short(token: &str) -> String {
    format!("{}...", &token[..token.len().min(8)])
}

/// Drives one accepted socket until the peer disconnects, a framing error
/// occurs, or the server shuts down.
pub async fn run_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
    server_cancel: CancellationToken,
) {
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();

    tokio::spawn(write_pump(writer, rx, cancel.clone()));

    let mut conn = Connection {
        state,
        sender: ConnectionSender::new(tx),
        remote: peer.to_string(),
        identity: None,
    };
    tracing::info!(remote = %conn.remote, "CONNECTED");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            result = read_frame(&mut reader) => match result {
                Ok(Some(frame)) => conn.dispatch(frame).await,
                Ok(None) => {
                    tracing::info!(remote = %conn.remote, "DISCONNECTED (peer closed)");
                    break;
                }
                Err(e) => {
                    tracing::warn!(remote = %conn.remote, "DISCONNECTED (framing): {e}");
                    break;
                }
            }
        }
    }

    conn.teardown();
    cancel.cancel();
}

/// Drains the outbound queue onto the socket, preserving enqueue order.
async fn write_pump(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = rx.recv() => match frame {
                Some(bytes) => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        tracing::debug!("write pump error: {e}");
                        break;
                    }
                }
                None => break,
            }
        }
    }

    let _ = writer.shutdown().await;
    // stop the read loop too if the write side died first
    cancel.cancel();
}

struct Connection {
    state: Arc<ServerState>,
    sender: ConnectionSender,
    remote: String,
    identity: Option<Identity>,
}

impl Connection {
    fn send(&self, ty: MsgType, payload: &[u8]) {
        let _ = self.sender.send(ty, payload);
    }

    async fn dispatch(&mut self, frame: Frame) {
        let Some(ty) = frame.msg_type() else {
            tracing::warn!(remote = %self.remote, code = frame.type_code, "unknown message type, discarding");
            return;
        };

        let authed = self.identity.is_some();
        match ty {
            MsgType::Ping => self.on_ping(),
            MsgType::Pong => tracing::debug!(remote = %self.remote, "PONG received"),
            // the online list is served whether or not the caller is logged in
            MsgType::OnlineListReq => self.on_online_list(),
            MsgType::Hello if !authed => self.on_hello(&frame.payload),
            MsgType::RegisterReq if !authed => self.on_register(&frame.payload),
            MsgType::LoginReq if !authed => self.on_login(&frame.payload),
            MsgType::FileOfferReq => self.on_file_offer(&frame.payload),
            MsgType::FileAcceptReq => self.on_file_accept(&frame.payload).await,
            MsgType::FileChunk if authed => self.on_file_chunk(&frame.payload).await,
            MsgType::FileDone if authed => self.on_file_done(&frame.payload).await,
            other => tracing::warn!(
                remote = %self.remote,
                msg = ?other,
                authenticated = authed,
                "unexpected message in this state, discarding"
            ),
        }
    }

    fn on_hello(&self, payload: &[u8]) {
        let name = String::from_utf8_lossy(payload);
        tracing::info!(remote = %self.remote, name = %name, "HELLO");
    }

    fn on_ping(&self) {
        tracing::debug!(remote = %self.remote, "PING -> PONG");
        self.send(MsgType::Pong, b"pong");
    }

    fn on_online_list(&self) {
        let usernames = self.state.registry.online_usernames();
        tracing::info!(remote = %self.remote, count = usernames.len(), "ONLINE_LIST_REQ");
        self.send(MsgType::OnlineListResp, &OnlineListResp { usernames }.encode());
    }

    fn on_register(&self, payload: &[u8]) {
        let resp = match RegisterReq::decode(payload) {
            Ok(req) => {
                tracing::info!(remote = %self.remote, username = %req.username, "REGISTER_REQ");
                let resp = self.state.auth.register(&req);
                if resp.ok {
                    tracing::info!(remote = %self.remote, username = %req.username, "AUTH_REGISTER_OK");
                } else {
                    tracing::info!(
                        remote = %self.remote,
                        username = %req.username,
                        reason = %resp.message,
                        "AUTH_REGISTER_FAIL"
                    );
                }
                resp
            }
            Err(e) => {
                tracing::warn!(remote = %self.remote, "REGISTER_REQ parse error: {e}");
                RegisterResp {
                    ok: false,
                    message: format!("error: {e}"),
                }
            }
        };
        self.send(MsgType::RegisterResp, &resp.encode());
    }

    fn on_login(&mut self, payload: &[u8]) {
        let resp = match LoginReq::decode(payload) {
            Ok(req) => {
                tracing::info!(remote = %self.remote, username = %req.username, "LOGIN_REQ");
                let resp = self.state.auth.login(&req);
                if !resp.ok {
                    tracing::info!(
                        remote = %self.remote,
                        username = %req.username,
                        reason = %resp.message,
                        "AUTH_LOGIN_FAIL"
                    );
                }
                resp
            }
            Err(e) => {
                tracing::warn!(remote = %self.remote, "LOGIN_REQ parse error: {e}");
                LoginResp::failure(format!("error: {e}"))
            }
        };

        if resp.ok {
            // identity is set exactly once, and the registry entry must be
            // in place before the reply goes out
            self.identity = Some(Identity {
                token: resp.token.clone(),
                user_id: resp.user_id,
                username: resp.username.clone(),
            });
            self.state.registry.add(
                resp.token.clone(),
                OnlineEntry {
                    sender: self.sender.clone(),
                    user_id: resp.user_id,
                    username: resp.username.clone(),
                },
            );
            tracing::info!(
                remote = %self.remote,
                username = %resp.username,
                user_id = resp.user_id,
                token = %token_short(&resp.token),
                count = self.state.registry.count(),
                "AUTH_LOGIN_OK, ONLINE_ADD"
            );
        }

        self.send(MsgType::LoginResp, &resp.encode());
    }

    fn on_file_offer(&mut self, payload: &[u8]) {
        let Some(ident) = self.identity.clone() else {
            tracing::info!(remote = %self.remote, "FILE_OFFER_REQ rejected: not authenticated");
            self.send(
                MsgType::FileOfferResp,
                &FileOfferResp::failure("Not authenticated").encode(),
            );
            return;
        };

        let req = match FileOfferReq::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(remote = %self.remote, "FILE_OFFER_REQ parse error: {e}");
                self.send(
                    MsgType::FileOfferResp,
                    &FileOfferResp::failure(format!("error: {e}")).encode(),
                );
                return;
            }
        };

        tracing::info!(
            remote = %self.remote,
            sender = %ident.username,
            receiver = %req.receiver_username,
            filename = %req.filename,
            size = req.file_size,
            chunk_size = req.chunk_size,
            "FILE_OFFER_REQ"
        );

        let filename = match sanitize_filename(&req.filename) {
            Ok(name) => name,
            Err(_) => {
                tracing::info!(remote = %self.remote, filename = %req.filename, "FILE_OFFER_REQ FAIL: bad filename");
                self.send(
                    MsgType::FileOfferResp,
                    &FileOfferResp::failure("Invalid filename").encode(),
                );
                return;
            }
        };

        let receiver = match self.state.db.user_by_username(&req.receiver_username) {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::info!(
                    remote = %self.remote,
                    receiver = %req.receiver_username,
                    "FILE_OFFER_REQ FAIL: receiver not found"
                );
                self.send(
                    MsgType::FileOfferResp,
                    &FileOfferResp::failure("Receiver not found").encode(),
                );
                return;
            }
            Err(e) => {
                tracing::error!(remote = %self.remote, "receiver lookup failed: {e}");
                self.send(
                    MsgType::FileOfferResp,
                    &FileOfferResp::failure(format!("error: {e}")).encode(),
                );
                return;
            }
        };

        let chunk_size = clamp_chunk_size(req.chunk_size);
        let transfer_id = self.state.broker.create(
            ident.user_id,
            &ident.username,
            &ident.token,
            receiver.id,
            &receiver.username,
            &filename,
            req.file_size,
            chunk_size,
        );
        self.state.broker.set_staging_paths(
            transfer_id,
            self.state.staging.temp_path(transfer_id, &filename),
            self.state.staging.final_path(transfer_id, &filename),
        );

        tracing::info!(
            transfer_id,
            sender = %ident.username,
            receiver = %receiver.username,
            "FILE_OFFER_OK"
        );
        self.send(
            MsgType::FileOfferResp,
            &FileOfferResp::success(transfer_id).encode(),
        );
    }

    async fn on_file_accept(&mut self, payload: &[u8]) {
        let Some(ident) = self.identity.clone() else {
            tracing::info!(remote = %self.remote, "FILE_ACCEPT_REQ rejected: not authenticated");
            self.send(
                MsgType::FileAcceptResp,
                &FileAcceptResp::failure("Not authenticated").encode(),
            );
            return;
        };

        let req = match FileAcceptReq::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(remote = %self.remote, "FILE_ACCEPT_REQ parse error: {e}");
                self.send(
                    MsgType::FileAcceptResp,
                    &FileAcceptResp::failure(format!("error: {e}")).encode(),
                );
                return;
            }
        };

        let Some(transfer) = self.state.broker.get(req.transfer_id) else {
            tracing::info!(transfer_id = req.transfer_id, "FILE_ACCEPT_REQ FAIL: transfer not found");
            self.send(
                MsgType::FileAcceptResp,
                &FileAcceptResp::failure("Transfer not found").encode(),
            );
            return;
        };

        if transfer.receiver_user_id != ident.user_id {
            tracing::info!(
                transfer_id = req.transfer_id,
                user_id = ident.user_id,
                "FILE_ACCEPT_REQ FAIL: not the receiver"
            );
            self.send(
                MsgType::FileAcceptResp,
                &FileAcceptResp::failure("Not the receiver").encode(),
            );
            return;
        }

        if req.accept {
            let staged = match self
                .state
                .staging
                .open_for_write(transfer.id, &transfer.filename)
                .await
            {
                Ok(staged) => staged,
                Err(e) => {
                    tracing::error!(transfer_id = transfer.id, "failed to open staging file: {e}");
                    self.state.broker.set_state(transfer.id, TransferState::Failed);
                    self.send(
                        MsgType::FileAcceptResp,
                        &FileAcceptResp::failure("Failed to open file").encode(),
                    );
                    return;
                }
            };

            self.state.broker.store_staged(transfer.id, staged);
            self.state.broker.set_state(transfer.id, TransferState::Accepted);
            tracing::info!(
                transfer_id = transfer.id,
                receiver = %ident.username,
                "FILE_ACCEPT_OK"
            );

            // the push is the sender's signal to start streaming
            self.push_to_sender(&transfer.sender_token, transfer.id, FileAcceptResp::success());
        } else {
            self.state.broker.set_state(transfer.id, TransferState::Failed);
            tracing::info!(
                transfer_id = transfer.id,
                receiver = %ident.username,
                "FILE_ACCEPT_REJECT"
            );
            self.push_to_sender(
                &transfer.sender_token,
                transfer.id,
                FileAcceptResp::failure("Receiver rejected"),
            );
        }

        // the receiver's own reply just acknowledges that the answer was
        // recorded, for reject as well as accept
        self.send(MsgType::FileAcceptResp, &FileAcceptResp::success().encode());
    }

    /// Best-effort push into the sender's connection; a vanished sender only
    /// gets logged, the transfer is abandoned by its own flow later.
    fn push_to_sender(&self, sender_token: &str, transfer_id: u64, resp: FileAcceptResp) {
        match self.state.registry.get(sender_token) {
            Some(conn) => {
                if conn.send(MsgType::FileAcceptResp, &resp.encode()).is_err() {
                    tracing::warn!(transfer_id, "sender push dropped: queue closed");
                }
            }
            None => tracing::info!(
                transfer_id,
                token = %token_short(sender_token),
                "sender not online, push skipped"
            ),
        }
    }

    async fn on_file_chunk(&mut self, payload: &[u8]) {
        let Some(ident) = self.identity.clone() else {
            return;
        };

        let chunk = match FileChunk::decode(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(remote = %self.remote, "FILE_CHUNK parse error: {e}");
                return;
            }
        };

        let Some(transfer) = self.state.broker.get(chunk.transfer_id) else {
            tracing::info!(transfer_id = chunk.transfer_id, "FILE_CHUNK dropped: transfer not found");
            return;
        };
        if transfer.sender_user_id != ident.user_id {
            tracing::info!(transfer_id = chunk.transfer_id, "FILE_CHUNK dropped: not the sender");
            return;
        }
        if transfer.state != TransferState::Accepted && transfer.state != TransferState::Receiving {
            tracing::info!(
                transfer_id = chunk.transfer_id,
                state = ?transfer.state,
                "FILE_CHUNK dropped: transfer not accepting chunks"
            );
            return;
        }

        let Some(mut staged) = self.state.broker.take_staged(chunk.transfer_id) else {
            tracing::error!(transfer_id = chunk.transfer_id, "FILE_CHUNK with no open staging file");
            self.state.broker.set_state(chunk.transfer_id, TransferState::Failed);
            return;
        };

        match staged.write_chunk(&chunk.data).await {
            Ok(written) => {
                self.state.broker.store_staged(chunk.transfer_id, staged);
                if self.state.broker.mark_chunk_received(
                    chunk.transfer_id,
                    chunk.chunk_index,
                    written as u64,
                ) {
                    if let Some(t) = self.state.broker.get(chunk.transfer_id) {
                        tracing::debug!(
                            transfer_id = chunk.transfer_id,
                            chunk_index = chunk.chunk_index,
                            bytes = written,
                            received = t.bytes_received,
                            total = t.file_size,
                            "FILE_CHUNK_RX"
                        );
                    }
                } else {
                    tracing::warn!(
                        transfer_id = chunk.transfer_id,
                        chunk_index = chunk.chunk_index,
                        "FILE_CHUNK out of order, failing transfer"
                    );
                    self.state.broker.set_state(chunk.transfer_id, TransferState::Failed);
                }
            }
            Err(e) => {
                tracing::error!(
                    transfer_id = chunk.transfer_id,
                    chunk_index = chunk.chunk_index,
                    "FILE_CHUNK write error: {e}"
                );
                self.state.broker.set_state(chunk.transfer_id, TransferState::Failed);
            }
        }
    }

    async fn on_file_done(&mut self, payload: &[u8]) {
        let Some(ident) = self.identity.clone() else {
            return;
        };

        let done = match FileDone::decode(payload) {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(remote = %self.remote, "FILE_DONE parse error: {e}");
                return;
            }
        };

        let Some(transfer) = self.state.broker.get(done.transfer_id) else {
            tracing::info!(transfer_id = done.transfer_id, "FILE_DONE dropped: transfer not found");
            return;
        };
        if transfer.sender_user_id != ident.user_id {
            tracing::info!(transfer_id = done.transfer_id, "FILE_DONE dropped: not the sender");
            return;
        }

        let outcome = if transfer.state == TransferState::Failed {
            Err("Transfer failed")
        } else {
            match self.state.broker.take_staged(done.transfer_id) {
                None => Err("Failed to finalize file"),
                Some(staged) => match staged.finalize().await {
                    Ok(path) => Ok(path),
                    Err(e) => {
                        tracing::error!(transfer_id = done.transfer_id, "finalize failed: {e}");
                        Err("Failed to finalize file")
                    }
                },
            }
        };

        let result = match outcome {
            Ok(path) => {
                self.state
                    .broker
                    .set_state(done.transfer_id, TransferState::Completed);
                tracing::info!(
                    transfer_id = done.transfer_id,
                    filename = %transfer.filename,
                    total_chunks = done.total_chunks,
                    file_size = done.file_size,
                    path = %path.display(),
                    "FILE_DONE_OK"
                );
                FileResult {
                    transfer_id: done.transfer_id,
                    ok: true,
                    path_or_reason: path.display().to_string(),
                }
            }
            Err(reason) => {
                self.state
                    .broker
                    .set_state(done.transfer_id, TransferState::Failed);
                tracing::info!(transfer_id = done.transfer_id, reason, "FILE_DONE FAIL");
                FileResult {
                    transfer_id: done.transfer_id,
                    ok: false,
                    path_or_reason: reason.to_string(),
                }
            }
        };

        let failed = !result.ok;
        self.send(MsgType::FileResult, &result.encode());

        // terminal either way: drop the record, and the staging directory
        // on the failure path
        self.state.broker.remove(done.transfer_id);
        if failed {
            if let Err(e) = self.state.staging.cleanup(done.transfer_id).await {
                tracing::warn!(transfer_id = done.transfer_id, "staging cleanup failed: {e}");
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(ident) = self.identity.take() {
            let count_before = self.state.registry.count();
            tracing::info!(
                remote = %self.remote,
                username = %ident.username,
                user_id = ident.user_id,
                token = %token_short(&ident.token),
                count_before,
                "ONLINE_REMOVE"
            );
            self.state.registry.remove(&ident.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_short_truncates() {
        assert_eq!(token_short("abcdef0123456789"), "abcdef01...");
        assert_eq!(token_short("ab"), "ab...");
        assert_eq!(token_short(""), "...");
    }

    #[tokio::test]
    async fn sender_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        let sender = ConnectionSender::new(tx);
        assert!(sender.is_connected());
        assert!(sender.send(MsgType::Pong, b"pong").is_ok());

        drop(rx);
        assert!(!sender.is_connected());
        assert!(sender.send(MsgType::Pong, b"pong").is_err());
    }

    #[tokio::test]
    async fn sender_frames_messages() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = ConnectionSender::new(tx);
        sender.send(MsgType::Pong, b"pong").unwrap();

        let bytes = rx.recv().await.unwrap();
        assert_eq!(bytes, encode_frame(MsgType::Pong, b"pong"));
    }
}

//! Transfer broker: per-transfer-id session records with a linear state
//! machine.
//!
//! All mutations go through one mutex protecting the id map and the next-id
//! counter. Ids start at 1 and are never reused within a process lifetime.
//! There is deliberately no cap, eviction or timeout; abandoned transfers
//! linger until restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use fsx_staging::StagedFile;

/// Chunk sizes below this are replaced with the default.
const MIN_CHUNK_SIZE: u32 = 1024;
/// Chunk sizes above this are clamped.
const MAX_CHUNK_SIZE: u32 = 1024 * 1024;
/// Substitute for undersized requests (64 KiB).
const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;
/// Substitute for oversized requests (256 KiB).
const CLAMPED_CHUNK_SIZE: u32 = 256 * 1024;

/// Sanitizes a sender-requested chunk size.
pub fn clamp_chunk_size(requested: u32) -> u32 {
    if requested < MIN_CHUNK_SIZE {
        DEFAULT_CHUNK_SIZE
    } else if requested > MAX_CHUNK_SIZE {
        CLAMPED_CHUNK_SIZE
    } else {
        requested
    }
}

/// Lifecycle of one brokered transfer.
///
/// Advances monotonically Offered → Accepted → Receiving → Completed;
/// Failed is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Offered,
    Accepted,
    Receiving,
    Completed,
    Failed,
}

/// Snapshot of one transfer's bookkeeping.
///
/// The open `.part` handle is held separately by the broker so snapshots
/// stay cheap to clone.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub id: u64,
    pub sender_user_id: i64,
    pub sender_username: String,
    /// Captured at creation so the broker can locate the sender's
    /// connection when the receiver answers.
    pub sender_token: String,
    pub receiver_user_id: i64,
    pub receiver_username: String,
    pub filename: String,
    pub file_size: u64,
    pub chunk_size: u32,
    /// Next chunk index the sender must supply.
    pub expected_chunk_index: u32,
    pub bytes_received: u64,
    pub state: TransferState,
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
}

#[derive(Default)]
struct BrokerInner {
    transfers: HashMap<u64, Transfer>,
    staged: HashMap<u64, StagedFile>,
    next_id: u64,
}

/// Mutex-guarded map of in-flight transfers plus the id counter.
pub struct TransferBroker {
    inner: Mutex<BrokerInner>,
}

impl TransferBroker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BrokerInner {
                transfers: HashMap::new(),
                staged: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a new transfer in state Offered and returns its id.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        sender_user_id: i64,
        sender_username: &str,
        sender_token: &str,
        receiver_user_id: i64,
        receiver_username: &str,
        filename: &str,
        file_size: u64,
        chunk_size: u32,
    ) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        inner.transfers.insert(
            id,
            Transfer {
                id,
                sender_user_id,
                sender_username: sender_username.to_string(),
                sender_token: sender_token.to_string(),
                receiver_user_id,
                receiver_username: receiver_username.to_string(),
                filename: filename.to_string(),
                file_size,
                chunk_size,
                expected_chunk_index: 0,
                bytes_received: 0,
                state: TransferState::Offered,
                temp_path: PathBuf::new(),
                final_path: PathBuf::new(),
            },
        );
        id
    }

    /// Records where the staged and final files live.
    pub fn set_staging_paths(&self, id: u64, temp_path: PathBuf, final_path: PathBuf) -> bool {
        let mut inner = self.lock();
        match inner.transfers.get_mut(&id) {
            Some(t) => {
                t.temp_path = temp_path;
                t.final_path = final_path;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<Transfer> {
        self.lock().transfers.get(&id).cloned()
    }

    pub fn set_state(&self, id: u64, state: TransferState) -> bool {
        let mut inner = self.lock();
        match inner.transfers.get_mut(&id) {
            Some(t) => {
                t.state = state;
                true
            }
            None => false,
        }
    }

    /// Accounts for one received chunk.
    ///
    /// Succeeds only when `chunk_index` equals the expected index; the
    /// expected index then advances, the byte count grows, and a transfer in
    /// Accepted moves to Receiving. On a mismatch nothing changes and the
    /// caller decides what to do with the transfer.
    pub fn mark_chunk_received(&self, id: u64, chunk_index: u32, payload_len: u64) -> bool {
        let mut inner = self.lock();
        let Some(t) = inner.transfers.get_mut(&id) else {
            return false;
        };
        if chunk_index != t.expected_chunk_index {
            return false;
        }
        t.expected_chunk_index += 1;
        t.bytes_received += payload_len;
        if t.state == TransferState::Accepted {
            t.state = TransferState::Receiving;
        }
        true
    }

    /// Parks the open `.part` handle with the transfer.
    pub fn store_staged(&self, id: u64, staged: StagedFile) {
        self.lock().staged.insert(id, staged);
    }

    /// Takes the `.part` handle out for writing or finalizing. Writes per
    /// transfer are sequential, so take/put does not race with itself.
    pub fn take_staged(&self, id: u64) -> Option<StagedFile> {
        self.lock().staged.remove(&id)
    }

    /// Drops the transfer record (and any parked handle, closing it).
    pub fn remove(&self, id: u64) -> bool {
        let mut inner = self.lock();
        inner.staged.remove(&id);
        inner.transfers.remove(&id).is_some()
    }
}

impl Default for TransferBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(broker: &TransferBroker) -> u64 {
        broker.create(1, "alice", "tok-a", 2, "bob", "g.txt", 6, 65_536)
    }

    #[test]
    fn clamp_chunk_size_bounds() {
        assert_eq!(clamp_chunk_size(0), 64 * 1024);
        assert_eq!(clamp_chunk_size(1023), 64 * 1024);
        assert_eq!(clamp_chunk_size(1024), 1024);
        assert_eq!(clamp_chunk_size(65_536), 65_536);
        assert_eq!(clamp_chunk_size(1024 * 1024), 1024 * 1024);
        assert_eq!(clamp_chunk_size(1024 * 1024 + 1), 256 * 1024);
        assert_eq!(clamp_chunk_size(u32::MAX), 256 * 1024);
    }

    #[test]
    fn ids_are_monotonic_from_one() {
        let broker = TransferBroker::new();
        assert_eq!(create(&broker), 1);
        assert_eq!(create(&broker), 2);
        broker.remove(1);
        // removal never frees an id for reuse
        assert_eq!(create(&broker), 3);
    }

    #[test]
    fn create_records_offered_transfer() {
        let broker = TransferBroker::new();
        let id = create(&broker);

        let t = broker.get(id).unwrap();
        assert_eq!(t.state, TransferState::Offered);
        assert_eq!(t.sender_user_id, 1);
        assert_eq!(t.sender_token, "tok-a");
        assert_eq!(t.receiver_user_id, 2);
        assert_eq!(t.expected_chunk_index, 0);
        assert_eq!(t.bytes_received, 0);

        assert!(broker.get(999).is_none());
    }

    #[test]
    fn staging_paths_are_recorded() {
        let broker = TransferBroker::new();
        let id = create(&broker);
        assert!(broker.set_staging_paths(
            id,
            PathBuf::from("/s/1/g.txt.part"),
            PathBuf::from("/s/1/g.txt"),
        ));

        let t = broker.get(id).unwrap();
        assert_eq!(t.temp_path, PathBuf::from("/s/1/g.txt.part"));
        assert_eq!(t.final_path, PathBuf::from("/s/1/g.txt"));

        assert!(!broker.set_staging_paths(999, PathBuf::new(), PathBuf::new()));
    }

    #[test]
    fn chunks_must_arrive_in_order() {
        let broker = TransferBroker::new();
        let id = create(&broker);
        broker.set_state(id, TransferState::Accepted);

        assert!(broker.mark_chunk_received(id, 0, 3));
        assert!(broker.mark_chunk_received(id, 1, 3));
        // skipping ahead fails and changes nothing
        assert!(!broker.mark_chunk_received(id, 3, 3));
        // replaying an old index fails too
        assert!(!broker.mark_chunk_received(id, 0, 3));

        let t = broker.get(id).unwrap();
        assert_eq!(t.expected_chunk_index, 2);
        assert_eq!(t.bytes_received, 6);
    }

    #[test]
    fn first_chunk_moves_accepted_to_receiving() {
        let broker = TransferBroker::new();
        let id = create(&broker);
        broker.set_state(id, TransferState::Accepted);

        broker.mark_chunk_received(id, 0, 10);
        assert_eq!(broker.get(id).unwrap().state, TransferState::Receiving);

        broker.mark_chunk_received(id, 1, 10);
        assert_eq!(broker.get(id).unwrap().state, TransferState::Receiving);
    }

    #[test]
    fn mark_chunk_on_unknown_transfer_fails() {
        let broker = TransferBroker::new();
        assert!(!broker.mark_chunk_received(42, 0, 1));
    }

    #[test]
    fn remove_drops_the_record() {
        let broker = TransferBroker::new();
        let id = create(&broker);
        assert!(broker.remove(id));
        assert!(broker.get(id).is_none());
        assert!(!broker.remove(id));
    }

    #[tokio::test]
    async fn staged_handle_take_and_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = fsx_staging::FileStore::new(dir.path());
        store.init().await.unwrap();

        let broker = TransferBroker::new();
        let id = create(&broker);

        let staged = store.open_for_write(id, "g.txt").await.unwrap();
        broker.store_staged(id, staged);

        let mut staged = broker.take_staged(id).unwrap();
        assert!(broker.take_staged(id).is_none());
        staged.write_chunk(b"hi").await.unwrap();
        broker.store_staged(id, staged);

        broker.remove(id);
        assert!(broker.take_staged(id).is_none());
    }
}

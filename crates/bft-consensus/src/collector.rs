//! `TransactionCollector` (spec §4.E): per-sequence-number vote counting for
//! the three-phase commit state machine.
//!
//! The collector itself is deliberately dumb: it tracks arriving votes and
//! exposes atomic primitives (`set_main`, `add_vote`, `try_advance`) that the
//! orchestrator (`commitment::Commitment`, spec §4.G) composes into the
//! actual pre-prepare/prepare/commit transition logic described in spec
//! §4.E's "driven by the callback in Commitment, not by the collector
//! itself". Phase transitions use compare-exchange on an atomic status
//! rather than a coarse per-collector mutex, per the design note in spec §9.

use bft_types::{Request, SignatureInfo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// The phase a collector occupies for its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CollectorStatus {
    /// No pre-prepare observed yet.
    None = 0,
    /// A pre-prepare is present; accumulating Prepare votes.
    ReadyPrepare = 1,
    /// Quorum of Prepare votes reached; accumulating Commit votes.
    ReadyCommit = 2,
    /// Quorum of Commit votes reached; awaiting hand-off to the executor.
    ReadyExecute = 3,
    /// Handed to the executor. Rejects all further input.
    Executed = 4,
}

impl CollectorStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => CollectorStatus::None,
            1 => CollectorStatus::ReadyPrepare,
            2 => CollectorStatus::ReadyCommit,
            3 => CollectorStatus::ReadyExecute,
            _ => CollectorStatus::Executed,
        }
    }
}

/// Which phase a vote belongs to, used to pick the right sender bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteType {
    /// A Prepare vote.
    Prepare,
    /// A Commit vote.
    Commit,
}

/// A 128-bit bitmap of distinct senders that have voted in one phase,
/// implemented as two `AtomicU64` words per spec §3/§9.
#[derive(Debug, Default)]
struct SenderBitmap {
    words: [AtomicU64; 2],
}

impl SenderBitmap {
    /// Sets the bit for `sender_id`. Returns whether it was newly set (i.e.
    /// this sender had not yet voted in this phase).
    ///
    /// `sender_id` must be below 128, the replica-id space this bitmap
    /// covers (spec §3 bounds cluster size well under that).
    fn set(&self, sender_id: u32) -> bool {
        let idx = (sender_id / 64) as usize;
        debug_assert!(idx < 2, "sender_id {sender_id} exceeds the 128-id bitmap space");
        let bit = 1u64 << (sender_id % 64);
        let previous = self.words[idx].fetch_or(bit, Ordering::AcqRel);
        previous & bit == 0
    }

    fn count(&self) -> usize {
        (self.words[0].load(Ordering::Acquire).count_ones()
            + self.words[1].load(Ordering::Acquire).count_ones()) as usize
    }
}

/// Per-sequence-number vote record, one per in-flight seq (spec §3, §4.E).
pub struct TransactionCollector {
    seq: u64,
    status: AtomicU8,
    main_request: Mutex<Option<Request>>,
    prepare_votes: SenderBitmap,
    commit_votes: SenderBitmap,
    committed_certs: Mutex<Vec<SignatureInfo>>,
}

impl TransactionCollector {
    /// Creates an empty collector for `seq`.
    #[must_use]
    pub fn new(seq: u64) -> Self {
        Self {
            seq,
            status: AtomicU8::new(CollectorStatus::None as u8),
            main_request: Mutex::new(None),
            prepare_votes: SenderBitmap::default(),
            commit_votes: SenderBitmap::default(),
            committed_certs: Mutex::new(Vec::new()),
        }
    }

    /// The sequence number this collector tracks.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The current phase.
    #[must_use]
    pub fn status(&self) -> CollectorStatus {
        CollectorStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Whether this collector has already been handed to the executor; any
    /// further input must be rejected (spec §4.E step 1).
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.status() == CollectorStatus::Executed
    }

    /// Sets the pre-prepare exactly once. Returns `Some(hash)` the first
    /// time it's called (the caller should then attempt the
    /// `None -> ReadyPrepare` transition); returns `None` on any subsequent
    /// call, which silently no-ops (spec §4.E step 3, invariant 4 in spec
    /// §8: single proposal per seq).
    pub fn set_main(&self, request: Request) -> Option<Vec<u8>> {
        let mut main = self.main_request.lock();
        if main.is_some() {
            return None;
        }
        let hash = request.hash.clone();
        *main = Some(request);
        Some(hash)
    }

    /// The stored pre-prepare's hash, if one has been set.
    #[must_use]
    pub fn main_hash(&self) -> Option<Vec<u8>> {
        self.main_request.lock().as_ref().map(|r| r.hash.clone())
    }

    /// Whether a pre-prepare has been accepted.
    #[must_use]
    pub fn has_main(&self) -> bool {
        self.main_request.lock().is_some()
    }

    /// A clone of the stored pre-prepare, if present.
    #[must_use]
    pub fn main_request(&self) -> Option<Request> {
        self.main_request.lock().clone()
    }

    /// Records a vote from `sender_id`. Returns `Some(new_count)` if this
    /// sender had not yet voted in this phase (appending `req`'s signature to
    /// the quorum certificate when this is a Commit vote); returns `None` for
    /// a duplicate vote, which is dropped (spec §4.E step 4, example E2).
    ///
    /// Only Commit votes contribute to [`Self::committed_certs`] — the
    /// certificate attached to an executed seq is the `2f+1` Commit
    /// signatures, not a mix of Prepare and Commit signatures.
    pub fn add_vote(&self, vote_type: VoteType, sender_id: u32, req: &Request) -> Option<usize> {
        let bitmap = match vote_type {
            VoteType::Prepare => &self.prepare_votes,
            VoteType::Commit => &self.commit_votes,
        };
        if !bitmap.set(sender_id) {
            return None;
        }
        if vote_type == VoteType::Commit {
            if let Some(sig) = &req.data_signature {
                self.committed_certs.lock().push(sig.clone());
            }
        }
        Some(bitmap.count())
    }

    /// Distinct Prepare votes observed so far.
    #[must_use]
    pub fn prepare_count(&self) -> usize {
        self.prepare_votes.count()
    }

    /// Distinct Commit votes observed so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commit_votes.count()
    }

    /// The quorum certificate collected for this seq so far.
    #[must_use]
    pub fn committed_certs(&self) -> Vec<SignatureInfo> {
        self.committed_certs.lock().clone()
    }

    /// Attempts to move the collector from `from` to `to`. The first thread
    /// to observe a crossed threshold wins this compare-exchange; all other
    /// concurrent observers see it fail and treat it as a benign no-op
    /// (spec §4.E "all transitions use compare-exchange").
    pub fn try_advance(&self, from: CollectorStatus, to: CollectorStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

//! Mirror-side receiver.

use treesync_core::{ChangeKind, Envelope, Result};
use treesync_mirror::MirrorNode;

/// Owns a mirror root and feeds it envelopes from a publisher.
///
/// After a rejected envelope the mirror may be partially updated, so the
/// subscriber ignores further deltas until a complete state arrives. Ask
/// the publisher for one with
/// [`Publisher::request_resync`](crate::Publisher::request_resync).
pub struct Subscriber {
    mirror: MirrorNode,
    awaiting_complete: bool,
    received: u64,
    skipped: u64,
}

impl Subscriber {
    /// Deltas are ignored until the first complete state arrives.
    pub fn new(mirror: MirrorNode) -> Self {
        Self {
            mirror,
            awaiting_complete: true,
            received: 0,
            skipped: 0,
        }
    }

    pub fn mirror(&self) -> &MirrorNode {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut MirrorNode {
        &mut self.mirror
    }

    /// True until a complete state has been applied successfully.
    pub fn needs_resync(&self) -> bool {
        self.awaiting_complete
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn receive(&mut self, envelope: &Envelope) -> Result<()> {
        let kind = match envelope.kind() {
            Ok(kind) => kind,
            Err(err) => {
                self.awaiting_complete = true;
                tracing::warn!(error = %err, "dropping envelope without a valid tag");
                return Err(err);
            }
        };

        if kind == ChangeKind::Partial && self.awaiting_complete {
            self.skipped += 1;
            tracing::debug!("skipping delta while waiting for a complete state");
            return Ok(());
        }

        match self.mirror.apply_recent_changes(envelope) {
            Ok(()) => {
                self.received += 1;
                if kind == ChangeKind::Complete {
                    self.awaiting_complete = false;
                }
                Ok(())
            }
            Err(err) => {
                self.awaiting_complete = true;
                Err(err)
            }
        }
    }

    /// Decode JSON bytes and [`receive`](Subscriber::receive) them.
    pub fn receive_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let envelope = Envelope::from_bytes(bytes).map_err(|err| {
            self.awaiting_complete = true;
            tracing::warn!(error = %err, "dropping undecodable envelope");
            err
        })?;
        self.receive(&envelope)
    }
}

use crate::core::error::EscrowError;
use crate::core::types::{Owner, TokenId};
use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use flurry::HashMap;
use std::thread;

/// Sole authority for "is there enough collateral" checks: the matching
/// core's accounting view of per-owner, per-token commitments. It does
/// not hold real tokens; the ledger collaborator separately verifies
/// that on-chain escrow matches (see [`crate::core::error::CoreError::EscrowDesync`]).
pub trait EscrowAuthority: Send + Sync {
    fn commit(&self, owner: Owner, token: TokenId, amount: u64);
    fn release(&self, owner: Owner, token: TokenId, amount: u64) -> Result<(), EscrowError>;
    fn committed(&self, owner: Owner, token: TokenId) -> u64;
}

/// In-process escrow ledger for a single matching core.
///
/// Safe to share across `pair_id`s within one process without an actor:
/// `flurry::HashMap` tolerates concurrent readers while writes are
/// serialised by whichever caller holds the `&EscrowLedger`. When the
/// ledger must be shared *across* independently-threaded pair-cores,
/// wrap it in an [`EscrowLedgerActor`] instead, per the single-writer
/// discipline described in the design (sharded pair-cores that share an
/// owner across pairs of the same quote token).
pub struct EscrowLedger {
    committed: HashMap<(Owner, TokenId), u64>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self {
            committed: HashMap::new(),
        }
    }
}

impl Default for EscrowLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl EscrowAuthority for EscrowLedger {
    fn commit(&self, owner: Owner, token: TokenId, amount: u64) {
        let pins = self.committed.pin();
        let current = pins.get(&(owner, token)).copied().unwrap_or(0);
        pins.insert((owner, token), current + amount);
    }

    fn release(&self, owner: Owner, token: TokenId, amount: u64) -> Result<(), EscrowError> {
        let pins = self.committed.pin();
        let current = pins.get(&(owner, token)).copied().unwrap_or(0);
        if amount > current {
            return Err(EscrowError::Underflow {
                amount,
                committed: current,
            });
        }
        let remaining = current - amount;
        if remaining == 0 {
            pins.remove(&(owner, token));
        } else {
            pins.insert((owner, token), remaining);
        }
        Ok(())
    }

    fn committed(&self, owner: Owner, token: TokenId) -> u64 {
        let pins = self.committed.pin();
        pins.get(&(owner, token)).copied().unwrap_or(0)
    }
}

enum EscrowCommand {
    Commit {
        owner: Owner,
        token: TokenId,
        amount: u64,
    },
    Release {
        owner: Owner,
        token: TokenId,
        amount: u64,
        reply: Sender<Result<(), EscrowError>>,
    },
    Committed {
        owner: Owner,
        token: TokenId,
        reply: Sender<u64>,
    },
}

/// Single-writer actor fronting one [`EscrowLedger`] with a FIFO mailbox,
/// so several pair-cores (each single-threaded in its own right) can
/// share one authoritative escrow view without a shared lock.
pub struct EscrowLedgerActor {
    mailbox: Sender<EscrowCommand>,
    _worker: thread::JoinHandle<()>,
}

impl EscrowLedgerActor {
    pub fn spawn() -> Self {
        let (mailbox, inbox): (Sender<EscrowCommand>, Receiver<EscrowCommand>) = unbounded();
        let worker = thread::spawn(move || {
            let ledger = EscrowLedger::new();
            while let Ok(command) = inbox.recv() {
                match command {
                    EscrowCommand::Commit {
                        owner,
                        token,
                        amount,
                    } => ledger.commit(owner, token, amount),
                    EscrowCommand::Release {
                        owner,
                        token,
                        amount,
                        reply,
                    } => {
                        let _ = reply.send(ledger.release(owner, token, amount));
                    }
                    EscrowCommand::Committed {
                        owner,
                        token,
                        reply,
                    } => {
                        let _ = reply.send(ledger.committed(owner, token));
                    }
                }
            }
        });
        Self {
            mailbox,
            _worker: worker,
        }
    }
}

impl EscrowAuthority for EscrowLedgerActor {
    fn commit(&self, owner: Owner, token: TokenId, amount: u64) {
        let _ = self.mailbox.send(EscrowCommand::Commit {
            owner,
            token,
            amount,
        });
    }

    fn release(&self, owner: Owner, token: TokenId, amount: u64) -> Result<(), EscrowError> {
        let (reply, response) = bounded(1);
        if self
            .mailbox
            .send(EscrowCommand::Release {
                owner,
                token,
                amount,
                reply,
            })
            .is_err()
        {
            return Ok(());
        }
        response.recv().unwrap_or(Ok(()))
    }

    fn committed(&self, owner: Owner, token: TokenId) -> u64 {
        let (reply, response) = bounded(1);
        if self
            .mailbox
            .send(EscrowCommand::Committed {
                owner,
                token,
                reply,
            })
            .is_err()
        {
            return 0;
        }
        response.recv().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_then_committed_roundtrip() {
        let ledger = EscrowLedger::new();
        ledger.commit(1, 7, 100);
        assert_eq!(ledger.committed(1, 7), 100);
    }

    #[test]
    fn release_underflow_is_rejected() {
        let ledger = EscrowLedger::new();
        ledger.commit(1, 7, 50);
        assert!(matches!(
            ledger.release(1, 7, 51),
            Err(EscrowError::Underflow {
                amount: 51,
                committed: 50
            })
        ));
    }

    #[test]
    fn release_to_zero_prunes_entry() {
        let ledger = EscrowLedger::new();
        ledger.commit(1, 7, 50);
        ledger.release(1, 7, 50).unwrap();
        assert_eq!(ledger.committed(1, 7), 0);
    }

    #[test]
    fn actor_serialises_commits_and_releases() {
        let actor = EscrowLedgerActor::spawn();
        actor.commit(1, 7, 100);
        actor.commit(1, 7, 50);
        assert_eq!(actor.committed(1, 7), 150);
        actor.release(1, 7, 150).unwrap();
        assert_eq!(actor.committed(1, 7), 0);
    }
}

//! FIFO rendezvous point for matching sends and receives, with optional
//! receiver affinity ("eager mode"): spec ยง3/ยง4.4.

use crate::ActivityId;
use crate::Pid;
use std::collections::VecDeque;

/// What a newly-posted send should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMatch {
    /// A recv was already waiting; start the transfer against it.
    Recv(ActivityId),
    /// No recv posted, but the mailbox has a receiver affinity: start the
    /// transfer eagerly against that receiver's host.
    EagerReceiver(Pid),
    /// Queued; a future recv (or nothing, if the simulation ends first)
    /// will match it.
    Queued,
}

/// What a newly-posted recv should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvMatch {
    /// Attach to a transfer already running because it was sent eagerly.
    AlreadyRunning(ActivityId),
    /// A send was already waiting; start the transfer against it.
    Send(ActivityId),
    /// Queued.
    Queued,
}

pub struct Mailbox {
    name: String,
    pending_sends: VecDeque<ActivityId>,
    pending_recvs: VecDeque<ActivityId>,
    eager_in_flight: VecDeque<ActivityId>,
    receiver: Option<Pid>,
}

impl Mailbox {
    pub fn new(name: impl Into<String>) -> Mailbox {
        Mailbox {
            name: name.into(),
            pending_sends: VecDeque::new(),
            pending_recvs: VecDeque::new(),
            eager_in_flight: VecDeque::new(),
            receiver: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn receiver(&self) -> Option<Pid> {
        self.receiver
    }

    /// Sets (or clears, with `None`) the mailbox's receiver affinity.
    pub fn set_receiver(&mut self, receiver: Option<Pid>) {
        self.receiver = receiver;
    }

    /// Registers a new send, returning what the caller should do with it.
    pub fn post_send(&mut self, send: ActivityId) -> SendMatch {
        if let Some(recv) = self.pending_recvs.pop_front() {
            SendMatch::Recv(recv)
        } else if let Some(receiver) = self.receiver {
            self.eager_in_flight.push_back(send);
            SendMatch::EagerReceiver(receiver)
        } else {
            self.pending_sends.push_back(send);
            SendMatch::Queued
        }
    }

    /// Registers a new recv, returning what the caller should do with it.
    pub fn post_recv(&mut self, recv: ActivityId) -> RecvMatch {
        if let Some(send) = self.eager_in_flight.pop_front() {
            RecvMatch::AlreadyRunning(send)
        } else if let Some(send) = self.pending_sends.pop_front() {
            RecvMatch::Send(send)
        } else {
            self.pending_recvs.push_back(recv);
            RecvMatch::Queued
        }
    }

    /// Removes a previously-queued send or recv (e.g. because its activity
    /// was cancelled while still waiting for a match).
    pub fn withdraw(&mut self, id: ActivityId) {
        self.pending_sends.retain(|&x| x != id);
        self.pending_recvs.retain(|&x| x != id);
        self.eager_in_flight.retain(|&x| x != id);
    }

    /// Non-destructive probe: is there a send already waiting to be
    /// matched? (`iprobe`, spec ยง6.)
    pub fn has_pending_send(&self) -> bool {
        !self.pending_sends.is_empty() || !self.eager_in_flight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_recv_matches_fifo() {
        let mut mbox = Mailbox::new("m");
        assert_eq!(mbox.post_send(1), SendMatch::Queued);
        assert_eq!(mbox.post_recv(2), RecvMatch::Send(1));
    }

    #[test]
    fn recv_then_send_matches() {
        let mut mbox = Mailbox::new("m");
        assert_eq!(mbox.post_recv(2), RecvMatch::Queued);
        assert_eq!(mbox.post_send(1), SendMatch::Recv(2));
    }

    #[test]
    fn eager_receiver_starts_before_recv_posted() {
        let mut mbox = Mailbox::new("m");
        mbox.set_receiver(Some(42));
        assert_eq!(mbox.post_send(1), SendMatch::EagerReceiver(42));
        assert_eq!(mbox.post_recv(2), RecvMatch::AlreadyRunning(1));
    }

    #[test]
    fn withdraw_removes_from_every_queue() {
        let mut mbox = Mailbox::new("m");
        mbox.post_send(1);
        mbox.withdraw(1);
        assert!(!mbox.has_pending_send());
    }
}

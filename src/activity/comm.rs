//! Comm activities: a rendezvous-based data transfer between a sender and
//! a receiver host, attached to a [`crate::mailbox::Mailbox`].

use super::{ActivityImpl, ActivityKind, ActivityState};
use crate::lmm;

/// Rendezvous sub-state, orthogonal to the generic [`ActivityState`]: a
/// comm starts life as a lone send or recv waiting for its counterpart
/// (`SrcReady`/`DstReady`), becomes `Matched` once both sides are known,
/// `InFlight` once bytes start moving, and `Terminated` once the transfer
/// (and its latency countdown) finishes. Spec ยง3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommPhase {
    SrcReady,
    DstReady,
    Matched,
    InFlight,
    Terminated,
}

pub struct CommImpl {
    pub src_host: String,
    pub dst_host: String,
    pub mailbox: String,
    pub size_bytes: f64,
    pub phase: CommPhase,
}

impl CommImpl {
    /// Builds the activity for a matched send/recv pair and attaches it to
    /// `link_constraints` (the route's links, each contributing
    /// `bytes-per-second` coefficient 1.0) with `latency` seconds to count
    /// down before the transfer competes for bandwidth.
    pub fn spawn_matched(
        system: &mut lmm::System,
        name: impl Into<String>,
        src_host: impl Into<String>,
        dst_host: impl Into<String>,
        mailbox: impl Into<String>,
        size_bytes: f64,
        link_constraints: &[lmm::ConstraintId],
        latency: f64,
    ) -> ActivityImpl {
        let kind = CommImpl {
            src_host: src_host.into(),
            dst_host: dst_host.into(),
            mailbox: mailbox.into(),
            size_bytes,
            phase: CommPhase::Matched,
        };
        let variable = system.add_variable(1.0, None);
        for constraint in link_constraints {
            system.expand(variable, *constraint, 1.0);
        }
        if latency > 0.0 {
            // Held at rate 0 until the latency window elapses (spec ยง4.3);
            // `Engine::account_all` reactivates it once it does.
            system.deactivate(variable);
        }
        let mut activity = ActivityImpl::new(name, ActivityKind::Comm(kind), size_bytes);
        activity.variable = Some(variable);
        activity.latency_remaining = latency;
        activity.state = ActivityState::Started;
        if let ActivityKind::Comm(c) = &mut activity.kind {
            c.phase = CommPhase::InFlight;
        }
        activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Link, LinkSharing};

    #[test]
    fn latency_holds_back_accounting_until_it_elapses() {
        let mut sys = lmm::System::new();
        let link = Link::new(&mut sys, "l0", 100_000_000.0, 0.001, LinkSharing::Shared);
        let mut activity = CommImpl::spawn_matched(
            &mut sys,
            "ping",
            "h1",
            "h2",
            "m",
            1_000_000.0,
            &[link.constraint()],
            0.001,
        );
        let variable = activity.variable.unwrap();
        sys.solve();
        // deactivated for the latency window: it draws no rate at all
        assert_eq!(sys.rate(variable), 0.0);
        let finished = activity.account(sys.rate(variable), 0.001);
        assert!(!finished);
        assert_eq!(activity.remaining, 1_000_000.0);
        // latency elapsed: reactivate and let it compete for bandwidth
        sys.reactivate(variable);
        sys.solve();
        let rate = sys.rate(variable);
        assert!(rate > 0.0);
        let finished = activity.account(rate, 0.01);
        assert!(finished);
    }
}

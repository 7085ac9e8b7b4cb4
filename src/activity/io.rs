//! I/O activities: a read or write of `size` bytes on one disk.

use super::{ActivityImpl, ActivityKind, ActivityState};
use crate::lmm;

pub struct IoImpl {
    pub host: String,
    pub disk: String,
    pub write: bool,
    pub size_bytes: f64,
}

impl IoImpl {
    pub fn new(
        system: &mut lmm::System,
        name: impl Into<String>,
        host: impl Into<String>,
        disk: impl Into<String>,
        write: bool,
        size_bytes: f64,
        constraint: lmm::ConstraintId,
    ) -> ActivityImpl {
        let kind = IoImpl {
            host: host.into(),
            disk: disk.into(),
            write,
            size_bytes,
        };
        let variable = system.add_variable(1.0, None);
        system.expand(variable, constraint, 1.0);
        let mut activity = ActivityImpl::new(name, ActivityKind::Io(kind), size_bytes);
        activity.variable = Some(variable);
        activity.state = ActivityState::Started;
        activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Disk;

    #[test]
    fn write_and_read_share_separate_bandwidth_when_unshared() {
        let mut sys = lmm::System::new();
        let disk = Disk::new(&mut sys, "d0", 200.0, 100.0);
        let mut write = IoImpl::new(&mut sys, "w", "h1", "d0", true, 100.0, disk.write_constraint());
        let mut read = IoImpl::new(&mut sys, "r", "h1", "d0", false, 100.0, disk.read_constraint());
        sys.solve();
        assert!((sys.rate(write.variable.unwrap()) - 100.0).abs() < 1e-6);
        assert!((sys.rate(read.variable.unwrap()) - 200.0).abs() < 1e-6);
        assert!(write.account(100.0, 1.0));
        assert!(read.account(200.0, 0.5));
    }
}

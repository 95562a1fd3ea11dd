//! Arm switch: whether the system is holding a position.
//!
//! Armed keeps the process active outside trading hours. The position
//! poller disarms it once the position is flat.

use perpgate_core::PositionInfo;
use perpgate_position::DisarmHandler;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct ArmSwitch {
    armed: AtomicBool,
}

impl ArmSwitch {
    pub fn new(armed: bool) -> Self {
        Self {
            armed: AtomicBool::new(armed),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Armed iff `info` shows an open long or short.
    pub fn update(&self, info: &PositionInfo) {
        let armed = !info.is_flat();
        if self.armed.swap(armed, Ordering::SeqCst) != armed {
            info!(armed, "Arm state changed");
        }
    }
}

impl DisarmHandler for ArmSwitch {
    fn disarm(&self, _info: &PositionInfo) {
        if self.armed.swap(false, Ordering::SeqCst) {
            info!("System disarmed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_follows_position() {
        let switch = ArmSwitch::default();
        assert!(!switch.is_armed());

        switch.update(&PositionInfo {
            has_long: true,
            ..PositionInfo::default()
        });
        assert!(switch.is_armed());

        switch.update(&PositionInfo::default());
        assert!(!switch.is_armed());
    }

    #[test]
    fn test_disarm() {
        let switch = ArmSwitch::new(true);
        switch.disarm(&PositionInfo::default());
        assert!(!switch.is_armed());
        // Repeated disarm is harmless.
        switch.disarm(&PositionInfo::default());
        assert!(!switch.is_armed());
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timer {
    deadline_ms: Option<u64>,
}

impl Timer {
    pub fn arm(&mut self, now_ms: u64, delay_ms: u64) {
        self.deadline_ms = Some(now_ms.saturating_add(delay_ms));
    }

    pub fn disarm(&mut self) {
        self.deadline_ms = None;
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline_ms
    }

    pub fn remaining(&self, now_ms: u64) -> Option<u64> {
        self.deadline_ms.map(|at| at.saturating_sub(now_ms))
    }

    pub fn fire_if_due(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(at) if now_ms >= at => {
                self.deadline_ms = None;
                true
            }
            _ => false,
        }
    }
}

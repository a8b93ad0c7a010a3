use domain::ConnectionState;
use tracing::{debug, warn};

/// 连接状态记录，非法迁移只记录告警。
#[derive(Debug)]
pub(crate) struct StateTracker {
    source: &'static str,
    current: ConnectionState,
}

impl StateTracker {
    pub(crate) fn new(source: &'static str) -> Self {
        Self {
            source,
            current: ConnectionState::Unconnected,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        self.current
    }

    pub(crate) fn set(&mut self, next: ConnectionState) {
        if self.current == next {
            return;
        }
        if !self.current.can_transition_to(next) {
            warn!(
                source = self.source,
                from = %self.current,
                to = %next,
                "unexpected connection state transition"
            );
        }
        debug!(source = self.source, from = %self.current, to = %next, "connection_state");
        self.current = next;
    }
}

/// What the transport should do on a liveness tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping and wait for the next tick.
    Ping,
    /// No pong arrived for a full interval.
    Terminate,
}

/// Per-listener liveness state.
///
/// A listener starts alive. Each tick clears the flag and asks for a ping;
/// a tick that finds the flag still cleared means the previous ping went
/// unanswered for a whole interval.
#[derive(Debug)]
pub struct Heartbeat {
    alive: bool,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Heartbeat {
    pub fn new() -> Self {
        Self { alive: true }
    }

    pub fn on_tick(&mut self) -> HeartbeatAction {
        if !self.alive {
            return HeartbeatAction::Terminate;
        }
        self.alive = false;
        HeartbeatAction::Ping
    }

    /// Any pong (transport or application level) marks the listener alive.
    pub fn on_pong(&mut self) {
        self.alive = true;
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

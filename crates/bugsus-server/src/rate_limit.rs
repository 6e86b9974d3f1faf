use tokio::time::Instant;

/// Inbound message budget for one WebSocket connection.
///
/// Starts full at `burst` credits and earns `per_sec` credits back every
/// second, never holding more than `burst`. Each accepted message spends one.
pub struct TokenBucket {
    burst: f64,
    per_sec: f64,
    credits: f64,
    checked_at: Instant,
}

impl TokenBucket {
    pub fn new(burst: f64, per_sec: f64) -> Self {
        Self {
            burst,
            per_sec,
            credits: burst,
            checked_at: Instant::now(),
        }
    }

    /// Spend one credit if there is one.
    pub fn try_take(&mut self) -> bool {
        self.top_up();
        if self.credits < 1.0 {
            return false;
        }
        self.credits -= 1.0;
        true
    }

    fn top_up(&mut self) {
        let now = Instant::now();
        let earned = (now - self.checked_at).as_secs_f64() * self.per_sec;
        self.credits = self.burst.min(self.credits + earned);
        self.checked_at = now;
    }
}

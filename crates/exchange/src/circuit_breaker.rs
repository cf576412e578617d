//! Safety-stop state machine (SPEC_FULL.md §4.11) — a distinct state machine from the
//! teacher's daily-loss/pause-duration breaker, restored from and persisted back to
//! `live_circuit_breaker` every cycle by [`crate::live_engine`].
//!
//! Grounded on the `parking_lot::RwLock`-guarded state pattern in `arbitrage::circuit_breaker`.

use crate::types::CircuitBreakerState;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

pub struct CircuitBreaker {
    state: RwLock<CircuitBreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(state: CircuitBreakerState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerState {
        self.state.read().clone()
    }

    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.state.read().is_open(now)
    }

    pub fn record_loss(&self, amount: Decimal, now: DateTime<Utc>) {
        let mut state = self.state.write();
        state.consecutive_losses += 1;
        state.total_pnl += amount;

        if state.consecutive_losses >= state.max_losses {
            state.cooldown_until = now + Duration::seconds(state.cooldown_duration_seconds);
            state.consecutive_losses = 0;
            state.triggered_reason = Some("consecutive losses".to_string());
        }

        if state.total_pnl < state.max_drawdown {
            state.triggered = true;
            state.triggered_reason = Some("max drawdown exceeded".to_string());
        }
    }

    pub fn record_win(&self, amount: Decimal) {
        let mut state = self.state.write();
        state.consecutive_losses = 0;
        state.total_pnl += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fresh(max_losses: u32, cooldown_minutes: i64, max_drawdown: Decimal) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerState {
            consecutive_losses: 0,
            max_losses,
            cooldown_until: Utc::now() - Duration::seconds(1),
            cooldown_duration_seconds: cooldown_minutes * 60,
            total_pnl: Decimal::ZERO,
            max_drawdown,
            triggered: false,
            triggered_reason: None,
        })
    }

    #[test]
    fn s5_trips_on_three_losses() {
        let breaker = fresh(3, 30, dec!(-100));
        let now = Utc::now();
        assert!(breaker.is_open(now));

        breaker.record_loss(dec!(0.1), now);
        breaker.record_loss(dec!(0.1), now);
        assert!(breaker.is_open(now));

        breaker.record_loss(dec!(0.1), now);
        let snap = breaker.snapshot();
        assert_eq!(snap.consecutive_losses, 0);
        assert!(snap.cooldown_until > now);
        assert!(!breaker.is_open(now));
        assert_eq!(snap.triggered_reason.as_deref(), Some("consecutive losses"));
    }

    #[test]
    fn win_resets_consecutive_losses() {
        let breaker = fresh(3, 30, dec!(-100));
        let now = Utc::now();
        breaker.record_loss(dec!(0.1), now);
        breaker.record_loss(dec!(0.1), now);
        breaker.record_win(dec!(0.5));
        assert_eq!(breaker.snapshot().consecutive_losses, 0);
    }

    #[test]
    fn drawdown_permanently_trips() {
        let breaker = fresh(10, 30, dec!(-1));
        let now = Utc::now();
        breaker.record_loss(dec!(2), now);
        let snap = breaker.snapshot();
        assert!(snap.triggered);
        assert!(!breaker.is_open(now));
        // even after a win, a permanently triggered breaker never reopens
        breaker.record_win(dec!(100));
        assert!(!breaker.is_open(now));
    }
}

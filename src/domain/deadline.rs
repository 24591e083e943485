//! Deadline window arithmetic.
//!
//! A task carries one requestor-set `deadline`; the protocol adds a grace
//! period Δ (the messaging time). Two windows follow:
//!
//! - response window: `now ≤ deadline + Δ`. Ack and Reject are accepted.
//! - extended delivery window: `deadline + Δ < now ≤ deadline + 2Δ`.
//!   Unanswered Forces are auto-acknowledged and stored answers are still
//!   delivered.
//!
//! Past `deadline + 2Δ` nothing about the task is delivered anymore.

/// Where an instant falls relative to a task's deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// `now ≤ deadline`.
    BeforeDeadline,
    /// `deadline < now ≤ deadline + Δ`.
    Grace,
    /// `deadline + Δ < now ≤ deadline + 2Δ`.
    Extended,
    /// `now > deadline + 2Δ`.
    Expired,
}

/// Deadline and grace period of one task.
///
/// All arithmetic saturates, so extreme deadlines never wrap around.
///
/// # Examples
///
/// ```
/// use concent_arbiter::domain::{Deadlines, Window};
///
/// let d = Deadlines::new(1000, 60);
/// assert!(d.accepts_response(1060));
/// assert!(!d.accepts_response(1061));
/// assert!(d.in_auto_ack_window(1065));
/// assert_eq!(d.window(1121), Window::Expired);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    deadline: i64,
    messaging_time: i64,
}

impl Deadlines {
    /// Creates the windows for `deadline` with grace period `messaging_time`.
    pub fn new(deadline: i64, messaging_time: i64) -> Self {
        Self {
            deadline,
            messaging_time,
        }
    }

    /// The requestor-set deadline.
    pub fn deadline(&self) -> i64 {
        self.deadline
    }

    /// Last instant at which an Ack or Reject is accepted (`deadline + Δ`).
    pub fn response_window_end(&self) -> i64 {
        self.deadline.saturating_add(self.messaging_time)
    }

    /// Last instant at which anything is delivered (`deadline + 2Δ`).
    pub fn delivery_window_end(&self) -> i64 {
        self.deadline
            .saturating_add(self.messaging_time.saturating_mul(2))
    }

    /// `now > deadline`.
    pub fn is_past_deadline(&self, now: i64) -> bool {
        now > self.deadline
    }

    /// `now ≤ deadline + Δ`.
    pub fn accepts_response(&self, now: i64) -> bool {
        now <= self.response_window_end()
    }

    /// `now ≤ deadline + 2Δ`.
    pub fn accepts_delivery(&self, now: i64) -> bool {
        now <= self.delivery_window_end()
    }

    /// `deadline + Δ < now ≤ deadline + 2Δ`.
    pub fn in_auto_ack_window(&self, now: i64) -> bool {
        !self.accepts_response(now) && self.accepts_delivery(now)
    }

    /// Classifies `now`.
    pub fn window(&self, now: i64) -> Window {
        if !self.is_past_deadline(now) {
            Window::BeforeDeadline
        } else if self.accepts_response(now) {
            Window::Grace
        } else if self.accepts_delivery(now) {
            Window::Extended
        } else {
            Window::Expired
        }
    }
}

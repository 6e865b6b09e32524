use chrono::{DateTime, Duration, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Start of a look-back window ending now.
pub fn window_start(window: Duration) -> DateTime<Utc> {
    now() - window
}

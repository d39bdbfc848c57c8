use std::cell::Cell;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

/// Wall-clock source whose readings are strictly increasing: consecutive
/// mutations to the same record must produce distinct `updated_at` values
/// even when they land inside one clock tick.
#[derive(Debug, Default)]
pub struct Clock {
    last: Cell<Option<DateTime<Utc>>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last.get()
            && now <= last
        {
            now = last + Duration::microseconds(1);
        }
        self.last.set(Some(now));
        now
    }
}

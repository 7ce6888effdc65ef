use chrono::{DateTime, Utc};

pub fn now_utc() -> DateTime<Utc> {
    if let Ok(value) = std::env::var("CT_FIXED_TIME") {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
            return dt.with_timezone(&Utc);
        }
    }
    Utc::now()
}

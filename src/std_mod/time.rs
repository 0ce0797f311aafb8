use crate::{
    objects::object::NativeObject,
    value::{make_number_value, Value},
};
use std::time::{SystemTime, UNIX_EPOCH};

/// The `clock()` native: seconds since the epoch as a number, for timing
/// scripts against each other.
pub struct ClockTime;

impl ClockTime {
    pub fn new() -> Self {
        ClockTime {}
    }
}

impl NativeObject for ClockTime {
    fn run(&self, _args: &[Value]) -> Result<Value, String> {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?;
        Ok(make_number_value(duration.as_secs_f64()))
    }
}

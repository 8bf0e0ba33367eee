use std::time::Duration;

use gossipd_util_array_type::array_type_fixed_size_define;
use bincode::{Decode, Encode};
use time::OffsetDateTime;

array_type_fixed_size_define! {
    /// Microsecond-precision absolute timestamp, UTC.
    #[derive(Encode, Decode, Clone, Copy)]
    pub struct Timestamp(u64);
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from(
            u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1000)
                .expect("Can't fail before year 586524"),
        )
    }

    pub fn after(self, duration: Duration) -> Self {
        Self::from(u64::from(self).saturating_add(duration.as_micros() as u64))
    }

    pub fn elapsed_since(self, earlier: Self) -> Duration {
        Duration::from_micros(u64::from(self).saturating_sub(u64::from(earlier)))
    }
}

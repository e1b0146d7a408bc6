//! Conversion between native dates (epoch milliseconds, as the remote API
//! transmits them) and calendar date-times with an explicit UTC offset.
//!
//! The platform reports a single zone offset taken at a reference instant.
//! Applied blindly, that offset is one hour off for instants whose DST state
//! differs from the reference, so the offset is shifted by an hour in that
//! case. The instant itself is never altered, which keeps
//! `to_internal(to_native(t)) == t` exact.

use chrono::{DateTime, FixedOffset, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz};
use derive_more::Display;

const HOUR_SECS: i32 = 3_600;

///
/// NativeDate
/// Milliseconds since the Unix epoch.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{_0}ms")]
pub struct NativeDate(pub i64);

impl NativeDate {
    #[must_use]
    pub const fn millis(self) -> i64 {
        self.0
    }
}

///
/// DateConverter
///

#[derive(Clone, Copy, Debug)]
pub struct DateConverter {
    zone: Tz,
    reference: DateTime<Utc>,
}

impl DateConverter {
    /// Converter for `zone` whose platform offset is sampled now.
    #[must_use]
    pub fn new(zone: Tz) -> Self {
        Self::with_reference(zone, Utc::now())
    }

    /// Converter for `zone` whose platform offset is sampled at `reference`.
    #[must_use]
    pub const fn with_reference(zone: Tz, reference: DateTime<Utc>) -> Self {
        Self { zone, reference }
    }

    #[must_use]
    pub const fn zone(&self) -> Tz {
        self.zone
    }

    /// True when the zone's offset differs between January and July of the
    /// reference year.
    #[must_use]
    pub fn observes_dst(&self) -> bool {
        use chrono::Datelike;

        let year = self.reference.year();
        [1, 7].into_iter().any(|month| {
            Utc.with_ymd_and_hms(year, month, 1, 12, 0, 0)
                .single()
                .is_some_and(|instant| self.in_dst(&instant))
        })
    }

    /// Convert a native date into a calendar date-time.
    /// Returns `None` when the millisecond count is out of range.
    #[must_use]
    pub fn to_internal(&self, native: NativeDate) -> Option<DateTime<FixedOffset>> {
        let instant = DateTime::<Utc>::from_timestamp_millis(native.millis())?;

        let mut offset = self.platform_offset();
        if self.observes_dst() {
            match (self.in_dst(&self.reference), self.in_dst(&instant)) {
                (true, false) => offset -= HOUR_SECS,
                (false, true) => offset += HOUR_SECS,
                _ => {}
            }
        }

        let offset = FixedOffset::east_opt(offset)?;

        Some(instant.with_timezone(&offset))
    }

    /// Convert a calendar date-time into a native date.
    #[must_use]
    pub fn to_native(&self, date: &DateTime<FixedOffset>) -> NativeDate {
        NativeDate(date.timestamp_millis())
    }

    // platform_offset
    // the offset the platform would report, sampled at the reference instant
    fn platform_offset(&self) -> i32 {
        self.zone
            .offset_from_utc_datetime(&self.reference.naive_utc())
            .fix()
            .local_minus_utc()
    }

    fn in_dst(&self, instant: &DateTime<Utc>) -> bool {
        self.zone
            .offset_from_utc_datetime(&instant.naive_utc())
            .dst_offset()
            != TimeDelta::zero()
    }
}

impl Default for DateConverter {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

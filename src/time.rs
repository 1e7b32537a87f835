//! Broadcast time encodings: _Modified Julian Date_ days plus binary-coded-decimal times of day
//! and durations, per _ETSI EN 300 468_, Annex C.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Size of an encoded UTC date-time: 16-bit MJD followed by six BCD digits.
pub const UTC_TIME_SIZE: usize = 5;

/// Reads a byte as two decimal digits, so that `0x23` is `23`.
#[inline]
pub fn bcd(b: u8) -> u32 {
    u32::from(b >> 4) * 10 + u32::from(b & 0x0f)
}

/// Converts a Modified Julian Date to the calendar date it denotes.
///
/// ```rust
/// # use dvbt_demux::time::mjd_to_date;
/// let date = mjd_to_date(0xc079).unwrap();
/// assert_eq!(date.to_string(), "1993-10-13");
/// ```
pub fn mjd_to_date(mjd: u16) -> Option<NaiveDate> {
    let mjd = f64::from(mjd);
    let y = ((mjd - 15_078.2) / 365.25).trunc();
    let m = ((mjd - 14_956.1 - (y * 365.25).trunc()) / 30.6001).trunc();
    let day = mjd - 14_956.0 - (y * 365.25).trunc() - (m * 30.6001).trunc();
    let k = if m == 14.0 || m == 15.0 { 1.0 } else { 0.0 };
    let year = 1900.0 + y + k;
    let month = m - 1.0 - 12.0 * k;
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
}

/// Decodes the 40-bit `UTC_time` field layout: MJD date then `HHMMSS` in BCD.  Returns `None` for
/// the all-ones "undefined" value, or for out-of-range digits.
pub fn utc_time(buf: &[u8]) -> Option<NaiveDateTime> {
    if buf.len() < UTC_TIME_SIZE || buf[..UTC_TIME_SIZE].iter().all(|&b| b == 0xff) {
        return None;
    }
    let mjd = u16::from(buf[0]) << 8 | u16::from(buf[1]);
    let date = mjd_to_date(mjd)?;
    let time = NaiveTime::from_hms_opt(bcd(buf[2]), bcd(buf[3]), bcd(buf[4]))?;
    Some(NaiveDateTime::new(date, time))
}

/// Decodes a 24-bit `HHMMSS` BCD duration.
pub fn bcd_duration(buf: &[u8]) -> Option<Duration> {
    if buf.len() < 3 {
        return None;
    }
    Some(Duration::seconds(
        i64::from(bcd(buf[0])) * 3600 + i64::from(bcd(buf[1])) * 60 + i64::from(bcd(buf[2])),
    ))
}

/// Decodes a 16-bit `HHMM` BCD offset, negated when `negative` is set.
pub fn bcd_offset(buf: &[u8], negative: bool) -> Option<Duration> {
    if buf.len() < 2 {
        return None;
    }
    let minutes = i64::from(bcd(buf[0])) * 60 + i64::from(bcd(buf[1]));
    Some(Duration::minutes(if negative { -minutes } else { minutes }))
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn bcd_digits() {
        assert_eq!(bcd(0x23), 23);
        assert_eq!(bcd(0x59), 59);
        assert_eq!(bcd(0x00), 0);
    }

    #[test]
    fn utc_example() {
        let t = utc_time(&hex!("C079124500")).unwrap();
        assert_eq!(t.to_string(), "1993-10-13 12:45:00");
    }

    #[test]
    fn early_months_roll_into_next_year() {
        // MJD 60310 is 2024-01-01, where the intermediate month value is 14
        let d = mjd_to_date(60310).unwrap();
        assert_eq!(d.to_string(), "2024-01-01");
        let d = mjd_to_date(60340).unwrap();
        assert_eq!(d.to_string(), "2024-01-31");
        let d = mjd_to_date(60369).unwrap();
        assert_eq!(d.to_string(), "2024-02-29");
    }

    #[test]
    fn undefined_time() {
        assert!(utc_time(&hex!("FFFFFFFFFF")).is_none());
        assert!(utc_time(&hex!("C079")).is_none());
        // hour 0x3A is not a valid BCD hour
        assert!(utc_time(&hex!("C0793A0000")).is_none());
    }

    #[test]
    fn durations() {
        assert_eq!(bcd_duration(&hex!("013000")), Some(Duration::minutes(90)));
        assert_eq!(bcd_offset(&hex!("0100"), false), Some(Duration::hours(1)));
        assert_eq!(bcd_offset(&hex!("0130"), true), Some(Duration::minutes(-90)));
        assert_eq!(bcd_offset(&hex!("01"), true), None);
    }

    #[test]
    fn offset_carries_into_next_day() {
        let t = utc_time(&hex!("C079233000")).unwrap();
        let local = t + bcd_offset(&hex!("0200"), false).unwrap();
        assert_eq!(local.to_string(), "1993-10-14 01:30:00");
    }
}

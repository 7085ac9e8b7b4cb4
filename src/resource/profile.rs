//! Profile-file format: whitespace-separated `<date> <value>` lines driving
//! availability, bandwidth, latency, or on/off state of a resource over
//! time, with an optional trailing `LOOPAFTER <period>` to repeat the
//! sequence forever.
//!
//! Parsed with `csv` configured for a space delimiter and `#`-comments,
//! the same trick `rustasim-dcsim` uses for its own whitespace-delimited
//! text formats.

use crate::clock::Time;
use crate::errors::{PlatformError, PlatformResult};
use csv::ReaderBuilder;

/// One `(date, value)` pair. The meaning of `value` is up to the caller:
/// an absolute speed/latency, a `[0, 1]` availability fraction, or a
/// nonzero-is-on boolean.
pub type ProfileEvent = (Time, f64);

/// A parsed profile: events in non-decreasing date order, plus an optional
/// loop period.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    events: Vec<ProfileEvent>,
    loop_after: Option<Time>,
}

impl Profile {
    /// Parses the text profile-file format.
    pub fn parse(text: &str) -> PlatformResult<Profile> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(text.as_bytes());

        let mut events = Vec::new();
        let mut loop_after = None;
        let mut last_date = Time::NEG_INFINITY;

        for result in reader.records() {
            let record = result.map_err(|e| PlatformError::ProfileParse(e.to_string()))?;
            if record.is_empty() || record.iter().all(|f| f.is_empty()) {
                continue;
            }
            if &record[0] == "LOOPAFTER" {
                let period: f64 = record
                    .get(1)
                    .ok_or_else(|| PlatformError::ProfileParse("LOOPAFTER needs a period".into()))?
                    .parse()
                    .map_err(|_| PlatformError::ProfileParse("bad LOOPAFTER period".into()))?;
                loop_after = Some(period);
                continue;
            }
            let date: f64 = record[0]
                .parse()
                .map_err(|_| PlatformError::ProfileParse(format!("bad date '{}'", &record[0])))?;
            let value: f64 = record
                .get(1)
                .ok_or_else(|| PlatformError::ProfileParse("missing value".into()))?
                .parse()
                .map_err(|_| PlatformError::ProfileParse(format!("bad value on line with date {}", date)))?;
            if date < last_date {
                return Err(PlatformError::ProfileParse(
                    "profile dates must be non-decreasing".into(),
                ));
            }
            last_date = date;
            events.push((date, value));
        }

        Ok(Profile { events, loop_after })
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// A fresh cursor positioned before the first event.
    pub fn cursor(&self) -> ProfileCursor {
        ProfileCursor {
            index: 0,
            loop_offset: 0.0,
        }
    }
}

/// Walks a [`Profile`] one event at a time, looping if the profile has a
/// `LOOPAFTER` period. Kept separate from `Profile` so many actors (e.g. a
/// host and its links) can each track their own position independently
/// through a profile they all share by reference.
#[derive(Debug, Clone, Copy)]
pub struct ProfileCursor {
    index: usize,
    loop_offset: Time,
}

impl ProfileCursor {
    /// Returns and consumes the next scheduled event, or `None` if the
    /// profile has no more events (and no loop period to restart from).
    pub fn advance(&mut self, profile: &Profile) -> Option<ProfileEvent> {
        if profile.events.is_empty() {
            return None;
        }
        if self.index >= profile.events.len() {
            match profile.loop_after {
                Some(period) => {
                    self.loop_offset += period;
                    self.index = 0;
                }
                None => return None,
            }
        }
        let (date, value) = profile.events[self.index];
        self.index += 1;
        Some((date + self.loop_offset, value))
    }

    /// Returns the next scheduled event without consuming it.
    pub fn peek(&self, profile: &Profile) -> Option<ProfileEvent> {
        let mut probe = *self;
        probe.advance(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_events() {
        let profile = Profile::parse("0 1.0\n1.5 0.5\n3 0.0\n").unwrap();
        assert_eq!(profile.events.len(), 3);
        assert_eq!(profile.events[1], (1.5, 0.5));
    }

    #[test]
    fn rejects_decreasing_dates() {
        let err = Profile::parse("2 1.0\n1 0.5\n").unwrap_err();
        assert!(matches!(err, PlatformError::ProfileParse(_)));
    }

    #[test]
    fn loopafter_repeats_with_offset() {
        let profile = Profile::parse("0 1.0\n1 0.0\nLOOPAFTER 2\n").unwrap();
        let mut cursor = profile.cursor();
        assert_eq!(cursor.advance(&profile), Some((0.0, 1.0)));
        assert_eq!(cursor.advance(&profile), Some((1.0, 0.0)));
        assert_eq!(cursor.advance(&profile), Some((2.0, 1.0)));
        assert_eq!(cursor.advance(&profile), Some((3.0, 0.0)));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let profile = Profile::parse("# header\n0 1.0\n\n1 0.5\n").unwrap();
        assert_eq!(profile.events.len(), 2);
    }
}

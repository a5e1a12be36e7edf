//! Time window normalization and request validation
//!
//! Telemetry arrives in the store with some delay, so a window that reaches
//! too close to "now" is shifted back behind a settling margin (hysteresis)
//! before it is queried. Windows shorter than the minimum sample window are
//! grown backwards so that at least one sampling bucket is covered.

use crate::config::{QueryConfig, MAX_QUERY_SPAN_SECS};
use crate::error::{Error, ReasonCode, TimeBoundRequestError};
use crate::types::{NodeWindow, TimeBoundNodeRequest, TimeBoundRequest};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Source of "now" for window normalization
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Move the clock to `now`
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Window handling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSettings {
    /// Signed settling margin added to "now"
    pub hysteresis: Duration,
    /// Minimum window length
    pub min_window: Duration,
    /// Smallest accepted `window_len` in seconds
    pub min_window_len_secs: i64,
    /// Largest accepted `window_len` in seconds
    pub max_window_len_secs: i64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            hysteresis: Duration::seconds(-15),
            min_window: Duration::seconds(15),
            min_window_len_secs: 2,
            max_window_len_secs: 3600,
        }
    }
}

impl TryFrom<&QueryConfig> for WindowSettings {
    type Error = Error;

    fn try_from(config: &QueryConfig) -> Result<Self, Self::Error> {
        let seconds = |name: &str, secs: i64| {
            Duration::try_seconds(secs)
                .filter(|_| secs.unsigned_abs() <= MAX_QUERY_SPAN_SECS)
                .ok_or_else(|| {
                    Error::Configuration(format!("{} out of range: {} seconds", name, secs))
                })
        };
        Ok(Self {
            hysteresis: seconds("hysteresis", config.hysteresis_secs)?,
            min_window: seconds("min_window", config.min_window_secs.max(0))?,
            min_window_len_secs: config.min_window_len_secs,
            max_window_len_secs: config.max_window_len_secs,
        })
    }
}

/// Clamp a window against "now" and enforce the minimum length
///
/// 1. If `end` lies past `now + hysteresis`, both ends are shifted back by
///    the overshoot.
/// 2. If the window is then shorter than `min_window`, `start` is moved back
///    to `end - min_window`. `end` is never moved forward.
///
/// Applying this to its own output with the same `now` is a no-op.
pub fn normalize(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    hysteresis: Duration,
    min_window: Duration,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let settled = now + hysteresis;
    let overshoot = end - settled;

    let (mut start, end) = if overshoot > Duration::zero() {
        (start - overshoot, end - overshoot)
    } else {
        (start, end)
    };

    if end - start < min_window {
        start = end - min_window;
    }

    (start, end)
}

/// Normalize a window with the given settings
pub fn normalize_window(
    window: TimeBoundRequest,
    now: DateTime<Utc>,
    settings: &WindowSettings,
) -> TimeBoundRequest {
    let (start, end) = normalize(
        window.start,
        window.end,
        now,
        settings.hysteresis,
        settings.min_window,
    );
    TimeBoundRequest::new(start, end)
}

/// Check that a node request names a window and at least one node
pub fn validate(req: &TimeBoundNodeRequest) -> Result<(), TimeBoundRequestError> {
    if req.start.is_some() && req.end.is_some() && !req.nodes.is_empty() {
        return Ok(());
    }
    Err(TimeBoundRequestError::new(
        ReasonCode::InvalidArguments,
        "Invalid arguments: a start time, an end time and at least one node are required",
    ))
}

/// Turn a caller's node request into a normalized scoped window
///
/// Rejects correlation-id filtering, incomplete requests and inverted
/// windows before any query is issued.
pub fn prepare_node_request(
    req: &TimeBoundNodeRequest,
    now: DateTime<Utc>,
    settings: &WindowSettings,
) -> Result<NodeWindow, TimeBoundRequestError> {
    if req.job_id.is_some() || req.apid.is_some() {
        return Err(TimeBoundRequestError::new(
            ReasonCode::BadOptions,
            "Filtering by job id or apid is not supported",
        ));
    }

    validate(req)?;

    let window = req.window().ok_or_else(|| {
        TimeBoundRequestError::new(ReasonCode::InvalidArguments, "Missing time window")
    })?;
    if window.start > window.end {
        return Err(TimeBoundRequestError::for_window(
            window,
            ReasonCode::InvalidArguments,
            "Inverted time window: start time is after end time",
        ));
    }

    Ok(NodeWindow::new(
        normalize_window(window, now, settings),
        req.nodes.clone(),
    ))
}

/// Resolve a system power sample window
///
/// `window_len` must lie within the configured range and is widened to the
/// minimum window when shorter. With no `start` the window ends at `now`;
/// otherwise it begins at `start`.
pub fn resolve_sample_window(
    start: Option<DateTime<Utc>>,
    window_len_secs: Option<i64>,
    now: DateTime<Utc>,
    settings: &WindowSettings,
) -> Result<(TimeBoundRequest, Duration), TimeBoundRequestError> {
    let interval = match window_len_secs {
        Some(len) => {
            if len < settings.min_window_len_secs || len > settings.max_window_len_secs {
                return Err(TimeBoundRequestError::new(
                    ReasonCode::WindowLenOutOfRange,
                    format!(
                        "window_len {} out of range [{}, {}]",
                        len, settings.min_window_len_secs, settings.max_window_len_secs
                    ),
                ));
            }
            Duration::seconds(len).max(settings.min_window)
        },
        None => settings.min_window,
    };

    let window = match start {
        Some(start) => TimeBoundRequest::new(start, start + interval),
        None => TimeBoundRequest::new(now - interval, now),
    };

    Ok((normalize_window(window, now, settings), interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeLookup;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 1, h, m, s).unwrap()
    }

    fn defaults() -> (Duration, Duration) {
        (Duration::seconds(-15), Duration::seconds(15))
    }

    #[test]
    fn test_normalize_leaves_settled_window() {
        let (h, w) = defaults();
        let (s, e) = normalize(at(13, 0, 0), at(14, 0, 0), at(15, 0, 0), h, w);
        assert_eq!((s, e), (at(13, 0, 0), at(14, 0, 0)));
    }

    #[test]
    fn test_normalize_shifts_back_by_overshoot() {
        let (h, w) = defaults();
        let (s, e) = normalize(at(13, 0, 0), at(14, 0, 0), at(14, 0, 5), h, w);
        assert_eq!((s, e), (at(12, 59, 50), at(13, 59, 50)));
    }

    #[test]
    fn test_normalize_grows_short_window_backwards() {
        let (h, w) = defaults();
        let (s, e) = normalize(at(13, 0, 0), at(13, 0, 5), at(15, 0, 0), h, w);
        assert_eq!((s, e), (at(12, 59, 50), at(13, 0, 5)));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let (h, w) = defaults();
        let now = at(14, 0, 5);
        let cases = [
            (at(13, 0, 0), at(14, 0, 0)),
            (at(14, 0, 0), at(14, 0, 1)),
            (at(14, 10, 0), at(14, 20, 0)),
            (at(12, 0, 0), at(12, 0, 0)),
        ];
        for (start, end) in cases {
            let once = normalize(start, end, now, h, w);
            let twice = normalize(once.0, once.1, now, h, w);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_validate_requires_window_and_nodes() {
        let nodes = vec![NodeLookup::new("x0c0s0b0n0", 0)];
        let ok = TimeBoundNodeRequest::new(at(13, 0, 0), at(14, 0, 0), nodes.clone());
        assert!(validate(&ok).is_ok());

        let no_nodes = TimeBoundNodeRequest::new(at(13, 0, 0), at(14, 0, 0), vec![]);
        assert_eq!(
            validate(&no_nodes).unwrap_err().reason(),
            ReasonCode::InvalidArguments
        );

        let mut no_start = ok.clone();
        no_start.start = None;
        assert_eq!(
            validate(&no_start).unwrap_err().reason(),
            ReasonCode::InvalidArguments
        );
    }

    #[test]
    fn test_prepare_rejects_correlation_ids() {
        let nodes = vec![NodeLookup::new("x0c0s0b0n0", 0)];
        let req = TimeBoundNodeRequest::new(at(13, 0, 0), at(14, 0, 0), nodes).with_job_id("42");
        let err = prepare_node_request(&req, at(15, 0, 0), &WindowSettings::default()).unwrap_err();
        assert_eq!(err.reason(), ReasonCode::BadOptions);
    }

    #[test]
    fn test_prepare_rejects_inverted_window() {
        let nodes = vec![NodeLookup::new("x0c0s0b0n0", 0)];
        let req = TimeBoundNodeRequest::new(at(14, 0, 0), at(13, 0, 0), nodes);
        let err = prepare_node_request(&req, at(15, 0, 0), &WindowSettings::default()).unwrap_err();
        assert_eq!(err.reason(), ReasonCode::InvalidArguments);
        assert!(err.window().is_some());
    }

    #[test]
    fn test_prepare_normalizes() {
        let nodes = vec![NodeLookup::new("x0c0s0b0n0", 0)];
        let req = TimeBoundNodeRequest::new(at(13, 0, 0), at(14, 0, 0), nodes);
        let scoped = prepare_node_request(&req, at(14, 0, 5), &WindowSettings::default()).unwrap();
        assert_eq!(scoped.window, TimeBoundRequest::new(at(12, 59, 50), at(13, 59, 50)));
        assert_eq!(scoped.nodes.len(), 1);
    }

    #[test]
    fn test_sample_window_from_now() {
        let settings = WindowSettings::default();
        let (window, interval) =
            resolve_sample_window(None, Some(60), at(14, 0, 0), &settings).unwrap();
        assert_eq!(interval, Duration::seconds(60));
        // ends at now, then pulled behind the settling margin
        assert_eq!(window, TimeBoundRequest::new(at(13, 58, 45), at(13, 59, 45)));
    }

    #[test]
    fn test_sample_window_from_start() {
        let settings = WindowSettings::default();
        let (window, _) =
            resolve_sample_window(Some(at(10, 0, 0)), Some(120), at(14, 0, 0), &settings).unwrap();
        assert_eq!(window, TimeBoundRequest::new(at(10, 0, 0), at(10, 2, 0)));
    }

    #[test]
    fn test_sample_window_len_bounds() {
        let settings = WindowSettings::default();
        let now = at(14, 0, 0);
        for bad in [0, 1, 3601] {
            let err = resolve_sample_window(None, Some(bad), now, &settings).unwrap_err();
            assert_eq!(err.reason(), ReasonCode::WindowLenOutOfRange);
        }

        let (window, interval) = resolve_sample_window(None, Some(2), now, &settings).unwrap();
        assert_eq!(interval, Duration::seconds(15));
        assert_eq!(window.end - window.start, Duration::seconds(15));

        let (_, interval) = resolve_sample_window(None, None, now, &settings).unwrap();
        assert_eq!(interval, Duration::seconds(15));
    }

    #[test]
    fn test_settings_from_query_config() {
        let config = QueryConfig::default();
        assert_eq!(WindowSettings::try_from(&config).unwrap(), WindowSettings::default());

        let mut config = QueryConfig::default();
        config.hysteresis_secs = i64::MAX;
        assert!(matches!(
            WindowSettings::try_from(&config),
            Err(Error::Configuration(_))
        ));

        let mut config = QueryConfig::default();
        config.min_window_secs = 10_000_000;
        assert!(WindowSettings::try_from(&config).is_err());
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(at(12, 0, 0));
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), at(12, 0, 30));
        clock.set(at(9, 0, 0));
        assert_eq!(clock.now(), at(9, 0, 0));
    }
}

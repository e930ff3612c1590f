//! Engine timing knobs, overridable from `CORRAL_*` environment variables.

use std::time::Duration;

use corral_converge::{ConflictRetry, ConvergenceTarget};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub create_timeout: Duration,
    pub update_timeout: Duration,
    pub delete_timeout: Duration,
    pub poll_delay: Duration,
    pub poll_min: Duration,
    pub poll_max: Duration,
    pub not_found_tolerance: u32,
    pub conflict: ConflictRetry,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            create_timeout: Duration::from_secs(600),
            update_timeout: Duration::from_secs(600),
            delete_timeout: Duration::from_secs(600),
            poll_delay: Duration::from_secs(1),
            poll_min: Duration::from_secs(3),
            poll_max: Duration::from_secs(10),
            not_found_tolerance: 20,
            conflict: ConflictRetry::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{key}={value:?} is not a non-negative integer")]
    NotANumber { key: String, value: String },
    #[error("{key}={value} is out of range (max {max})")]
    OutOfRange { key: String, value: u64, max: u64 },
}

/// Reads integer knobs through `lookup`; unset or blank keys are `None`.
struct Knobs<F>(F);

impl<F: Fn(&str) -> Option<String>> Knobs<F> {
    fn u64(&self, key: &str) -> Result<Option<u64>, SettingsError> {
        let Some(raw) = (self.0)(key).filter(|s| !s.trim().is_empty()) else { return Ok(None) };
        raw.trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| SettingsError::NotANumber { key: key.to_string(), value: raw })
    }

    fn u32(&self, key: &str, def: u32) -> Result<u32, SettingsError> {
        match self.u64(key)? {
            Some(n) => u32::try_from(n).map_err(|_| SettingsError::OutOfRange { key: key.to_string(), value: n, max: u32::MAX.into() }),
            None => Ok(def),
        }
    }

    fn secs(&self, key: &str, def: Duration) -> Result<Duration, SettingsError> {
        Ok(self.u64(key)?.map(Duration::from_secs).unwrap_or(def))
    }

    fn millis(&self, key: &str, def: Duration) -> Result<Duration, SettingsError> {
        Ok(self.u64(key)?.map(Duration::from_millis).unwrap_or(def))
    }
}

impl EngineSettings {
    pub fn from_env() -> Result<Self, SettingsError> { Self::from_lookup(|k| std::env::var(k).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let d = Self::default();
        let k = Knobs(lookup);
        Ok(Self {
            create_timeout: k.secs("CORRAL_CREATE_TIMEOUT_SECS", d.create_timeout)?,
            update_timeout: k.secs("CORRAL_UPDATE_TIMEOUT_SECS", d.update_timeout)?,
            delete_timeout: k.secs("CORRAL_DELETE_TIMEOUT_SECS", d.delete_timeout)?,
            poll_delay: k.millis("CORRAL_POLL_DELAY_MS", d.poll_delay)?,
            poll_min: k.millis("CORRAL_POLL_MIN_MS", d.poll_min)?,
            poll_max: k.millis("CORRAL_POLL_MAX_MS", d.poll_max)?,
            not_found_tolerance: k.u32("CORRAL_NOT_FOUND_TOLERANCE", d.not_found_tolerance)?,
            conflict: ConflictRetry {
                attempts: k.u32("CORRAL_CONFLICT_ATTEMPTS", d.conflict.attempts)?,
                delay: k.millis("CORRAL_CONFLICT_DELAY_MS", d.conflict.delay)?,
            },
        })
    }

    /// A convergence target carrying these poll timings.
    pub fn target(&self, pending: &[&str], target: &[&str], timeout: Duration) -> ConvergenceTarget {
        ConvergenceTarget::new(pending, target, timeout)
            .with_delay(self.poll_delay)
            .with_intervals(self.poll_min, self.poll_max)
            .with_not_found_tolerance(self.not_found_tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_inherit_poll_timings() {
        let s = EngineSettings { poll_delay: Duration::from_millis(10), not_found_tolerance: 2, ..Default::default() };
        let t = s.target(&["configuring"], &["active"], Duration::from_secs(5));
        assert_eq!(t.delay, Duration::from_millis(10));
        assert_eq!(t.min_timeout, Duration::from_secs(3));
        assert_eq!(t.not_found_tolerance, 2);
        assert_eq!(t.timeout, Duration::from_secs(5));
    }

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |k| pairs.iter().find(|(key, _)| *key == k).map(|(_, v)| v.to_string())
    }

    #[test]
    fn overrides_are_read() {
        let s = EngineSettings::from_lookup(lookup(&[
            ("CORRAL_CREATE_TIMEOUT_SECS", "30"),
            ("CORRAL_POLL_MIN_MS", " 250 "),
            ("CORRAL_NOT_FOUND_TOLERANCE", "4"),
            ("CORRAL_CONFLICT_ATTEMPTS", ""),
        ]))
        .unwrap();
        assert_eq!(s.create_timeout, Duration::from_secs(30));
        assert_eq!(s.poll_min, Duration::from_millis(250));
        assert_eq!(s.not_found_tolerance, 4);
        assert_eq!(s.conflict.attempts, EngineSettings::default().conflict.attempts);
    }

    #[test]
    fn counts_beyond_u32_are_rejected() {
        let err = EngineSettings::from_lookup(lookup(&[("CORRAL_NOT_FOUND_TOLERANCE", "4294967296")])).unwrap_err();
        assert!(matches!(err, SettingsError::OutOfRange { value: 4294967296, .. }), "{}", err);
        assert!(err.to_string().contains("CORRAL_NOT_FOUND_TOLERANCE"));
        let err = EngineSettings::from_lookup(lookup(&[("CORRAL_CONFLICT_ATTEMPTS", "-1")])).unwrap_err();
        assert!(matches!(err, SettingsError::NotANumber { .. }), "{}", err);
    }

    #[test]
    fn defaults() {
        let s = EngineSettings::default();
        assert_eq!(s.create_timeout, Duration::from_secs(600));
        assert_eq!(s.conflict.attempts, 3);
        assert_eq!(s.conflict.delay, Duration::from_secs(3));
    }
}

//! Cache configuration.

use tracing::warn;

/// Capacity used when the configured value is missing or unparsable.
pub const DEFAULT_CAPACITY: usize = 10;

/// Largest capacity the cache allocates slots for.
pub const MAX_CAPACITY: usize = 1_000_000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Raw capacity as configured; see [`CacheConfig::resolve_capacity`].
    pub capacity: Option<String>,
    /// Ledger partition owned by this process.
    pub instance_key: String,
    /// Admit store hits into the cache on a lookup miss.
    pub repopulate_on_read: bool,
    /// Clear the ledger partition on graceful shutdown.
    pub clear_ledger_on_shutdown: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_CAPACITY.to_string()),
            instance_key: "instance-1".to_string(),
            repopulate_on_read: false,
            clear_ledger_on_shutdown: false,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            capacity: settings.capacity.clone(),
            instance_key: settings.instance_key.clone(),
            repopulate_on_read: settings.repopulate_on_read,
            clear_ledger_on_shutdown: settings.clear_ledger_on_shutdown,
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(capacity: usize, instance_key: impl Into<String>) -> Self {
        Self {
            capacity: Some(capacity.to_string()),
            instance_key: instance_key.into(),
            ..Default::default()
        }
    }

    /// Parse the configured capacity. Zero disables the cache.
    ///
    /// Missing, invalid or out of range (above [`MAX_CAPACITY`]) values are not
    /// fatal: a warning is logged and [`DEFAULT_CAPACITY`] is used instead.
    pub fn resolve_capacity(&self) -> usize {
        let Some(raw) = self.capacity.as_deref().map(str::trim) else {
            warn!(
                default = DEFAULT_CAPACITY,
                "cache capacity is not configured, using default"
            );
            return DEFAULT_CAPACITY;
        };

        match raw.parse::<usize>() {
            Ok(capacity) if capacity <= MAX_CAPACITY => capacity,
            Ok(capacity) => {
                warn!(
                    value = capacity,
                    max = MAX_CAPACITY,
                    default = DEFAULT_CAPACITY,
                    "cache capacity is too large, using default"
                );
                DEFAULT_CAPACITY
            }
            Err(err) => {
                warn!(
                    value = raw,
                    error = %err,
                    default = DEFAULT_CAPACITY,
                    "invalid cache capacity, using default"
                );
                DEFAULT_CAPACITY
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_raw(raw: Option<&str>) -> CacheConfig {
        CacheConfig {
            capacity: raw.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn parses_configured_capacity() {
        assert_eq!(with_raw(Some("25")).resolve_capacity(), 25);
        assert_eq!(with_raw(Some(" 7 ")).resolve_capacity(), 7);
    }

    #[test]
    fn zero_is_a_valid_capacity() {
        assert_eq!(with_raw(Some("0")).resolve_capacity(), 0);
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(with_raw(None).resolve_capacity(), DEFAULT_CAPACITY);
        assert_eq!(with_raw(Some("")).resolve_capacity(), DEFAULT_CAPACITY);
        assert_eq!(with_raw(Some("ten")).resolve_capacity(), DEFAULT_CAPACITY);
        assert_eq!(with_raw(Some("-3")).resolve_capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn oversized_capacity_falls_back_to_default() {
        let max = MAX_CAPACITY.to_string();
        assert_eq!(with_raw(Some(&max)).resolve_capacity(), MAX_CAPACITY);

        let above = (MAX_CAPACITY + 1).to_string();
        assert_eq!(with_raw(Some(&above)).resolve_capacity(), DEFAULT_CAPACITY);
        assert_eq!(
            with_raw(Some("18446744073709551615")).resolve_capacity(),
            DEFAULT_CAPACITY
        );
        assert_eq!(
            with_raw(Some("99999999999999999999999")).resolve_capacity(),
            DEFAULT_CAPACITY
        );
    }
}

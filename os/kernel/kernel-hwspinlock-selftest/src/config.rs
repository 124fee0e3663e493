use crate::ParamError;
use alloc::string::ToString;

/// Default number of protocol iterations per lock.
pub const DEFAULT_COUNT: u32 = 2;

/// Tunables of a self-test run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SelftestConfig {
    /// How many times the five-step protocol repeats per lock.
    pub count: u32,
}

impl Default for SelftestConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
        }
    }
}

impl SelftestConfig {
    #[must_use]
    pub const fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Parses whitespace separated `key=value` parameters, e.g. `"count=5"`,
    /// on top of the defaults.
    ///
    /// # Errors
    /// See [`apply_params`](Self::apply_params).
    pub fn from_params(params: &str) -> Result<Self, ParamError> {
        Self::default().apply_params(params)
    }

    /// Overrides the settings named in `params`; everything else is kept.
    ///
    /// Unknown keys are ignored with a warning.
    ///
    /// # Errors
    /// [`ParamError`] for an entry without `=` or an unparsable value.
    pub fn apply_params(mut self, params: &str) -> Result<Self, ParamError> {
        for param in params.split_whitespace() {
            let (key, value) = param
                .split_once('=')
                .ok_or_else(|| ParamError::Malformed(param.to_string()))?;
            match key {
                "count" => {
                    self.count = value.parse().map_err(|_| ParamError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    })?;
                }
                _ => log::warn!("ignoring unknown parameter `{key}`"),
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_two_iterations() {
        assert_eq!(SelftestConfig::default().count, 2);
        assert_eq!(SelftestConfig::from_params(""), Ok(SelftestConfig::default()));
    }

    #[test]
    fn parses_count() {
        assert_eq!(SelftestConfig::from_params("count=5").unwrap().count, 5);
        assert_eq!(
            SelftestConfig::from_params("verbose=1  count=7").unwrap().count,
            7
        );
    }

    #[test]
    fn rejects_bad_params() {
        assert_eq!(
            SelftestConfig::from_params("count"),
            Err(ParamError::Malformed("count".to_string()))
        );
        assert_eq!(
            SelftestConfig::from_params("count=-1"),
            Err(ParamError::InvalidValue {
                key: "count".to_string(),
                value: "-1".to_string()
            })
        );
    }

    #[test]
    fn params_override_only_what_they_name() {
        let base = SelftestConfig::default().with_count(9);
        assert_eq!(base.apply_params("verbose=1").unwrap().count, 9);
        assert_eq!(base.apply_params("count=3").unwrap().count, 3);
        assert!(base.apply_params("count=x").is_err());
    }
}

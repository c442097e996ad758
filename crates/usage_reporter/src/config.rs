use std::env;

pub const USAGE_CALLBACK_URL: &str = "USAGE_CALLBACK_URL";
pub const USAGE_CALLBACK_TOKEN: &str = "USAGE_CALLBACK_TOKEN";
pub const USAGE_CALLBACK_QUEUE_CAPACITY: &str = "USAGE_CALLBACK_QUEUE_CAPACITY";
pub const USAGE_CALLBACK_MAX_IN_FLIGHT: &str = "USAGE_CALLBACK_MAX_IN_FLIGHT";

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Upper bounds for the limits above; larger values are clamped.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;
pub const MAX_IN_FLIGHT: usize = 1024;

/// Where usage records go and the bearer credential that unlocks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEndpoint {
    pub url: String,
    pub token: String,
}

/// Reporter settings, resolved once and handed to the reporter at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    pub callback_url: Option<String>,
    pub callback_token: Option<String>,
    pub queue_capacity: usize,
    pub max_in_flight: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            callback_token: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl ReporterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolves the configuration through `lookup`, which maps a variable
    /// name to its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            callback_url: non_empty(USAGE_CALLBACK_URL),
            callback_token: non_empty(USAGE_CALLBACK_TOKEN),
            queue_capacity: parse_limit(
                USAGE_CALLBACK_QUEUE_CAPACITY,
                non_empty(USAGE_CALLBACK_QUEUE_CAPACITY),
                DEFAULT_QUEUE_CAPACITY,
                MAX_QUEUE_CAPACITY,
            ),
            max_in_flight: parse_limit(
                USAGE_CALLBACK_MAX_IN_FLIGHT,
                non_empty(USAGE_CALLBACK_MAX_IN_FLIGHT),
                DEFAULT_MAX_IN_FLIGHT,
                MAX_IN_FLIGHT,
            ),
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>, token: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self.callback_token = Some(token.into());
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.clamp(1, MAX_QUEUE_CAPACITY);
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.clamp(1, MAX_IN_FLIGHT);
        self
    }

    /// The delivery target, present only when both URL and token are set.
    pub fn endpoint(&self) -> Option<CallbackEndpoint> {
        match (&self.callback_url, &self.callback_token) {
            (Some(url), Some(token)) => Some(CallbackEndpoint {
                url: url.clone(),
                token: token.clone(),
            }),
            _ => None,
        }
    }
}

fn parse_limit(name: &str, value: Option<String>, default: usize, max: usize) -> usize {
    let Some(value) = value else {
        return default;
    };

    match value.trim().parse::<usize>() {
        Ok(limit) if limit > max => {
            log::warn!("{} of {} exceeds {}, clamping", name, limit, max);
            max
        }
        Ok(limit) if limit > 0 => limit,
        _ => {
            log::warn!(
                "Invalid value {:?} for {}, falling back to {}",
                value,
                name,
                default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn reads_endpoint_from_lookup() {
        let config = ReporterConfig::from_lookup(lookup(&[
            (USAGE_CALLBACK_URL, "https://billing.example.com/api/litellm/log-usage"),
            (USAGE_CALLBACK_TOKEN, "secret"),
        ]));

        assert_eq!(
            config.endpoint(),
            Some(CallbackEndpoint {
                url: "https://billing.example.com/api/litellm/log-usage".into(),
                token: "secret".into(),
            })
        );
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
    }

    #[test]
    fn endpoint_requires_both_values() {
        let url_only =
            ReporterConfig::from_lookup(lookup(&[(USAGE_CALLBACK_URL, "http://localhost")]));
        assert_eq!(url_only.endpoint(), None);

        let token_only = ReporterConfig::from_lookup(lookup(&[(USAGE_CALLBACK_TOKEN, "secret")]));
        assert_eq!(token_only.endpoint(), None);
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = ReporterConfig::from_lookup(lookup(&[
            (USAGE_CALLBACK_URL, ""),
            (USAGE_CALLBACK_TOKEN, "  "),
        ]));

        assert_eq!(config.callback_url, None);
        assert_eq!(config.callback_token, None);
    }

    #[test]
    fn limits_fall_back_on_bad_values() {
        let config = ReporterConfig::from_lookup(lookup(&[
            (USAGE_CALLBACK_QUEUE_CAPACITY, "lots"),
            (USAGE_CALLBACK_MAX_IN_FLIGHT, "0"),
        ]));
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);

        let config = ReporterConfig::from_lookup(lookup(&[
            (USAGE_CALLBACK_QUEUE_CAPACITY, "8"),
            (USAGE_CALLBACK_MAX_IN_FLIGHT, " 2 "),
        ]));
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.max_in_flight, 2);
    }

    #[test]
    fn oversized_limits_are_clamped() {
        let huge = usize::MAX.to_string();
        let config = ReporterConfig::from_lookup(lookup(&[
            (USAGE_CALLBACK_QUEUE_CAPACITY, huge.as_str()),
            (USAGE_CALLBACK_MAX_IN_FLIGHT, "4294967297"),
        ]));

        assert_eq!(config.queue_capacity, MAX_QUEUE_CAPACITY);
        assert_eq!(config.max_in_flight, MAX_IN_FLIGHT);

        let config = ReporterConfig::default()
            .with_queue_capacity(usize::MAX)
            .with_max_in_flight((1 << 32) + 1);

        assert_eq!(config.queue_capacity, MAX_QUEUE_CAPACITY);
        assert_eq!(config.max_in_flight, MAX_IN_FLIGHT);
    }

    #[test]
    fn builders_keep_limits_positive() {
        let config = ReporterConfig::default()
            .with_queue_capacity(0)
            .with_max_in_flight(0);

        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.max_in_flight, 1);
    }
}

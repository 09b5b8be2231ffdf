use std::{collections::HashMap, time::Duration};

use serde::Deserialize;

use super::{
    with_dial_timeout, with_read_timeout, with_sd, with_tag, with_write_timeout, RequestOption,
};

/// Request option defaults as they appear in a config file.
///
/// ```json
/// {
///     "tags": { "cluster": "east" },
///     "service_discovery": true,
///     "dial_timeout_ms": 500
/// }
/// ```
///
/// Absent fields produce no option, so they leave whatever a later option
/// (or the zero state) decides.
#[derive(Deserialize, Default, Clone, Debug, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOptionsConfig {
    pub tags: HashMap<String, String>,
    pub service_discovery: Option<bool>,
    pub dial_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

impl RequestOptionsConfig {
    pub fn from_json(s: &str) -> crate::Result<Self> {
        serde_json::from_str(s).map_err(Into::into)
    }

    /// Convert into options, tags first and sorted by key.
    pub fn to_options(&self) -> Vec<RequestOption> {
        let mut tags: Vec<_> = self.tags.iter().collect();
        tags.sort_unstable();

        let mut opts: Vec<RequestOption> = tags
            .into_iter()
            .map(|(k, v)| with_tag(k.as_str(), v.as_str()))
            .collect();
        if let Some(sd) = self.service_discovery {
            opts.push(with_sd(sd));
        }
        if let Some(ms) = self.dial_timeout_ms {
            opts.push(with_dial_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.read_timeout_ms {
            opts.push(with_read_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.write_timeout_ms {
            opts.push(with_write_timeout(Duration::from_millis(ms)));
        }
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::PredefinedOptions, Error};

    #[test]
    fn parse_and_apply() {
        let cfg = RequestOptionsConfig::from_json(
            r#"{
                "tags": { "zone": "b", "cluster": "east" },
                "service_discovery": true,
                "dial_timeout_ms": 500,
                "write_timeout_ms": 0
            }"#,
        )
        .unwrap();
        let opts = cfg.to_options();
        assert_eq!(
            opts,
            vec![
                with_tag("cluster", "east"),
                with_tag("zone", "b"),
                with_sd(true),
                with_dial_timeout(Duration::from_millis(500)),
                with_write_timeout(Duration::ZERO),
            ]
        );

        let registry = PredefinedOptions::new();
        registry.set(opts);
        let o = registry.new_request_options(&[with_tag("zone", "c")]);
        assert_eq!(o.tag("cluster"), "east");
        assert_eq!(o.tag("zone"), "c");
        assert!(o.is_sd());
        assert_eq!(o.dial_timeout(), Duration::from_millis(500));
        assert_eq!(o.read_timeout(), Duration::ZERO);
    }

    #[test]
    fn empty_object_gives_no_options() {
        let cfg = RequestOptionsConfig::from_json("{}").unwrap();
        assert_eq!(cfg, RequestOptionsConfig::default());
        assert!(cfg.to_options().is_empty());
    }

    #[test]
    fn unknown_field_rejected() {
        let err = RequestOptionsConfig::from_json(r#"{ "dial_timeout": 1 }"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}

use std::{collections::HashMap, time::Duration};

use smol_str::SmolStr;

/// Per-request configuration.
///
/// Built by [`new_request_options`](super::new_request_options) or
/// [`PredefinedOptions::new_request_options`](super::PredefinedOptions::new_request_options)
/// from a sequence of [`RequestOption`]s. A zero timeout means the request
/// does not set it and the client level value applies.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct RequestOptions {
    tags: HashMap<SmolStr, SmolStr>,
    is_sd: bool,

    dial_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

/// A single deferred mutation of [`RequestOptions`].
///
/// It is the only way to set request level options. Applying it never fails
/// and does no validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RequestOption {
    Tag(SmolStr, SmolStr),
    ServiceDiscovery(bool),
    DialTimeout(Duration),
    ReadTimeout(Duration),
    WriteTimeout(Duration),
}

impl RequestOption {
    #[inline]
    pub fn apply_to(&self, o: &mut RequestOptions) {
        match self {
            Self::Tag(k, v) => {
                o.tags.insert(k.clone(), v.clone());
            }
            Self::ServiceDiscovery(b) => o.is_sd = *b,
            Self::DialTimeout(t) => o.dial_timeout = *t,
            Self::ReadTimeout(t) => o.read_timeout = *t,
            Self::WriteTimeout(t) => o.write_timeout = *t,
        }
    }
}

/// Set tag in [`RequestOptions`].
#[inline]
pub fn with_tag(k: impl Into<SmolStr>, v: impl Into<SmolStr>) -> RequestOption {
    RequestOption::Tag(k.into(), v.into())
}

/// Mark the request as resolved through service discovery.
#[inline]
pub fn with_sd(b: bool) -> RequestOption {
    RequestOption::ServiceDiscovery(b)
}

/// Set dial timeout.
///
/// This is the request level configuration. It has a higher priority than
/// the client level configuration.
#[inline]
pub fn with_dial_timeout(t: Duration) -> RequestOption {
    RequestOption::DialTimeout(t)
}

/// Set read timeout.
///
/// This is the request level configuration. It has a higher priority than
/// the client level configuration.
#[inline]
pub fn with_read_timeout(t: Duration) -> RequestOption {
    RequestOption::ReadTimeout(t)
}

/// Set write timeout.
///
/// This is the request level configuration. It has a higher priority than
/// the client level configuration.
#[inline]
pub fn with_write_timeout(t: Duration) -> RequestOption {
    RequestOption::WriteTimeout(t)
}

impl RequestOptions {
    /// Apply options in order. For the same field or tag key the last one wins.
    pub fn apply<'a, I>(&mut self, opts: I)
    where
        I: IntoIterator<Item = &'a RequestOption>,
    {
        for op in opts {
            op.apply_to(self);
        }
    }

    /// Returns the tag value, or an empty string if the tag is not set.
    #[inline]
    pub fn tag(&self, k: &str) -> &str {
        self.tags.get(k).map(SmolStr::as_str).unwrap_or_default()
    }

    /// Live view of the tag map.
    ///
    /// The borrow keeps `reset` and `copy_to` targets from being mutated
    /// while the view is held; clone it to keep tags beyond that.
    #[inline]
    pub fn tags(&self) -> &HashMap<SmolStr, SmolStr> {
        &self.tags
    }

    #[inline]
    pub fn is_sd(&self) -> bool {
        self.is_sd
    }

    #[inline]
    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    #[inline]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    #[inline]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    #[inline]
    pub fn dial_timeout_or(&self, fallback: Duration) -> Duration {
        or_fallback(self.dial_timeout, fallback)
    }

    #[inline]
    pub fn read_timeout_or(&self, fallback: Duration) -> Duration {
        or_fallback(self.read_timeout, fallback)
    }

    #[inline]
    pub fn write_timeout_or(&self, fallback: Duration) -> Duration {
        or_fallback(self.write_timeout, fallback)
    }

    /// Merge tags into `dst` and overwrite its scalar fields.
    ///
    /// Tags already in `dst` under other keys are kept.
    pub fn copy_to(&self, dst: &mut RequestOptions) {
        dst.tags
            .extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        dst.is_sd = self.is_sd;
        dst.read_timeout = self.read_timeout;
        dst.write_timeout = self.write_timeout;
        dst.dial_timeout = self.dial_timeout;
    }

    /// Back to the zero state. The tag map keeps its allocation.
    pub fn reset(&mut self) {
        self.tags.clear();
        self.is_sd = false;
        self.dial_timeout = Duration::ZERO;
        self.read_timeout = Duration::ZERO;
        self.write_timeout = Duration::ZERO;
    }
}

#[inline]
fn or_fallback(t: Duration, fallback: Duration) -> Duration {
    if t.is_zero() {
        fallback
    } else {
        t
    }
}

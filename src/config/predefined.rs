use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::{RequestOption, RequestOptions};

static GLOBAL: PredefinedOptions = PredefinedOptions::new();

/// Default request options applied before the call site options.
///
/// `set` swaps the whole sequence; readers load an `Arc` snapshot without
/// locking, so a concurrent `set` never tears a build.
#[derive(Debug, Default)]
pub struct PredefinedOptions {
    opts: ArcSwapOption<Vec<RequestOption>>,
}

impl PredefinedOptions {
    #[inline]
    pub const fn new() -> Self {
        Self {
            opts: ArcSwapOption::const_empty(),
        }
    }

    /// Replace the predefined options. Previous ones are discarded, not merged.
    pub fn set<I>(&self, opts: I)
    where
        I: IntoIterator<Item = RequestOption>,
    {
        let opts: Vec<RequestOption> = opts.into_iter().collect();
        #[cfg(feature = "logging")]
        tracing::debug!("predefined request options replaced, {} entries", opts.len());
        self.opts.store(Some(Arc::new(opts)));
    }

    #[inline]
    pub fn snapshot(&self) -> Option<Arc<Vec<RequestOption>>> {
        self.opts.load_full()
    }

    /// Build [`RequestOptions`] from the predefined options followed by `opts`.
    ///
    /// Call site options always override predefined ones.
    pub fn new_request_options(&self, opts: &[RequestOption]) -> RequestOptions {
        let mut options = RequestOptions::default();
        if let Some(predefined) = self.opts.load().as_deref() {
            options.apply(predefined);
        }
        options.apply(opts);
        options
    }
}

/// Pre define some [`RequestOption`]s for the whole process.
///
/// Meant for client initialization, not for per request use.
#[inline]
pub fn set_predefined_opts<I>(opts: I)
where
    I: IntoIterator<Item = RequestOption>,
{
    GLOBAL.set(opts)
}

/// Create [`RequestOptions`] from the process wide predefined options and `opts`.
#[inline]
pub fn new_request_options(opts: &[RequestOption]) -> RequestOptions {
    GLOBAL.new_request_options(opts)
}

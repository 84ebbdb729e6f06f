//! Call-site resolution for the caller column of each line

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, RwLock};

/// Stable identity of a logging call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
    pub module: Option<&'static str>,
}

impl CallSite {
    /// Call site of the nearest caller not marked `#[track_caller]`
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller(), None)
    }

    pub fn from_location(location: &'static Location<'static>, module: Option<&'static str>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
            module,
        }
    }

    pub fn with_module(mut self, module: &'static str) -> Self {
        self.module = Some(module);
        self
    }

    /// Render as `"file:line module()"`, or `"file:line"` without a module
    pub fn render(&self) -> String {
        match self.module {
            Some(module) => format!("{}:{} {}()", self.file, self.line, module),
            None => format!("{}:{}", self.file, self.line),
        }
    }
}

/// Turns a call site into the text written to the log line
pub trait CallerResolver: Send + Sync + 'static {
    fn resolve(&self, site: &CallSite) -> Arc<str>;
}

/// Resolver that renders each call site once and reuses the string afterwards
#[derive(Debug, Default)]
pub struct CachedCallerResolver {
    cache: RwLock<HashMap<CallSite, Arc<str>>>,
}

impl CachedCallerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct call sites seen so far
    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CallerResolver for CachedCallerResolver {
    fn resolve(&self, site: &CallSite) -> Arc<str> {
        if let Ok(cache) = self.cache.read() {
            if let Some(rendered) = cache.get(site) {
                return Arc::clone(rendered);
            }
        }

        let rendered: Arc<str> = Arc::from(site.render());
        if let Ok(mut cache) = self.cache.write() {
            cache.entry(*site).or_insert_with(|| Arc::clone(&rendered));
        }
        rendered
    }
}

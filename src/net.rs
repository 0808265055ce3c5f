use crate::config::Config;
use crate::filter::BannedWords;
use crate::router::{Clock, SystemClock};
use crate::Registry;
use std::sync::Arc;

pub mod output;
pub mod sink;
pub mod tcp;

/// Process-wide state shared by every connection
#[derive(Clone)]
pub struct AppCtx {
    pub registry: Arc<Registry>,
    pub filter: Arc<BannedWords>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

impl AppCtx {
    pub fn new(registry: Arc<Registry>, filter: Arc<BannedWords>, config: Arc<Config>) -> Self {
        Self {
            registry,
            filter,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

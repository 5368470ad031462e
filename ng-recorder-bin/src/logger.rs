use crate::settings::Log;
use anyhow::Context;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{subscriber::set_global_default, Level};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::DynFilterFn,
    fmt::{self},
    layer::SubscriberExt,
    Layer, Registry,
};

/// Process-wide logger. Console output goes to stderr so that stdout only
/// carries decoded points.
pub struct Logger {
    level: Arc<Mutex<Level>>,
    _file_guard: Option<WorkerGuard>,
}

impl Logger {
    pub fn new(level: Level) -> Self {
        Logger {
            level: Arc::new(Mutex::new(level)),
            _file_guard: None,
        }
    }

    #[inline]
    pub fn set_level(&self, new_level: Level) {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = new_level;
    }

    #[inline]
    pub fn level(&self) -> Level {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs the console layer and, when enabled, a daily rolling file layer.
    pub fn initialize(&mut self, log: &Log) -> anyhow::Result<()> {
        let console_filter = {
            let level = Arc::clone(&self.level);
            DynFilterFn::new(move |metadata, _| {
                metadata.level() <= &*level.lock().unwrap_or_else(PoisonError::into_inner)
            })
        };

        let console_layer = {
            #[cfg(debug_assertions)]
            let layer = fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true);

            #[cfg(not(debug_assertions))]
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(false)
                .with_line_number(false);

            layer.with_filter(console_filter)
        };

        let file_layer = if log.file_enabled {
            let file_filter = {
                let level = Arc::clone(&self.level);
                DynFilterFn::new(move |metadata, _| {
                    metadata.level() <= &*level.lock().unwrap_or_else(PoisonError::into_inner)
                })
            };
            let file_appender = rolling::daily(&log.dir, "ng-recorder.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            self._file_guard = Some(guard);
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        } else {
            None
        };

        let subscriber = Registry::default().with(console_layer).with(file_layer);
        set_global_default(subscriber).context("Failed to set logger")?;
        Ok(())
    }
}

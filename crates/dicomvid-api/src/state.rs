//! Application state.

use std::sync::Arc;

use dicomvid_media::{Converter, ToolPaths};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub converter: Arc<Converter>,
}

impl AppState {
    /// Create new application state around resolved tool paths.
    pub fn new(config: ApiConfig, tools: ToolPaths) -> Self {
        let mut converter = Converter::new(tools);
        if let Some(dir) = &config.work_dir {
            converter = converter.with_work_dir(dir);
        }
        if let Some(secs) = config.ffmpeg_timeout_secs {
            converter = converter.with_timeout(secs);
        }

        Self {
            config,
            converter: Arc::new(converter),
        }
    }
}

// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Installs the process-wide logger.

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Environment variable read for the log filter, following `env_logger` syntax.
pub const LOG_ENV: &str = "LUMEN_LOG";

/// Installs `env_logger` as the `log` backend.
///
/// The filter is read from [`LOG_ENV`] and defaults to `info`. The GPU backend's
/// internal crates are clamped to `warn` because they log every resource
/// creation at `info`.
///
/// Calling this more than once is harmless: later calls are ignored.
pub fn init_logging() {
    let result = builder().try_init();
    if result.is_err() {
        log::debug!("Logger already initialised, keeping the existing one.");
    }
}

fn builder() -> Builder {
    let mut builder = Builder::from_env(Env::new().filter_or(LOG_ENV, "info"));
    builder
        .filter_module("wgpu_core", LevelFilter::Warn)
        .filter_module("wgpu_hal", LevelFilter::Warn)
        .format_timestamp_millis();
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        log::info!("logger installed");
    }
}

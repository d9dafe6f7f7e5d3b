// Copyright 2021 Datafuse Labs.
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

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Once;

use lazy_static::lazy_static;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

lazy_static! {
    static ref GLOBAL_UT_LOG_GUARD: Arc<Mutex<Option<Vec<WorkerGuard>>>> =
        Arc::new(Mutex::new(None));
}

/// Write logs to file and rotate by hour.
pub fn init_tracing_with_file(app_name: &str, dir: &str, level: &str) -> Vec<WorkerGuard> {
    let mut guards = vec![];

    let file_appender = RollingFileAppender::new(Rotation::HOURLY, dir, app_name);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    guards.push(file_guard);

    let file_layer = fmt::Layer::default()
        .with_ansi(false)
        .with_writer(file_writer);

    let subscriber = Registry::default()
        .with(EnvFilter::new(level))
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .expect("error setting global tracing subscriber");

    guards
}

/// Initialize unit test tracing once for a process, writing to `./_logs`.
///
/// The worker guards are parked in a process global so that the appender
/// keeps flushing for the whole test run.
pub fn init_default_ut_tracing() {
    static START: Once = Once::new();

    START.call_once(|| {
        let level = std::env::var("UT_LOG_LEVEL").unwrap_or_else(|_| "DEBUG".to_string());
        let guards = init_tracing_with_file("group0_ut", "_logs", &level);

        let mut g = GLOBAL_UT_LOG_GUARD.as_ref().lock().unwrap();
        *g = Some(guards);
    });
}

#[macro_export]
macro_rules! init_group0_ut {
    () => {{
        common_tracing::init_default_ut_tracing();

        let span = common_tracing::tracing::debug_span!("ut", "{}", module_path!());
        ((), span)
    }};
}

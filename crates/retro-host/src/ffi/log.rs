use std::{
    ffi::{CStr, c_char, c_int},
    sync::Once,
};

use rust_libretro_sys::{retro_log_callback, retro_log_level};
use tracing::{debug, error, info, warn};

use crate::config::CoreLogLevel;

use super::{current, guarded};

/// Lines printed by the core that the frontend cannot attribute to a session
/// are filtered at this level.
const DEFAULT_THRESHOLD: CoreLogLevel = CoreLogLevel::Warn;

type LogSink = unsafe extern "C" fn(level: c_int, message: *const c_char);

unsafe extern "C" {
    fn retro_host_log_printf(level: retro_log_level, fmt: *const c_char, ...);
    fn retro_host_log_set_sink(sink: LogSink);
}

static INSTALL_SINK: Once = Once::new();

/// The structure answered to GET_LOG_INTERFACE.
pub(crate) fn log_callback() -> retro_log_callback {
    // SAFETY: the shim only stores the pointer; `log_sink` lives for the whole process.
    INSTALL_SINK.call_once(|| unsafe { retro_host_log_set_sink(log_sink) });
    retro_log_callback {
        log: Some(retro_host_log_printf),
    }
}

unsafe extern "C" fn log_sink(level: c_int, message: *const c_char) {
    if message.is_null() {
        return;
    }
    guarded("log", (), || {
        // SAFETY: the shim passes its NUL-terminated formatting buffer.
        let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
        emit(level, &text);
    })
}

fn emit(raw_level: c_int, text: &str) {
    let level = CoreLogLevel::from_raw(raw_level).unwrap_or(CoreLogLevel::Info);
    let (threshold, core) = match current() {
        Some(ctx) => (ctx.config.core_log_level, ctx.core_name.clone()),
        None => (DEFAULT_THRESHOLD, String::new()),
    };
    if level < threshold {
        return;
    }
    let text = text.trim_end_matches(['\n', '\r']);
    match level {
        CoreLogLevel::Debug => debug!(target: "retro_host::core", core = %core, "{text}"),
        CoreLogLevel::Info => info!(target: "retro_host::core", core = %core, "{text}"),
        CoreLogLevel::Warn => warn!(target: "retro_host::core", core = %core, "{text}"),
        CoreLogLevel::Error => error!(target: "retro_host::core", core = %core, "{text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::EventCounter;

    #[test]
    fn lines_below_the_default_threshold_are_dropped() {
        let counter = EventCounter::default();
        counter.run(|| {
            emit(0, "debug line\n");
            emit(1, "info line\n");
            emit(2, "warn line\n");
            emit(3, "error line\n");
        });
        assert_eq!(counter.count(tracing::Level::WARN), 1);
        assert_eq!(counter.count(tracing::Level::ERROR), 1);
        assert_eq!(counter.count(tracing::Level::INFO), 0);
        assert_eq!(counter.count(tracing::Level::DEBUG), 0);
    }

    #[test]
    fn formatted_lines_reach_the_sink() {
        let counter = EventCounter::default();
        counter.run(|| {
            let callback = log_callback();
            let log = callback.log.expect("log fn");
            // SAFETY: format string and argument match.
            unsafe { log(retro_log_level::RETRO_LOG_ERROR, c"core %d failed\n".as_ptr(), 7 as c_int) };
        });
        assert_eq!(counter.count(tracing::Level::ERROR), 1);
        assert_eq!(counter.messages(), vec!["core 7 failed".to_string()]);
    }
}

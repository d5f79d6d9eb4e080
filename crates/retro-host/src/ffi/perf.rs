//! Perf interface: monotonic clocks, CPU feature bits and core-owned counters.

use std::time::Instant;

use bitflags::bitflags;
use once_cell::sync::Lazy;
use rust_libretro_sys::{retro_perf_callback, retro_perf_counter, retro_perf_tick_t, retro_time_t};
use tracing::debug;

use crate::session::context::PerfCounterPtr;

use super::{guarded, with_context};

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

bitflags! {
    /// `RETRO_SIMD_*` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpuFeatures: u64 {
        const SSE = 1 << 0;
        const SSE2 = 1 << 1;
        const AVX = 1 << 4;
        const NEON = 1 << 5;
        const SSE3 = 1 << 6;
        const SSSE3 = 1 << 7;
        const MMX = 1 << 8;
        const SSE4 = 1 << 10;
        const SSE42 = 1 << 11;
        const AVX2 = 1 << 12;
        const AES = 1 << 15;
        const POPCNT = 1 << 18;
        const ASIMD = 1 << 21;
    }
}

impl CpuFeatures {
    pub fn detect() -> Self {
        #[allow(unused_mut)]
        let mut features = Self::empty();
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            let checks = [
                (std::arch::is_x86_feature_detected!("sse"), Self::SSE),
                (std::arch::is_x86_feature_detected!("sse2"), Self::SSE2),
                (std::arch::is_x86_feature_detected!("sse3"), Self::SSE3),
                (std::arch::is_x86_feature_detected!("ssse3"), Self::SSSE3),
                (std::arch::is_x86_feature_detected!("sse4.1"), Self::SSE4),
                (std::arch::is_x86_feature_detected!("sse4.2"), Self::SSE42),
                (std::arch::is_x86_feature_detected!("avx"), Self::AVX),
                (std::arch::is_x86_feature_detected!("avx2"), Self::AVX2),
                (std::arch::is_x86_feature_detected!("aes"), Self::AES),
                (std::arch::is_x86_feature_detected!("popcnt"), Self::POPCNT),
                (std::arch::is_x86_feature_detected!("mmx"), Self::MMX),
            ];
            for (present, flag) in checks {
                features.set(flag, present);
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            if std::arch::is_aarch64_feature_detected!("neon") {
                features |= Self::NEON | Self::ASIMD;
            }
        }
        features
    }
}

pub(crate) fn perf_callback() -> retro_perf_callback {
    retro_perf_callback {
        get_time_usec: Some(get_time_usec),
        get_cpu_features: Some(get_cpu_features),
        get_perf_counter: Some(get_perf_counter),
        perf_register: Some(perf_register),
        perf_start: Some(perf_start),
        perf_stop: Some(perf_stop),
        perf_log: Some(perf_log),
    }
}

/// Microseconds since the frontend first needed a clock.
pub(crate) fn now_usec() -> i64 {
    EPOCH.elapsed().as_micros() as i64
}

unsafe extern "C" fn get_time_usec() -> retro_time_t {
    guarded("get_time_usec", 0, now_usec)
}

unsafe extern "C" fn get_cpu_features() -> u64 {
    guarded("get_cpu_features", 0, || CpuFeatures::detect().bits())
}

unsafe extern "C" fn get_perf_counter() -> retro_perf_tick_t {
    EPOCH.elapsed().as_nanos() as retro_perf_tick_t
}

unsafe extern "C" fn perf_register(counter: *mut retro_perf_counter) {
    if counter.is_null() {
        return;
    }
    with_context("perf_register", (), |ctx| {
        // SAFETY: the core hands us a counter it owns for as long as it is loaded.
        let registered = unsafe { &mut (*counter).registered };
        if *registered {
            return;
        }
        *registered = true;
        ctx.perf_counters.lock().push(PerfCounterPtr(counter));
    })
}

unsafe extern "C" fn perf_start(counter: *mut retro_perf_counter) {
    if counter.is_null() {
        return;
    }
    // SAFETY: see `perf_register`.
    unsafe {
        (*counter).call_cnt += 1;
        (*counter).start = get_perf_counter();
    }
}

unsafe extern "C" fn perf_stop(counter: *mut retro_perf_counter) {
    if counter.is_null() {
        return;
    }
    // SAFETY: see `perf_register`.
    unsafe {
        let elapsed = get_perf_counter().wrapping_sub((*counter).start);
        (*counter).total = (*counter).total.wrapping_add(elapsed);
    }
}

unsafe extern "C" fn perf_log() {
    with_context("perf_log", (), |ctx| {
        for PerfCounterPtr(counter) in ctx.perf_counters.lock().iter().copied() {
            // SAFETY: registered counters outlive the session's use of them.
            let counter = unsafe { &*counter };
            let ident = if counter.ident.is_null() {
                "<unnamed>".into()
            } else {
                // SAFETY: the identifier is a NUL-terminated string owned by the core.
                unsafe { std::ffi::CStr::from_ptr(counter.ident) }.to_string_lossy()
            };
            debug!(counter = %ident, total = counter.total, calls = counter.call_cnt, "perf counter");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clocks_are_monotonic() {
        // SAFETY: plain clock reads.
        unsafe {
            let a = get_time_usec();
            let t0 = get_perf_counter();
            std::thread::sleep(std::time::Duration::from_millis(2));
            assert!(get_time_usec() >= a + 1000);
            assert!(get_perf_counter() > t0);
        }
    }

    #[test]
    fn start_stop_accumulates_into_the_core_counter() {
        let mut counter = retro_perf_counter {
            ident: c"blit".as_ptr(),
            start: 0,
            total: 0,
            call_cnt: 0,
            registered: false,
        };
        // SAFETY: the counter outlives every call.
        unsafe {
            for _ in 0..3 {
                perf_start(&mut counter);
                std::hint::black_box(0u64);
                perf_stop(&mut counter);
            }
        }
        assert_eq!(counter.call_cnt, 3);
        assert!(counter.total > 0 || counter.start > 0);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn x86_64_always_reports_sse2() {
        assert!(CpuFeatures::detect().contains(CpuFeatures::SSE | CpuFeatures::SSE2));
    }
}

//! Audio route mixing with click-free activation.
//!
//! Each route keeps a position in a linear fade table. While the route is
//! active the position walks toward 0 (full gain); while inactive it walks
//! toward the last entry (silence), one entry per sample. A route at the silent
//! end is skipped entirely.

use crate::route::AudioRoute;
use crate::telemetry::AudioRxEvent;

/// Linear gain ramp from 1.0 (index 0) to 0.0 (last index).
#[derive(Debug, Clone)]
pub struct FadeTable {
    gains: Box<[f32]>,
}

impl FadeTable {
    /// Table with `len` entries (at least 2).
    pub fn new(len: usize) -> Self {
        let len = len.max(2);
        let last = (len - 1) as f32;
        let gains = (0..len).map(|i| 1.0 - i as f32 / last).collect();
        Self { gains }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.gains.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.gains.is_empty()
    }

    /// Index of the silent end.
    #[inline]
    pub fn end(&self) -> usize {
        self.gains.len() - 1
    }

    /// Largest difference between neighbouring entries.
    #[inline]
    pub fn step(&self) -> f32 {
        1.0 / self.end() as f32
    }

    #[inline]
    pub fn gain(&self, pos: usize) -> f32 {
        self.gains[pos.min(self.end())]
    }
}

/// Whether a route contributes audio this cycle.
#[inline]
pub fn is_audible(route: &AudioRoute, active: bool, fade: &FadeTable) -> bool {
    active || route.fade_pos < fade.end()
}

/// Mix `src` into `dest` through the route's gain and fade ramp.
///
/// `dest[i] += src[i] * gain * fade[pos]`, stepping `pos` once per sample.
/// Accumulates the absolute contribution for the level meter. RT-safe.
pub fn mix_route(
    route: &mut AudioRoute,
    active: bool,
    src: &[f32],
    dest: &mut [f32],
    fade: &FadeTable,
) {
    let end = fade.end();
    let mut pos = route.fade_pos.min(end);
    let mut sum = 0.0f32;

    for (d, &s) in dest.iter_mut().zip(src) {
        let v = s * route.gain * fade.gain(pos);
        *d += v;
        sum += v.abs();
        if active {
            pos = pos.saturating_sub(1);
        } else if pos < end {
            pos += 1;
        }
    }

    route.fade_pos = pos;
    route.level_sum += sum;
    route.level_samples += dest.len().min(src.len());
}

/// Count one metered cycle; every `window` cycles return the average level
/// and reset the accumulator.
pub fn meter_cycle(
    route: &mut AudioRoute,
    id: crate::handles::AudioRouteId,
    window: u32,
) -> Option<AudioRxEvent> {
    route.level_cycles += 1;
    if route.level_cycles < window {
        return None;
    }
    let level = if route.level_samples > 0 {
        route.level_sum / route.level_samples as f32
    } else {
        0.0
    };
    route.level_sum = 0.0;
    route.level_samples = 0;
    route.level_cycles = 0;
    route.last_level = level;
    Some(AudioRxEvent { route: id, level })
}

/// Metering for a route that contributed nothing this cycle. Drops the
/// partial window and reports a zero level once if the last report was not
/// silent.
pub fn meter_silence(
    route: &mut AudioRoute,
    id: crate::handles::AudioRouteId,
) -> Option<AudioRxEvent> {
    route.level_sum = 0.0;
    route.level_samples = 0;
    route.level_cycles = 0;
    if route.last_level == 0.0 {
        return None;
    }
    route.last_level = 0.0;
    Some(AudioRxEvent { route: id, level: 0.0 })
}

/// Multiply a bus by its master gain.
#[inline]
pub fn apply_gain(buffer: &mut [f32], gain: f32) {
    if gain != 1.0 {
        for s in buffer {
            *s *= gain;
        }
    }
}

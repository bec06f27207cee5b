//! APA102 LED strip driver (design spec §4.G).
//!
//! Grounded on `original_source`'s `hardware/robotics/led.py` (`Led`,
//! `LedStrip`, the `fill`/`fade`/`slide`/`pulse` effects) for behavior, and
//! `drivers::pump` for the host/hardware split: [`PixelPort`] is the raw
//! frame-buffer sink (a SPI bus on real hardware, an in-memory `Vec<u8>` on
//! host), everything above it is pure Rust.
//!
//! ## Frame format
//!
//! One APA102 frame is a 4-byte start-of-frame marker, one 4-byte entry per
//! pixel (`0b111` + 5-bit brightness, then B, G, R), and `(n + 15) / 16`
//! trailing `0xFF` bytes to finish clocking the last pixel's latch.
//!
//! ## Reverse semantics
//!
//! A colour change has no natural "opposite" the way a move does, so
//! reversing a `Colour`/`Fx` control restores whatever was showing in that
//! scope immediately before it ran. Each scope keeps a small undo stack;
//! [`Robotics::prepare_reverse_list`] already walks the interrupt chain
//! newest-first, so popping the stack lines up exactly with the replay
//! order.

use crate::error::{Error, Result};
use crate::robotics::{Control, ControlKind};
use crate::robotics::control::FxEffect;
use crate::robotics::RoboticsDevice;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Raw frame-buffer sink. Implementors push the encoded APA102 bytes out
/// over whatever bus the strip is wired to (SPI on hardware, a captured
/// buffer on host/test).
pub trait PixelPort: Send {
    fn write_frame(&mut self, frame: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Colour {
    r: u8,
    g: u8,
    b: u8,
    brightness: u8,
}

/// A named, contiguous run of pixels a `SEL strip:segment` control can
/// address independently of the rest of the strip.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    len: usize,
}

const STEP_INTERVAL: Duration = Duration::from_millis(20);

/// An APA102 strip, optionally subdivided into named segments.
pub struct LedStrip {
    pixel: Box<dyn PixelPort>,
    num_pixels: usize,
    pixels: Vec<Colour>,
    segments: HashMap<String, Segment>,
    active_segment: Option<String>,
    /// What each scope is actually showing right now, keyed by segment
    /// name (`""` for the whole strip).
    live: HashMap<String, Colour>,
    /// The baseline a `fade` starts from — only advances on a committed
    /// `Colour` write or at the end of an `Fx` effect.
    committed: HashMap<String, Colour>,
    /// Per-scope undo stack of colours displayed just before the most
    /// recent control ran in that scope.
    history: HashMap<String, Vec<Colour>>,
    powered: bool,
    interrupted: Arc<AtomicBool>,
}

impl LedStrip {
    pub fn new(pixel: Box<dyn PixelPort>, num_pixels: usize) -> Self {
        Self {
            pixel,
            num_pixels,
            pixels: vec![Colour::default(); num_pixels],
            segments: HashMap::new(),
            active_segment: None,
            live: HashMap::new(),
            committed: HashMap::new(),
            history: HashMap::new(),
            powered: false,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_segment(&mut self, name: impl Into<String>, start: usize, len: usize) {
        self.segments.insert(name.into(), Segment { start, len });
    }

    fn scope_key(&self) -> String {
        self.active_segment.clone().unwrap_or_default()
    }

    fn scope_range(&self) -> (usize, usize) {
        match &self.active_segment {
            Some(name) => self
                .segments
                .get(name)
                .map(|s| (s.start, s.start + s.len))
                .unwrap_or((0, self.num_pixels)),
            None => (0, self.num_pixels),
        }
    }

    fn scope_live(&self, key: &str) -> Colour {
        self.live.get(key).copied().unwrap_or_default()
    }

    fn scope_committed(&self, key: &str) -> Colour {
        self.committed.get(key).copied().unwrap_or_default()
    }

    fn push_history(&mut self, key: &str) {
        let current = self.scope_live(key);
        self.history.entry(key.to_string()).or_default().push(current);
    }

    fn pop_history(&mut self, key: &str) -> Colour {
        self.history
            .get_mut(key)
            .and_then(Vec::pop)
            .unwrap_or_default()
    }

    fn write_scope(&mut self, key: &str, colour: Colour) {
        let (start, end) = self.scope_range();
        for px in &mut self.pixels[start..end] {
            *px = colour;
        }
        self.live.insert(key.to_string(), colour);
    }

    fn render(&mut self) {
        let mut frame = Vec::with_capacity(4 + self.pixels.len() * 4 + self.pixels.len() / 16 + 1);
        frame.extend_from_slice(&[0x00; 4]);
        for px in &self.pixels {
            frame.push(0b1110_0000 | (px.brightness & 0x1F));
            frame.push(px.b);
            frame.push(px.g);
            frame.push(px.r);
        }
        let trailing = (self.pixels.len() + 15) / 16;
        frame.extend(std::iter::repeat(0xFF).take(trailing.max(1)));
        self.pixel.write_frame(&frame);
    }

    /// `COL r g b [brightness]`: write the scope immediately. The `!`
    /// modifier marks the new colour as the committed baseline a later
    /// `fade` will start from; without it the write is a preview only.
    fn fill(&mut self, colour: Colour, commit: bool) {
        let key = self.scope_key();
        self.write_scope(&key, colour);
        self.render();
        if commit {
            self.committed.insert(key, colour);
        }
    }

    async fn fade(&mut self, target: Colour, duration_ms: u32) {
        let key = self.scope_key();
        let start = self.scope_committed(&key);
        let steps = (duration_ms / STEP_INTERVAL.as_millis() as u32).max(1);
        let clock = Instant::now();

        for step in 1..=steps {
            if self.interrupted.load(Ordering::Acquire) {
                break;
            }
            let t = f64::from(step) / f64::from(steps);
            let lerp = |a: u8, b: u8| -> u8 { (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8 };
            let colour = Colour {
                r: lerp(start.r, target.r),
                g: lerp(start.g, target.g),
                b: lerp(start.b, target.b),
                brightness: lerp(start.brightness, target.brightness),
            };
            self.write_scope(&key, colour);
            self.render();
            tokio::time::sleep_until(clock + STEP_INTERVAL * step).await;
        }

        let final_colour = self.scope_live(&key);
        self.committed.insert(key, final_colour);
    }

    /// Progressively reveal `target` across the scope, one pixel boundary
    /// at a time, left-to-right (`left_to_right = true`) or the reverse.
    async fn slide(&mut self, target: Colour, duration_ms: u32, left_to_right: bool) {
        let key = self.scope_key();
        let (start, end) = self.scope_range();
        let len = end - start;
        if len == 0 {
            return;
        }
        let steps = len.max(1);
        let step_time = Duration::from_millis(u64::from(duration_ms) / steps as u64).max(Duration::from_millis(1));
        let clock = Instant::now();

        for revealed in 1..=steps {
            if self.interrupted.load(Ordering::Acquire) {
                break;
            }
            for i in 0..len {
                let reveal = if left_to_right { i < revealed } else { len - i <= revealed };
                if reveal {
                    self.pixels[start + i] = target;
                }
            }
            self.render();
            tokio::time::sleep_until(clock + step_time * revealed as u32).await;
        }

        self.live.insert(key.clone(), target);
        self.committed.insert(key, target);
    }

    /// Sweep a feathered "bullet" of `target` across the scope with linear
    /// falloff at its edges, left-to-right or the reverse. The bullet is a
    /// quarter of the scope's length (minimum one pixel).
    async fn pulse(&mut self, target: Colour, duration_ms: u32, left_to_right: bool) {
        let key = self.scope_key();
        let (start, end) = self.scope_range();
        let len = end - start;
        if len == 0 {
            return;
        }
        let width = (len / 4).max(1);
        let steps = len + width;
        let step_time = Duration::from_millis(u64::from(duration_ms) / steps as u64).max(Duration::from_millis(1));
        let base = self.scope_committed(&key);
        let clock = Instant::now();

        for tick in 0..steps {
            if self.interrupted.load(Ordering::Acquire) {
                break;
            }
            let centre = if left_to_right { tick } else { steps - 1 - tick };
            for i in 0..len {
                let dist = (i as isize - centre as isize).unsigned_abs();
                let colour = if dist < width {
                    let falloff = 1.0 - (dist as f64 / width as f64);
                    let lerp = |a: u8, b: u8| -> u8 {
                        (f64::from(a) + (f64::from(b) - f64::from(a)) * falloff).round() as u8
                    };
                    Colour {
                        r: lerp(base.r, target.r),
                        g: lerp(base.g, target.g),
                        b: lerp(base.b, target.b),
                        brightness: lerp(base.brightness, target.brightness),
                    }
                } else {
                    base
                };
                self.pixels[start + i] = colour;
            }
            self.render();
            tokio::time::sleep_until(clock + step_time * (tick as u32 + 1)).await;
        }

        self.write_scope(&key, base);
        self.render();
    }
}

#[async_trait]
impl RoboticsDevice for LedStrip {
    async fn execute(&mut self, ctrl: &Control, reverse: bool) -> Result<()> {
        let key = self.scope_key();

        if reverse {
            let colour = self.pop_history(&key);
            self.write_scope(&key, colour);
            self.render();
            self.committed.insert(key, colour);
            return Ok(());
        }

        match &ctrl.kind {
            ControlKind::Colour(c) => {
                self.push_history(&key);
                self.fill(
                    Colour {
                        r: c.r,
                        g: c.g,
                        b: c.b,
                        brightness: c.brightness,
                    },
                    ctrl.commit(),
                );
            }
            ControlKind::Fx(fx) => {
                self.push_history(&key);
                let target = Colour {
                    r: fx.r,
                    g: fx.g,
                    b: fx.b,
                    brightness: 31,
                };
                self.interrupted.store(false, Ordering::Release);
                match fx.effect {
                    FxEffect::Fade => self.fade(target, fx.duration_ms).await,
                    FxEffect::SweepLeft => self.slide(target, fx.duration_ms, true).await,
                    FxEffect::SweepRight => self.slide(target, fx.duration_ms, false).await,
                    FxEffect::PulseLeft => self.pulse(target, fx.duration_ms, true).await,
                    FxEffect::PulseRight => self.pulse(target, fx.duration_ms, false).await,
                }
            }
            _ => {
                return Err(Error::bad_request(
                    "led strip can only execute COL/FX controls",
                ))
            }
        }

        Ok(())
    }

    fn set_power(&mut self, powered: bool) {
        self.powered = powered;
        if !powered {
            for px in &mut self.pixels {
                *px = Colour::default();
            }
            self.render();
        }
    }

    fn select_component(&mut self, sub: Option<&str>) {
        self.active_segment = sub.map(str::to_string);
    }

    fn interrupted_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct CapturingPixel {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl PixelPort for CapturingPixel {
        fn write_frame(&mut self, frame: &[u8]) {
            self.frames.lock().unwrap().push(frame.to_vec());
        }
    }

    fn strip(n: usize) -> (LedStrip, Arc<Mutex<Vec<Vec<u8>>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let pixel = CapturingPixel {
            frames: frames.clone(),
        };
        (LedStrip::new(Box::new(pixel), n), frames)
    }

    #[tokio::test]
    async fn colour_fill_renders_a_correctly_framed_buffer() {
        let (mut led, frames) = strip(3);
        let ctrl = crate::robotics::control::parse_program("COL 10 20 30 16 !").unwrap();
        led.execute(&ctrl[0], false).await.unwrap();

        let frame = frames.lock().unwrap().last().unwrap().clone();
        assert_eq!(&frame[0..4], &[0, 0, 0, 0]);
        assert_eq!(frame[4], 0b1110_0000 | 16);
        assert_eq!(&frame[5..8], &[30, 20, 10]);
        let trailing_start = 4 + 3 * 4;
        assert_eq!(frame.len() - trailing_start, 1);
        assert!(frame[trailing_start..].iter().all(|&b| b == 0xFF));
    }

    #[tokio::test]
    async fn uncommitted_fill_does_not_move_the_fade_baseline() {
        let (mut led, _frames) = strip(2);
        let committed = crate::robotics::control::parse_program("COL 100 0 0 31 !").unwrap();
        led.execute(&committed[0], false).await.unwrap();

        let preview = crate::robotics::control::parse_program("COL 0 100 0 31").unwrap();
        led.execute(&preview[0], false).await.unwrap();

        assert_eq!(led.scope_committed(""), Colour { r: 100, g: 0, b: 0, brightness: 31 });
    }

    #[tokio::test]
    async fn reverse_restores_the_colour_from_before_the_control() {
        let (mut led, _frames) = strip(2);
        let red = crate::robotics::control::parse_program("COL 255 0 0 31 !").unwrap();
        led.execute(&red[0], false).await.unwrap();

        let blue = crate::robotics::control::parse_program("COL 0 0 255 31 !").unwrap();
        led.execute(&blue[0], false).await.unwrap();
        assert_eq!(led.scope_live(""), Colour { r: 0, g: 0, b: 255, brightness: 31 });

        led.execute(&blue[0], true).await.unwrap();
        assert_eq!(led.scope_live(""), Colour { r: 255, g: 0, b: 0, brightness: 31 });
    }

    #[tokio::test]
    async fn fade_interpolates_toward_the_target_colour() {
        let (mut led, _frames) = strip(4);
        let start = crate::robotics::control::parse_program("COL 0 0 0 31 !").unwrap();
        led.execute(&start[0], false).await.unwrap();

        let fx = crate::robotics::control::parse_program("FX 255 255 255 40 FADE").unwrap();
        led.execute(&fx[0], false).await.unwrap();

        assert_eq!(led.scope_live(""), Colour { r: 255, g: 255, b: 255, brightness: 31 });
    }

    #[tokio::test]
    async fn select_component_scopes_writes_to_the_named_segment() {
        let (mut led, _frames) = strip(6);
        led.register_segment("tail", 3, 3);
        led.select_component(Some("tail"));

        let ctrl = crate::robotics::control::parse_program("COL 9 9 9 31 !").unwrap();
        led.execute(&ctrl[0], false).await.unwrap();

        assert_eq!(led.pixels[0], Colour::default());
        assert_eq!(led.pixels[3], Colour { r: 9, g: 9, b: 9, brightness: 31 });
    }

    #[tokio::test]
    async fn tangible_other_than_colour_or_fx_is_rejected() {
        let (mut led, _frames) = strip(2);
        let ctrl = crate::robotics::control::parse_program("WAIT 10").unwrap();
        let err = led.execute(&ctrl[0], false).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}

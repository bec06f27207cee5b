//! Control-language parser (design spec §4.E, §6 grammar): a small
//! hand-written tokenizer, not a regex — opcodes `SEL/WAIT/MV/COL/FX` (and
//! their aliases), the `INT` and `!` modifiers, case-insensitive, programs
//! delimited by `;`.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectControl {
    device_id: String,
    sub_component: Option<String>,
}

impl SelectControl {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn sub_component(&self) -> Option<&str> {
        self.sub_component.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitControl {
    pub millis: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveControl {
    pub distance_mm: i32,
    pub speed_mm_s: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColourControl {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub brightness: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FxEffect {
    Fade,
    SweepLeft,
    SweepRight,
    PulseLeft,
    PulseRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FxControl {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub duration_ms: u32,
    pub effect: FxEffect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    Select(SelectControl),
    Wait(WaitControl),
    Move(MoveControl),
    Colour(ColourControl),
    Fx(FxControl),
}

/// One parsed control: its opcode payload plus the `INT`/`!` modifiers,
/// which are consumed before positional arguments are parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub kind: ControlKind,
    interruptible: bool,
    commit: bool,
}

impl Control {
    /// Whether this control is part of the rolling interrupt chain. `SEL`
    /// is transparent to the chain — it always allows interrupts through —
    /// without itself being tangible, reversible work.
    pub fn allow_interrupt(&self) -> bool {
        matches!(self.kind, ControlKind::Select(_)) || self.interruptible
    }

    pub fn is_select(&self) -> bool {
        matches!(self.kind, ControlKind::Select(_))
    }

    pub fn is_wait(&self) -> bool {
        matches!(self.kind, ControlKind::Wait(_))
    }

    /// The `!` modifier — for `Colour`, whether to commit (flush) immediately.
    pub fn commit(&self) -> bool {
        self.commit
    }
}

/// Parse a full, semicolon-delimited program into its controls in order.
pub fn parse_program(text: &str) -> Result<Vec<Control>> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_control)
        .collect()
}

fn parse_control(raw: &str) -> Result<Control> {
    let upper = raw.trim().to_uppercase();
    let mut tokens = upper.split_whitespace();
    let opcode = tokens
        .next()
        .ok_or_else(|| Error::malformed(format!("empty control: {raw}")))?;

    let mut interruptible = false;
    let mut commit = false;
    let mut args: Vec<&str> = Vec::new();
    for tok in tokens {
        match tok {
            "INT" => interruptible = true,
            "!" => commit = true,
            other => args.push(other),
        }
    }

    let kind = match opcode {
        "SEL" | "S" | "SELECT" => ControlKind::Select(parse_select(raw, &args)?),
        "WAIT" | "W" => ControlKind::Wait(parse_wait(raw, &args)?),
        "MV" | "M" | "MOVE" => ControlKind::Move(parse_move(raw, &args)?),
        "COL" | "C" | "COLOUR" | "COLOR" => ControlKind::Colour(parse_colour(raw, &args)?),
        "FX" => ControlKind::Fx(parse_fx(raw, &args)?),
        other => return Err(Error::bad_request(format!("unknown control opcode: {other}"))),
    };

    Ok(Control {
        kind,
        interruptible,
        commit,
    })
}

fn parse_select(raw: &str, args: &[&str]) -> Result<SelectControl> {
    if args.len() != 1 {
        return Err(Error::malformed(format!(
            "SEL takes exactly one device id: {raw}"
        )));
    }
    let (device_id, sub_component) = match args[0].split_once(':') {
        Some((d, s)) => (d.to_string(), Some(s.to_string())),
        None => (args[0].to_string(), None),
    };
    Ok(SelectControl {
        device_id,
        sub_component,
    })
}

fn parse_wait(raw: &str, args: &[&str]) -> Result<WaitControl> {
    if args.len() != 1 {
        return Err(Error::malformed(format!(
            "WAIT takes exactly one duration in ms: {raw}"
        )));
    }
    let millis = parse_u32(args[0], raw)?;
    Ok(WaitControl { millis })
}

fn parse_move(raw: &str, args: &[&str]) -> Result<MoveControl> {
    if args.len() != 2 {
        return Err(Error::malformed(format!(
            "MV takes a distance and a speed: {raw}"
        )));
    }
    let distance_mm = parse_i32(args[0], raw)?;
    let speed_mm_s = parse_i32(args[1], raw)?;
    Ok(MoveControl {
        distance_mm,
        speed_mm_s,
    })
}

fn parse_colour(raw: &str, args: &[&str]) -> Result<ColourControl> {
    if args.len() != 3 && args.len() != 4 {
        return Err(Error::malformed(format!(
            "COL takes r g b and an optional brightness: {raw}"
        )));
    }
    let r = parse_u8(args[0], raw)?;
    let g = parse_u8(args[1], raw)?;
    let b = parse_u8(args[2], raw)?;
    let brightness = if args.len() == 4 {
        parse_u8(args[3], raw)?.min(31)
    } else {
        31
    };
    Ok(ColourControl { r, g, b, brightness })
}

fn parse_fx(raw: &str, args: &[&str]) -> Result<FxControl> {
    if args.len() != 5 {
        return Err(Error::malformed(format!(
            "FX takes r g b duration and an effect name: {raw}"
        )));
    }
    let r = parse_u8(args[0], raw)?;
    let g = parse_u8(args[1], raw)?;
    let b = parse_u8(args[2], raw)?;
    let duration_ms = parse_u32(args[3], raw)?;
    let effect = match args[4] {
        "FADE" => FxEffect::Fade,
        "SWEEP_LEFT" => FxEffect::SweepLeft,
        "SWEEP_RIGHT" => FxEffect::SweepRight,
        "PULSE_LEFT" => FxEffect::PulseLeft,
        "PULSE_RIGHT" => FxEffect::PulseRight,
        other => return Err(Error::malformed(format!("unknown FX effect: {other}"))),
    };
    Ok(FxControl {
        r,
        g,
        b,
        duration_ms,
        effect,
    })
}

fn parse_u8(tok: &str, raw: &str) -> Result<u8> {
    tok.parse::<u8>()
        .map_err(|_| Error::malformed(format!("expected a byte (0-255) in: {raw}")))
}

fn parse_u32(tok: &str, raw: &str) -> Result<u32> {
    tok.parse::<u32>()
        .map_err(|_| Error::malformed(format!("expected a non-negative integer in: {raw}")))
}

fn parse_i32(tok: &str, raw: &str) -> Result<i32> {
    tok.parse::<i32>()
        .map_err(|_| Error::malformed(format!("expected an integer in: {raw}")))
}

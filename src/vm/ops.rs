//! The instruction set: a 49-slot dispatch table of handlers over the
//! execution context and the host resources (RNG, key set, output sink).
//!
//! Slot layout: 0-6 stack manipulation, 7-13 arithmetic, 14-20 bitwise,
//! 21-27 comparison/logical, 28-34 control flow, 35-41 I/O (41 unused),
//! 42-48 reflection/meta. In extended mode, opcodes 49 and above resolve
//! as calls through the label table.

use std::collections::HashSet;

use super::{ExecutionContext, RuntimeError, Step};
use crate::navigate::{NavMode, Rel};

/// Work an instruction could not finish on its own; resolved by the
/// interpreter after the handler returns.
pub(crate) enum Effect {
    None,
    AwaitInput(super::InputKind),
    Sleep(u32),
    Import(String),
    EnterChild { child: usize, address: usize },
    MirrorLabel { address: usize },
}

pub(crate) struct Host<'a> {
    pub rng: &'a mut fastrand::Rng,
    pub keys: &'a mut HashSet<String>,
    pub output: &'a mut dyn FnMut(u32, &str),
    pub elapsed_ms: i32,
}

type OpFn = fn(&mut ExecutionContext, &mut Host) -> Result<Effect, RuntimeError>;

#[rustfmt::skip]
const MNEMONICS: [&str; 49] = [
    "POP", "NUM", "STR", "DUP", "SWAP", "ROLL", "LEN",
    "ADD", "SUB", "MUL", "DIV", "MOD", "NEG", "CLAMP",
    "BNOT", "BAND", "BOR", "BXOR", "LSL", "LSR", "ASR",
    "NOT", "AND", "OR", "EQL", "GTR", "EQLSTR", "CLR",
    "NAVM", "BRANCH", "LABEL", "JUMP", "CALL", "IMPORT", "WAIT",
    "NUMIN", "NUMOUT", "STRIN", "STROUT", "KEY", "KEYRES", "???",
    "GET", "SET", "LIT", "BASE", "EXT", "TIME", "NOOP",
];

#[rustfmt::skip]
const TABLE: [Option<OpFn>; 49] = [
    Some(op_pop), Some(op_num), Some(op_str), Some(op_dup), Some(op_swap), Some(op_roll), Some(op_len),
    Some(op_add), Some(op_sub), Some(op_mul), Some(op_div), Some(op_mod), Some(op_neg), Some(op_clamp),
    Some(op_bnot), Some(op_band), Some(op_bor), Some(op_bxor), Some(op_lsl), Some(op_lsr), Some(op_asr),
    Some(op_not), Some(op_and), Some(op_or), Some(op_eql), Some(op_gtr), Some(op_eqlstr), Some(op_clr),
    Some(op_navm), Some(op_branch), Some(op_label), Some(op_jump), Some(op_call), Some(op_import), Some(op_wait),
    Some(op_numin), Some(op_numout), Some(op_strin), Some(op_strout), Some(op_key), Some(op_keyres), None,
    Some(op_get), Some(op_set), Some(op_lit), Some(op_base), Some(op_ext), Some(op_time), Some(op_noop),
];

pub(crate) fn mnemonic(opcode: i32) -> &'static str {
    match usize::try_from(opcode) {
        Ok(i) if i < 49 => MNEMONICS[i],
        _ => "CALL",
    }
}

pub(crate) fn dispatch(
    ctx: &mut ExecutionContext,
    host: &mut Host,
    opcode: i32,
) -> Result<Effect, RuntimeError> {
    if (0..49).contains(&opcode) {
        return match TABLE[opcode as usize] {
            Some(handler) => {
                ctx.stats.record(MNEMONICS[opcode as usize]);
                handler(ctx, host)
            }
            None => Err(RuntimeError::InvalidInstruction { opcode }),
        };
    }
    if ctx.extended && opcode >= 49 {
        // extended opcodes beyond the table are implicit calls by label id
        ctx.stats.record("CALL");
        return resolve_call(ctx, -(opcode - 48));
    }
    Err(RuntimeError::InvalidInstruction { opcode })
}

fn next_half(ctx: &mut ExecutionContext, rng: &mut fastrand::Rng) -> Result<u8, RuntimeError> {
    match ctx.step(rng)? {
        Step::To(addr) => Ok(ctx.board.value(addr).unwrap_or(0)),
        Step::Finished => Err(RuntimeError::UnexpectedEndOfNumber),
    }
}

/// Decode one numeric literal at the instruction pointer. Variable mode
/// reads a marker half naming the digit count; fixed modes read a set
/// number of digit halves. Extended mode doubles every unit. Digits clamp
/// to `base - 1` and combine most-significant-first with wraparound.
pub(crate) fn read_literal(
    ctx: &mut ExecutionContext,
    rng: &mut fastrand::Rng,
) -> Result<i32, RuntimeError> {
    let top = (ctx.base - 1) as u8;
    let digits = if ctx.literal_mode == 0 {
        let marker = next_half(ctx, rng)?.min(top) as u32;
        if ctx.extended { (marker + 1) * 4 - 1 } else { marker * 2 + 1 }
    } else if ctx.extended {
        ctx.literal_mode * 4
    } else {
        ctx.literal_mode * 2
    };
    let mut value: i32 = 0;
    for _ in 0..digits {
        let digit = next_half(ctx, rng)?.min(top);
        value = value.wrapping_mul(ctx.base as i32).wrapping_add(digit as i32);
    }
    Ok(value)
}

/// Pop a zero-terminated string, first character on top.
fn pop_string(ctx: &mut ExecutionContext) -> Result<String, RuntimeError> {
    let mut s = String::new();
    loop {
        let v = ctx.stack.pop()?;
        if v == 0 {
            return Ok(s);
        }
        let c = u32::try_from(v)
            .ok()
            .and_then(char::from_u32)
            .ok_or(RuntimeError::InvalidValue { value: v })?;
        s.push(c);
    }
}

fn resolve_call(ctx: &mut ExecutionContext, id: i32) -> Result<Effect, RuntimeError> {
    let def = *ctx.labels.get(&id).ok_or(RuntimeError::InvalidLabel { id })?;
    if def.origin == ctx.id {
        ctx.pending_call = Some(def.address);
        return Ok(Effect::None);
    }
    match ctx.children.iter().position(|c| c.id == def.origin) {
        Some(child) => Ok(Effect::EnterChild { child, address: def.address }),
        None => Err(RuntimeError::InvalidLabel { id }),
    }
}

fn check_address(ctx: &ExecutionContext, value: i32) -> Result<usize, RuntimeError> {
    let addr = usize::try_from(value).map_err(|_| RuntimeError::Address { address: value as i64 })?;
    if addr >= ctx.board.len() {
        return Err(RuntimeError::Address { address: value as i64 });
    }
    Ok(addr)
}

// ── Stack manipulation ──────────────────────────────────────────────

fn op_pop(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    ctx.stack.pop()?;
    Ok(Effect::None)
}

fn op_num(ctx: &mut ExecutionContext, host: &mut Host) -> Result<Effect, RuntimeError> {
    let value = read_literal(ctx, host.rng)?;
    ctx.stack.push(value)?;
    Ok(Effect::None)
}

fn op_str(ctx: &mut ExecutionContext, host: &mut Host) -> Result<Effect, RuntimeError> {
    let mut chars = Vec::new();
    loop {
        let v = read_literal(ctx, host.rng)?;
        if v == 0 {
            break;
        }
        if chars.len() + 1 > ctx.stack.free() {
            return Err(RuntimeError::FullStack);
        }
        chars.push(v);
    }
    // terminator first, then the characters reversed: first character on top
    ctx.stack.push(0)?;
    for &c in chars.iter().rev() {
        ctx.stack.push(c)?;
    }
    Ok(Effect::None)
}

fn op_dup(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    ctx.stack.dup()?;
    Ok(Effect::None)
}

fn op_swap(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    ctx.stack.swap()?;
    Ok(Effect::None)
}

fn op_roll(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let v = ctx.stack.pop()?;
    ctx.stack.roll(v)?;
    Ok(Effect::None)
}

fn op_len(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let len = ctx.stack.len() as i32;
    ctx.stack.push(len)?;
    Ok(Effect::None)
}

// ── Arithmetic ──────────────────────────────────────────────────────

fn op_add(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push(b.wrapping_add(a))?;
    Ok(Effect::None)
}

fn op_sub(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push(b.wrapping_sub(a))?;
    Ok(Effect::None)
}

fn op_mul(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push(b.wrapping_mul(a))?;
    Ok(Effect::None)
}

fn op_div(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    if a == 0 {
        return Err(RuntimeError::InvalidValue { value: 0 });
    }
    ctx.stack.push(b.wrapping_div(a))?;
    Ok(Effect::None)
}

fn op_mod(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    if a == 0 {
        return Err(RuntimeError::InvalidValue { value: 0 });
    }
    ctx.stack.push(b.wrapping_rem(a))?;
    Ok(Effect::None)
}

fn op_neg(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    ctx.stack.push(a.wrapping_neg())?;
    Ok(Effect::None)
}

fn op_clamp(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let value = ctx.stack.pop()?;
    let max = ctx.stack.pop()?;
    let min = ctx.stack.pop()?;
    if min > max {
        return Err(RuntimeError::InvalidValue { value: min });
    }
    ctx.stack.push(value.clamp(min, max))?;
    Ok(Effect::None)
}

// ── Bitwise ─────────────────────────────────────────────────────────

fn op_bnot(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    ctx.stack.push(!a)?;
    Ok(Effect::None)
}

fn op_band(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push(b & a)?;
    Ok(Effect::None)
}

fn op_bor(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push(b | a)?;
    Ok(Effect::None)
}

fn op_bxor(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push(b ^ a)?;
    Ok(Effect::None)
}

fn op_lsl(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push(b.wrapping_shl(a as u32))?;
    Ok(Effect::None)
}

fn op_lsr(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push((b as u32).wrapping_shr(a as u32) as i32)?;
    Ok(Effect::None)
}

fn op_asr(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push(b.wrapping_shr(a as u32))?;
    Ok(Effect::None)
}

// ── Comparison and logic ────────────────────────────────────────────

fn op_not(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    ctx.stack.push((a == 0) as i32)?;
    Ok(Effect::None)
}

fn op_and(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push((b != 0 && a != 0) as i32)?;
    Ok(Effect::None)
}

fn op_or(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push((b != 0 || a != 0) as i32)?;
    Ok(Effect::None)
}

fn op_eql(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push((b == a) as i32)?;
    Ok(Effect::None)
}

fn op_gtr(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = ctx.stack.pop()?;
    let b = ctx.stack.pop()?;
    ctx.stack.push((b > a) as i32)?;
    Ok(Effect::None)
}

fn op_eqlstr(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let a = pop_string(ctx)?;
    let b = pop_string(ctx)?;
    ctx.stack.push((a == b) as i32)?;
    Ok(Effect::None)
}

fn op_clr(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    ctx.stack.clear();
    Ok(Effect::None)
}

// ── Control flow ────────────────────────────────────────────────────

fn op_navm(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let index = ctx.stack.pop()?;
    ctx.nav_mode = NavMode::from_index(index)?;
    Ok(Effect::None)
}

fn op_branch(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let cond = ctx.stack.pop()?;
    // a one-shot override consumed by the very next navigation decision
    ctx.nav_overrides.push_back(if cond != 0 { Rel::Left } else { Rel::Right });
    Ok(Effect::None)
}

fn op_label(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let value = ctx.stack.pop()?;
    let address = check_address(ctx, value)?;
    let origin = ctx.id;
    ctx.bind_label(address, origin);
    Ok(Effect::MirrorLabel { address })
}

fn op_jump(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let value = ctx.stack.pop()?;
    let address = if value < 0 {
        let def = *ctx.labels.get(&value).ok_or(RuntimeError::InvalidLabel { id: value })?;
        if def.origin != ctx.id {
            return Err(RuntimeError::JumpToExternalLabel { id: value });
        }
        def.address
    } else {
        check_address(ctx, value)?
    };
    ctx.pending_jump = Some(address);
    Ok(Effect::None)
}

fn op_call(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let value = ctx.stack.pop()?;
    if value < 0 {
        return resolve_call(ctx, value);
    }
    let address = check_address(ctx, value)?;
    ctx.pending_call = Some(address);
    Ok(Effect::None)
}

fn op_import(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let filename = pop_string(ctx)?;
    Ok(Effect::Import(filename))
}

fn op_wait(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let ms = ctx.stack.pop()?;
    if ms < 0 {
        return Err(RuntimeError::InvalidValue { value: ms });
    }
    Ok(Effect::Sleep(ms as u32))
}

// ── I/O ─────────────────────────────────────────────────────────────

fn op_numin(_: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    Ok(Effect::AwaitInput(super::InputKind::Num))
}

fn op_numout(ctx: &mut ExecutionContext, host: &mut Host) -> Result<Effect, RuntimeError> {
    let v = ctx.stack.pop()?;
    (host.output)(ctx.id, &v.to_string());
    Ok(Effect::None)
}

fn op_strin(_: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    Ok(Effect::AwaitInput(super::InputKind::Str))
}

fn op_strout(ctx: &mut ExecutionContext, host: &mut Host) -> Result<Effect, RuntimeError> {
    let s = pop_string(ctx)?;
    (host.output)(ctx.id, &s);
    Ok(Effect::None)
}

fn op_key(ctx: &mut ExecutionContext, host: &mut Host) -> Result<Effect, RuntimeError> {
    let token = pop_string(ctx)?;
    ctx.stack.push(host.keys.contains(&token) as i32)?;
    Ok(Effect::None)
}

fn op_keyres(_: &mut ExecutionContext, host: &mut Host) -> Result<Effect, RuntimeError> {
    host.keys.clear();
    Ok(Effect::None)
}

// ── Reflection and meta ─────────────────────────────────────────────

fn op_get(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let value = ctx.stack.pop()?;
    let address = check_address(ctx, value)?;
    let top = ctx.base as i32 - 1;
    let decoded = match (ctx.board.value(address), ctx.board.connection(address)) {
        (Some(a), Some(partner)) => {
            let b = ctx.board.value(partner).unwrap_or(0);
            (a as i32).min(top) * ctx.base as i32 + (b as i32).min(top)
        }
        _ => -1,
    };
    ctx.stack.push(decoded)?;
    Ok(Effect::None)
}

fn op_set(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let value = ctx.stack.pop()?;
    let addr_value = ctx.stack.pop()?;
    let target = check_address(ctx, addr_value)?;
    let limit = (ctx.base * ctx.base) as i32;
    if value != -1 && !(0..limit).contains(&value) {
        return Err(RuntimeError::InvalidValue { value });
    }
    // the other half lies in the pointer's direction of travel
    let dir = ctx.travel_dir().ok_or(RuntimeError::Address { address: target as i64 })?;
    let other = ctx
        .board
        .neighbor(target, dir)
        .ok_or(RuntimeError::Address { address: target as i64 })?;

    // detach whatever the two halves were previously paired with
    for addr in [target, other] {
        if let Some(partner) = ctx.board.connection(addr) {
            if partner != target && partner != other {
                ctx.board.detach(partner);
            }
        }
    }
    if value == -1 {
        ctx.board.detach(target);
        ctx.board.detach(other);
    } else {
        let base = ctx.base as i32;
        ctx.board.write_domino(target, other, (value / base) as u8, (value % base) as u8);
    }
    Ok(Effect::None)
}

fn op_lit(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let mode = ctx.stack.pop()?;
    if !(0..=6).contains(&mode) {
        return Err(RuntimeError::InvalidLiteralParseMode { value: mode });
    }
    ctx.literal_mode = mode as u32;
    Ok(Effect::None)
}

fn op_base(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    let base = ctx.stack.pop()?;
    if !(7..=16).contains(&base) {
        return Err(RuntimeError::InvalidBase { value: base });
    }
    ctx.base = base as u32;
    Ok(Effect::None)
}

fn op_ext(ctx: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    ctx.extended = !ctx.extended;
    Ok(Effect::None)
}

fn op_time(ctx: &mut ExecutionContext, host: &mut Host) -> Result<Effect, RuntimeError> {
    ctx.stack.push(host.elapsed_ms)?;
    Ok(Effect::None)
}

fn op_noop(_: &mut ExecutionContext, _: &mut Host) -> Result<Effect, RuntimeError> {
    Ok(Effect::None)
}

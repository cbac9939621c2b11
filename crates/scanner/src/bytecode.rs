//! Instruction-aligned views over EVM bytecode.
//!
//! This is a linear sweep, not a disassembler: it only knows how wide PUSH
//! immediates are, which is enough to keep pattern matches from landing
//! inside push data.

pub const STOP: u8 = 0x00;
pub const LT: u8 = 0x10;
pub const GT: u8 = 0x11;
pub const SLT: u8 = 0x12;
pub const SGT: u8 = 0x13;
pub const ISZERO: u8 = 0x15;
pub const TIMESTAMP: u8 = 0x42;
pub const RETURNDATASIZE: u8 = 0x3d;
pub const RETURNDATACOPY: u8 = 0x3e;
pub const MLOAD: u8 = 0x51;
pub const SLOAD: u8 = 0x54;
pub const SSTORE: u8 = 0x55;
pub const JUMPI: u8 = 0x57;
pub const JUMPDEST: u8 = 0x5b;
pub const PUSH1: u8 = 0x60;
pub const PUSH4: u8 = 0x63;
pub const PUSH32: u8 = 0x7f;
pub const DUP1: u8 = 0x80;
pub const CALL: u8 = 0xf1;

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub offset: usize,
    pub opcode: u8,
    /// PUSH data; empty for every other opcode. May be shorter than the
    /// opcode implies when the code is truncated.
    pub immediate: &'a [u8],
}

/// Iterate instructions in code order.
pub fn instructions(code: &[u8]) -> impl Iterator<Item = Instruction<'_>> + '_ {
    let mut offset = 0;
    std::iter::from_fn(move || {
        let opcode = *code.get(offset)?;
        let width = if (PUSH1..=PUSH32).contains(&opcode) {
            (opcode - PUSH1 + 1) as usize
        } else {
            0
        };
        let start = offset + 1;
        let end = (start + width).min(code.len());
        let ins = Instruction {
            offset,
            opcode,
            immediate: &code[start..end],
        };
        offset = end;
        Some(ins)
    })
}

/// Offsets of instructions where `pattern` starts.
pub fn find_sequence<'a>(code: &'a [u8], pattern: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    instructions(code)
        .map(|ins| ins.offset)
        .filter(move |&offset| code[offset..].starts_with(pattern))
}

pub fn contains_opcode(code: &[u8], opcode: u8) -> bool {
    instructions(code).any(|ins| ins.opcode == opcode)
}

pub fn count_opcode(code: &[u8], opcode: u8) -> usize {
    instructions(code).filter(|ins| ins.opcode == opcode).count()
}

/// Offset of the first `PUSH4` of `selector`, the way dispatchers and call
/// sites load function selectors.
pub fn find_selector(code: &[u8], selector: [u8; 4]) -> Option<usize> {
    instructions(code)
        .find(|ins| ins.opcode == PUSH4 && ins.immediate == selector)
        .map(|ins| ins.offset)
}

/// Offset of the first `opcode` not followed, within `window` instructions,
/// by one of `any_of`.
pub fn first_unfollowed(code: &[u8], opcode: u8, window: usize, any_of: &[u8]) -> Option<usize> {
    let ins: Vec<Instruction> = instructions(code).collect();
    ins.iter().enumerate().find_map(|(i, current)| {
        let followed = ins[i + 1..]
            .iter()
            .take(window)
            .any(|next| any_of.contains(&next.opcode));
        (current.opcode == opcode && !followed).then_some(current.offset)
    })
}

/// Whether some occurrence of `opcode` is followed, within `window`
/// instructions, by one of `any_of`.
pub fn any_followed_by(code: &[u8], opcode: u8, window: usize, any_of: &[u8]) -> bool {
    let ops: Vec<u8> = instructions(code).map(|ins| ins.opcode).collect();
    ops.iter().enumerate().filter(|(_, &op)| op == opcode).any(|(i, _)| {
        ops[i + 1..]
            .iter()
            .take(window)
            .any(|op| any_of.contains(op))
    })
}

//! Wrap-around delta inference for nibble-width rotary encoders
//!
//! Many surfaces report an encoder as a free-running 4-bit counter
//! (0..=15) rather than a signed delta. Direction has to be inferred from
//! two consecutive readings, taking the wrap of the counter into account.

/// Infer rotation direction from two consecutive 4-bit encoder readings
///
/// Returns `+1` for clockwise, `-1` for counter-clockwise, `0` when the
/// reading did not change. The wrap boundary is handled explicitly:
/// `15 -> 0` is a forward wrap, `0 -> 15` a backward wrap.
///
/// Only the direction is recoverable: a fast turn that advances the
/// counter several steps between reports is indistinguishable from a
/// single step landing on the same side of the range, so the magnitude
/// is always 1.
pub fn wrap_delta(newer: u8, older: u8) -> i8 {
    let newer = newer & 0x0f;
    let older = older & 0x0f;

    if newer == older {
        return 0;
    }
    // Wrap boundary first: 15 -> 0 is forward, 0 -> 15 is backward.
    if newer == 0 && older == 15 {
        return 1;
    }
    if newer == 15 && older == 0 {
        return -1;
    }
    if newer > older { 1 } else { -1 }
}

//! The leaf workload: a populated heap buffer and a floating-point recurrence
//!
//! Both pieces are pure so they can be checked without running the endless
//! loop in [`super::d`].

/// Number of `u64` elements in the leaf buffer
pub const BUFFER_LEN: usize = 10_000;

/// Initial value of `a` in the recurrence
pub const SEED_A: f64 = 1.234;

/// Initial value of `b` in the recurrence
pub const SEED_B: f64 = 5.7865;

/// Allocate a buffer of `len` elements where index `i` holds `i`.
pub fn populate_buffer(len: usize) -> Vec<u64> {
    let mut buffer = Vec::with_capacity(len);
    for i in 0..len {
        buffer.push(i as u64);
    }
    buffer
}

/// State of the `a += b; b *= a` recurrence
///
/// `a` is updated first and the multiply uses the new `a`. Starting from the
/// positive seeds both values grow until they overflow to `+inf`, after which
/// every further step leaves the state unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recurrence {
    pub a: f64,
    pub b: f64,
}

impl Recurrence {
    pub fn new() -> Self {
        Recurrence {
            a: SEED_A,
            b: SEED_B,
        }
    }

    /// Apply one iteration in place
    #[inline(always)]
    pub fn step(&mut self) {
        self.a += self.b;
        self.b *= self.a;
    }

    /// True once both values have overflowed and the state is a fixed point
    pub fn is_saturated(&self) -> bool {
        self.a == f64::INFINITY && self.b == f64::INFINITY
    }
}

impl Default for Recurrence {
    fn default() -> Self {
        Self::new()
    }
}

/// Yields the state after each step. Never ends.
impl Iterator for Recurrence {
    type Item = Recurrence;

    fn next(&mut self) -> Option<Recurrence> {
        self.step();
        Some(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_holds_its_indices() {
        let buffer = populate_buffer(BUFFER_LEN);
        assert_eq!(buffer.len(), BUFFER_LEN);
        for (i, value) in buffer.iter().enumerate() {
            assert_eq!(*value, i as u64);
        }
        assert_eq!(buffer[6464], 6464);
    }

    #[test]
    fn test_empty_buffer() {
        assert!(populate_buffer(0).is_empty());
    }

    #[test]
    fn test_first_iteration() {
        let mut state = Recurrence::new();
        state.step();
        assert!((state.a - 7.0205).abs() < 1e-12, "a = {}", state.a);
        assert!((state.b - 40.62412325).abs() < 1e-9, "b = {}", state.b);
        assert_eq!(state.b, SEED_B * state.a);
    }

    #[test]
    fn test_monotonic_until_overflow() {
        let mut prev = Recurrence::new();
        for next in Recurrence::new().take(64) {
            if next.a.is_finite() && next.b.is_finite() {
                assert!(next.a > prev.a, "a did not grow: {:?} -> {:?}", prev, next);
                assert!(next.b > prev.b, "b did not grow: {:?} -> {:?}", prev, next);
            } else {
                assert!(next.a >= prev.a && next.b >= prev.b);
            }
            prev = next;
        }
    }

    #[test]
    fn test_saturates_to_fixed_point() {
        let mut state = Recurrence::new();
        let mut steps = 0;
        while !state.is_saturated() {
            state.step();
            steps += 1;
            assert!(steps < 64, "recurrence did not overflow: {:?}", state);
        }

        for _ in 0..1000 {
            state.step();
            assert!(state.is_saturated());
            assert!(!state.a.is_nan() && !state.b.is_nan());
        }
    }
}

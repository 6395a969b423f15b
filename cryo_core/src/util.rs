//! Direction helpers shared by sweeps and their tests.

/// `+1.0` when `end` lies above `start`, `-1.0` otherwise.
///
/// Callers reject `start == end` before asking for a direction.
#[inline]
pub fn direction(start: f64, end: f64) -> f64 {
    if end >= start { 1.0 } else { -1.0 }
}

/// True once `value` has reached or moved beyond `target` travelling in `dir`.
#[inline]
pub fn reached(dir: f64, target: f64, value: f64) -> bool {
    dir * (target - value) <= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reached_is_inclusive_in_both_directions() {
        assert!(reached(1.0, 3.0, 3.0));
        assert!(reached(1.0, 3.0, 3.1));
        assert!(!reached(1.0, 3.0, 2.9));
        assert!(reached(-1.0, 1.0, 1.0));
        assert!(reached(-1.0, 1.0, 0.9));
        assert!(!reached(-1.0, 1.0, 1.1));
    }
}

//! Reactor tuning knobs (§10: ambient configuration surface).
//!
//! There is exactly one real tunable in this design -- the GC floor -- so
//! this is a plain `Copy` struct with a `Default` impl, following the
//! teacher's own style for small fixed settings (`DEFAULT_REDUCTIONS`,
//! `DEFAULT_STACK_SIZE` in `actor::process`) rather than a builder.

use super::gc::DEFAULT_GC_FLOOR_BYTES;

#[derive(Debug, Clone, Copy)]
pub struct ReactorConfig {
    /// Floor under `brk / 2` for the byte-growth GC heuristic (§4.4).
    pub gc_floor_bytes: u64,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        ReactorConfig {
            gc_floor_bytes: DEFAULT_GC_FLOOR_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_original_four_mebibyte_floor() {
        assert_eq!(ReactorConfig::default().gc_floor_bytes, 4 * 1024 * 1024);
    }
}

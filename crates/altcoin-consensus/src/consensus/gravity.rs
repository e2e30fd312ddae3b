//! Gravity-well retarget algorithms.
//!
//! Each algorithm walks backward from the previous block over a bounded window,
//! averages the declared targets it sees and scales that average by how fast
//! the window was actually mined. They compute the new target directly rather
//! than adjusting the previous one.
//!
//! Local history may have holes (a node bootstrapped from a checkpoint). When
//! an ancestor is missing the walk stays on the current block and keeps
//! counting, so a hole shortens the effective window instead of failing.

use primitive_types::{U256, U512};
use tracing::{debug, trace, warn};

use crate::blockdata::block::StoredBlock;
use crate::consensus::params::WindowBounds;
use crate::consensus::verification::VerificationError;
use crate::pow::Target;
use crate::store::ChainStore;

/// Blocks above this height measure at least five seconds of elapsed time.
const KGW_MIN_ELAPSED_HEIGHT: u32 = 646_120;

/// Backward cursor over stored blocks.
struct Walk<'s, S: ChainStore + ?Sized> {
    store: &'s S,
    reading: StoredBlock,
    rereads: u64,
}

impl<'s, S: ChainStore + ?Sized> Walk<'s, S> {
    fn new(store: &'s S, start: StoredBlock) -> Self {
        Walk {
            store,
            reading: start,
            rereads: 0,
        }
    }

    /// Moves to the parent of the current block, or stays put if the store
    /// does not have it.
    fn step_back(&mut self) {
        match self.store.get(&self.reading.prev_blockhash()) {
            Some(parent) => {
                trace!(height = parent.height, time = parent.time(), "Walked back");
                self.reading = parent;
            }
            None => self.rereads = self.rereads.saturating_add(1),
        }
    }

    fn finish(&self, algorithm: &str) {
        if self.rereads > 0 {
            warn!(
                algorithm,
                height = self.reading.height,
                missing = %self.reading.prev_blockhash(),
                rereads = self.rereads,
                "Ancestor missing from store, window shortened"
            );
        }
    }
}

fn stored_target(block: &StoredBlock) -> Result<U256, VerificationError> {
    block
        .target()
        .map(|target| target.as_u256())
        .ok_or(VerificationError::InvalidStoredTarget {
            bits: block.bits(),
            height: block.height,
        })
}

/// `average + (value - average) / count`, with the division truncating toward
/// zero.
#[allow(clippy::arithmetic_side_effects, reason = "Operands ordered, count checked")]
fn incremental_average(average: U256, value: U256, count: u64) -> U256 {
    if count == 0 {
        return value;
    }
    let count = U256::from(count);
    if value >= average {
        average + (value - average) / count
    } else {
        average - (average - value) / count
    }
}

/// `(average * count + value) / (count + 1)`, formed in 512 bits.
#[allow(clippy::arithmetic_side_effects, reason = "512-bit intermediate cannot overflow")]
fn weighted_average(average: U256, value: U256, count: u64) -> U256 {
    let total = average.full_mul(U256::from(count)) + U512::from(value);
    let quotient = total / U512::from(count.saturating_add(1));
    U256::try_from(quotient).unwrap_or(U256::MAX)
}

/// Scales `average` by `actual / target` when both are positive.
fn scale(average: U256, actual: i64, target: i64) -> Target {
    let average = Target::new(average);
    match (u64::try_from(actual), u64::try_from(target)) {
        (Ok(actual), Ok(target)) if actual != 0 && target != 0 => {
            average.mul_div(actual, target).unwrap_or(average)
        }
        _ => average,
    }
}

fn too_short(prev: &StoredBlock, window: WindowBounds) -> bool {
    prev.height == 0 || u64::from(prev.height) < window.min
}

/// Kimoto Gravity Well.
///
/// Walks back at most `window.max` blocks. Once `window.min` blocks have been
/// counted, the walk stops as soon as the ratio of expected to actual elapsed
/// time leaves the event horizon `1 + 0.7084 * (mass / 28.2)^-1.228` (or its
/// reciprocal). The result is the average target scaled by actual over
/// expected seconds at the point the walk stopped.
#[allow(
    clippy::arithmetic_side_effects,
    reason = "Counters bounded by the window, times are 32-bit"
)]
pub fn kimoto_gravity_well<S: ChainStore + ?Sized>(
    prev: &StoredBlock,
    store: &S,
    spacing: u32,
    window: WindowBounds,
    max_target: Target,
) -> Result<Target, VerificationError> {
    if too_short(prev, window) {
        debug!(height = prev.height, min = window.min, "KGW: not enough history");
        return Ok(max_target);
    }

    let mut walk = Walk::new(store, *prev);
    let mut mass: u64 = 0;
    let mut average = U256::zero();
    let mut actual_seconds: i64 = 0;
    let mut target_seconds: i64 = 0;
    let mut i: u64 = 1;

    while walk.reading.height > 0 {
        if window.max > 0 && i > window.max {
            break;
        }
        mass += 1;

        let target = stored_target(&walk.reading)?;
        average = if i == 1 {
            target
        } else {
            incremental_average(average, target, i)
        };

        let floor = if walk.reading.height > KGW_MIN_ELAPSED_HEIGHT { 5 } else { 0 };
        actual_seconds = (i64::from(prev.time()) - i64::from(walk.reading.time())).max(floor);
        target_seconds = i64::from(spacing) * i64::try_from(mass).unwrap_or(i64::MAX);

        let ratio = if actual_seconds != 0 && target_seconds != 0 {
            target_seconds as f64 / actual_seconds as f64
        } else {
            1.0
        };
        let horizon = 1.0 + 0.7084 * (mass as f64 / 28.2).powf(-1.228);

        if mass >= window.min && (ratio <= 1.0 / horizon || ratio >= horizon) {
            debug!(mass, ratio, horizon, "KGW: left event horizon");
            break;
        }

        walk.step_back();
        i += 1;
    }
    walk.finish("kgw");

    Ok(scale(average, actual_seconds, target_seconds))
}

/// Dark Gravity Wave, first version.
///
/// The target average covers the first `window.min` blocks. The block time
/// estimate blends 70% of an incremental average over the newest intervals
/// with 30% of the plain average over the whole window, and the implied
/// timespan is clamped to a third or three times the expected one.
#[allow(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Counters bounded by the window; clamped timespans are positive"
)]
pub fn dark_gravity_wave<S: ChainStore + ?Sized>(
    prev: &StoredBlock,
    store: &S,
    spacing: u32,
    window: WindowBounds,
    max_target: Target,
) -> Result<Target, VerificationError> {
    if too_short(prev, window) {
        debug!(height = prev.height, min = window.min, "DGW: not enough history");
        return Ok(max_target);
    }

    let min = i64::try_from(window.min).unwrap_or(i64::MAX);
    let mut walk = Walk::new(store, *prev);
    let mut count_blocks: u64 = 0;
    let mut average = U256::zero();
    let mut time_average: i64 = 0;
    let mut time_count: i64 = 0;
    let mut time_sum: i64 = 0;
    let mut time_sum_count: i64 = 0;
    let mut last_time: i64 = 0;
    let mut i: u64 = 1;

    while walk.reading.height > 0 {
        if window.max > 0 && i > window.max {
            break;
        }
        count_blocks += 1;

        if count_blocks <= window.min {
            let target = stored_target(&walk.reading)?;
            average = if count_blocks == 1 {
                target
            } else {
                incremental_average(average, target, count_blocks)
            };
        }

        let time = i64::from(walk.reading.time());
        if last_time > 0 {
            let diff = last_time - time;
            if time_count <= min {
                time_count += 1;
                time_average = if time_count == 1 {
                    diff
                } else {
                    (diff - time_average) / time_count + time_average
                };
            }
            time_sum_count += 1;
            time_sum += diff;
        }
        last_time = time;

        walk.step_back();
        i += 1;
    }
    walk.finish("dgw");

    if time_count == 0 || time_sum_count == 0 {
        return Ok(Target::new(average));
    }

    let spacing = f64::from(spacing);
    let smart_average =
        (time_average as f64 * 0.7 + (time_sum as f64 / time_sum_count as f64) * 0.3).max(1.0);
    let shift = spacing / smart_average;
    let expected = count_blocks as f64 * spacing;
    let actual = (count_blocks as f64 * spacing / shift)
        .max(expected / 3.0)
        .min(expected * 3.0);

    debug!(count_blocks, smart_average, actual, expected, "DGW: timespan");
    Ok(scale(average, actual as i64, expected as i64))
}

/// Dark Gravity Wave v3.
///
/// Averages `window.min` targets with a running weighted mean and scales by
/// the summed block intervals, clamped to a third or three times the expected
/// timespan.
#[allow(
    clippy::arithmetic_side_effects,
    reason = "Counters bounded by the window, times are 32-bit"
)]
pub fn dark_gravity_wave_v3<S: ChainStore + ?Sized>(
    prev: &StoredBlock,
    store: &S,
    spacing: u32,
    window: WindowBounds,
    max_target: Target,
) -> Result<Target, VerificationError> {
    if too_short(prev, window) {
        debug!(height = prev.height, min = window.min, "DGW3: not enough history");
        return Ok(max_target);
    }

    let mut walk = Walk::new(store, *prev);
    let mut count_blocks: u64 = 0;
    let mut average = U256::zero();
    let mut actual: i64 = 0;
    let mut last_time: i64 = 0;
    let mut i: u64 = 1;

    while walk.reading.height > 0 {
        if window.max > 0 && i > window.max {
            break;
        }
        count_blocks += 1;

        if count_blocks <= window.min {
            let target = stored_target(&walk.reading)?;
            average = if count_blocks == 1 {
                target
            } else {
                weighted_average(average, target, count_blocks)
            };
        }

        let time = i64::from(walk.reading.time());
        if last_time > 0 {
            actual += last_time - time;
        }
        last_time = time;

        walk.step_back();
        i += 1;
    }
    walk.finish("dgw3");

    let expected = i64::try_from(count_blocks).unwrap_or(i64::MAX) * i64::from(spacing);
    let actual = actual.max(expected / 3).min(expected * 3);

    debug!(count_blocks, actual, expected, "DGW3: timespan");
    Ok(scale(average, actual, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::params::DARKCOIN_SCHEDULE;
    use crate::pow::CompactTarget;
    use crate::store::MemoryChainStore;
    use crate::test_util::ChainBuilder;

    const BITS: u32 = 0x1c00ffff;
    const START_TIME: u32 = 1_400_000_000;

    fn max_target() -> Target {
        Target::from_compact(CompactTarget::new(0x1e0fffff)).unwrap()
    }

    fn bits_target() -> Target {
        Target::from_compact(CompactTarget::new(BITS)).unwrap()
    }

    /// A chain of `len` blocks ending at `tip_height`.
    fn chain(tip_height: u32, len: u32, spacing: u32) -> ChainBuilder {
        let mut builder = ChainBuilder::start(tip_height + 1 - len, START_TIME, BITS);
        builder.extend(len - 1, spacing, BITS);
        builder
    }

    #[test]
    fn test_incremental_average_truncates_toward_zero() {
        let avg = |a: u64, v: u64, n: u64| incremental_average(U256::from(a), U256::from(v), n);
        assert_eq!(avg(10, 4, 2), U256::from(7));
        assert_eq!(avg(4, 10, 2), U256::from(7));
        // 10 + (5 - 10) / 4 = 10 - 1
        assert_eq!(avg(10, 5, 4), U256::from(9));
        assert_eq!(avg(10, 10, 3), U256::from(10));
    }

    #[test]
    fn test_weighted_average() {
        // (6 * 2 + 9) / 3
        assert_eq!(
            weighted_average(U256::from(6), U256::from(9), 2),
            U256::from(7)
        );
        assert_eq!(weighted_average(U256::MAX, U256::MAX, 5), U256::MAX);
    }

    #[test]
    fn test_kgw_insufficient_history() {
        let builder = chain(10, 11, 150);
        let window = DARKCOIN_SCHEDULE.kgw_window;
        let result =
            kimoto_gravity_well(&builder.tip(), builder.store(), 150, window, max_target()).unwrap();
        assert_eq!(result, max_target());

        let genesis = ChainBuilder::start(0, START_TIME, BITS);
        let result =
            kimoto_gravity_well(&genesis.tip(), genesis.store(), 150, window, max_target()).unwrap();
        assert_eq!(result, max_target());
    }

    #[test]
    fn test_kgw_fast_blocks_exit_at_minimum_mass() {
        // One-second blocks leave the event horizon as soon as 14 blocks are
        // counted: 13 seconds elapsed against 14 * 150 expected.
        let builder = chain(20_000, 100, 1);
        let result = kimoto_gravity_well(
            &builder.tip(),
            builder.store(),
            150,
            DARKCOIN_SCHEDULE.kgw_window,
            max_target(),
        )
        .unwrap();
        assert_eq!(result, bits_target().mul_div(13, 2100).unwrap());
    }

    #[test]
    fn test_kgw_window_cap() {
        // Steady blocks never leave the horizon; the walk stops at the cap
        // with 29 intervals measured against 30 expected.
        let builder = chain(20_000, 60, 150);
        let window = WindowBounds { min: 14, max: 30 };
        let result =
            kimoto_gravity_well(&builder.tip(), builder.store(), 150, window, max_target()).unwrap();
        assert_eq!(result, bits_target().mul_div(29 * 150, 30 * 150).unwrap());
    }

    #[test]
    fn test_kgw_gap_rereads_current_block() {
        let builder = chain(20_000, 60, 150);
        let store: MemoryChainStore = std::iter::once(builder.tip()).collect();
        let window = WindowBounds { min: 14, max: 100 };
        let result = kimoto_gravity_well(&builder.tip(), &store, 150, window, max_target()).unwrap();
        // No elapsed time is ever measured, so the average is returned as is
        assert_eq!(result, bits_target());
    }

    #[test]
    fn test_dgw_insufficient_history() {
        let builder = chain(13, 14, 150);
        let result = dark_gravity_wave(
            &builder.tip(),
            builder.store(),
            150,
            DARKCOIN_SCHEDULE.dgw_window,
            max_target(),
        )
        .unwrap();
        assert_eq!(result, max_target());
    }

    #[test]
    fn test_dgw_fast_blocks_clamped_to_third() {
        let builder = chain(40_000, 200, 1);
        let result = dark_gravity_wave(
            &builder.tip(),
            builder.store(),
            150,
            DARKCOIN_SCHEDULE.dgw_window,
            max_target(),
        )
        .unwrap();
        assert_eq!(result, bits_target().mul_div(7_000, 21_000).unwrap());
    }

    #[test]
    fn test_dgw_slow_blocks_clamped_to_triple() {
        let builder = chain(40_000, 200, 1_000);
        let result = dark_gravity_wave(
            &builder.tip(),
            builder.store(),
            150,
            DARKCOIN_SCHEDULE.dgw_window,
            max_target(),
        )
        .unwrap();
        assert_eq!(result, bits_target().mul_div(63_000, 21_000).unwrap());
    }

    #[test]
    fn test_dgw3_steady_chain() {
        let builder = chain(70_000, 40, 150);
        let result = dark_gravity_wave_v3(
            &builder.tip(),
            builder.store(),
            150,
            DARKCOIN_SCHEDULE.dgw3_window,
            max_target(),
        )
        .unwrap();
        // 24 blocks read, 23 intervals measured
        assert_eq!(result, bits_target().mul_div(3_450, 3_600).unwrap());
    }

    #[test]
    fn test_dgw3_gap_clamps_to_third() {
        let builder = chain(70_000, 40, 150);
        let store: MemoryChainStore = std::iter::once(builder.tip()).collect();
        let result = dark_gravity_wave_v3(
            &builder.tip(),
            &store,
            150,
            DARKCOIN_SCHEDULE.dgw3_window,
            max_target(),
        )
        .unwrap();
        assert_eq!(result, bits_target().mul_div(1_200, 3_600).unwrap());
    }

    #[test]
    fn test_dgw3_insufficient_history() {
        let builder = chain(23, 24, 150);
        let result = dark_gravity_wave_v3(
            &builder.tip(),
            builder.store(),
            150,
            DARKCOIN_SCHEDULE.dgw3_window,
            max_target(),
        )
        .unwrap();
        assert_eq!(result, max_target());
    }

    #[test]
    fn test_undecodable_stored_target() {
        let mut builder = chain(70_000, 40, 150);
        let tip = builder.push(150, 0x04923456);
        let err = dark_gravity_wave_v3(
            &tip,
            builder.store(),
            150,
            DARKCOIN_SCHEDULE.dgw3_window,
            max_target(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            VerificationError::InvalidStoredTarget {
                bits: CompactTarget::new(0x04923456),
                height: 70_001,
            }
        );
    }
}

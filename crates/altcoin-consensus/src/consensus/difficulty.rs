//! Difficulty verification.
//!
//! [`DifficultyEngine::check_difficulty`] decides whether a candidate header
//! declares the difficulty its chain requires after a given stored block. The
//! engine is stateless apart from the chain parameters it borrows; history is
//! read through a [`ChainStore`].

use tracing::debug;

use crate::blockdata::block::{BlockHeader, StoredBlock};
use crate::consensus::gravity::{dark_gravity_wave, dark_gravity_wave_v3, kimoto_gravity_well};
use crate::consensus::params::{GravityWellPhase, MinDifficultyRule, RetargetStrategy};
use crate::consensus::registry::ChainParams;
use crate::consensus::verification::VerificationError;
use crate::pow::{CompactTarget, Target};
use crate::store::ChainStore;

/// Retarget rules of one chain.
#[derive(Debug, Clone, Copy)]
pub struct DifficultyEngine<'a> {
    chain: &'a ChainParams,
}

impl<'a> DifficultyEngine<'a> {
    pub fn new(chain: &'a ChainParams) -> Self {
        DifficultyEngine { chain }
    }

    /// Checks the difficulty `next` declares on top of `prev`.
    ///
    /// Blocks between retarget points must repeat the previous block's bits,
    /// unless the chain's testnet rule applies. At a retarget point the new
    /// target is computed, clamped to the chain's maximum, reduced to the
    /// precision of the declared bits and compared.
    ///
    /// # Errors
    ///
    /// * `VerificationError::UnexpectedDifficultyChange` - Bits changed off a
    ///   retarget point
    /// * `VerificationError::DifficultyMismatch` - The declared bits differ
    ///   from the computed ones
    /// * `VerificationError::TestnetTransition` - A testnet block after a short
    ///   gap does not keep the last real difficulty
    /// * `VerificationError::MissingAncestor` - History needed for the check
    ///   is not in `store`
    pub fn check_difficulty<S: ChainStore + ?Sized>(
        &self,
        prev: &StoredBlock,
        next: &BlockHeader,
        store: &S,
    ) -> Result<(), VerificationError> {
        let params = self.chain.params();
        let height = prev.height.saturating_add(1);
        let declared = CompactTarget::from(next.bits);

        if !params.should_retarget(prev.height) {
            if let Some(rule) = params.min_difficulty {
                if next.time > rule.after_time {
                    return self.check_min_difficulty_transition(prev, next, rule, store);
                }
            }
            if declared != prev.bits() {
                return Err(VerificationError::UnexpectedDifficultyChange {
                    height,
                    declared,
                    expected: prev.bits(),
                });
            }
            return Ok(());
        }

        let computed = self.required_target(prev, store)?;
        self.compare(height, computed, declared)
    }

    /// The target a retarget block following `prev` must declare, before
    /// precision reduction.
    pub fn required_target<S: ChainStore + ?Sized>(
        &self,
        prev: &StoredBlock,
        store: &S,
    ) -> Result<Target, VerificationError> {
        let params = self.chain.params();
        let max_target = self.chain.max_target();
        let height = prev.height.saturating_add(1);

        let target = match params.retarget {
            RetargetStrategy::Fixed | RetargetStrategy::Variable { .. } => {
                self.ratio_retarget(prev, store)?
            }
            RetargetStrategy::GravityWell(schedule) => {
                let phase = schedule.phase(height);
                debug!(chain = %params.chain, height, ?phase, "Gravity well phase");
                let spacing = params.target_spacing;
                match phase {
                    GravityWellPhase::Ratio => self.ratio_retarget(prev, store)?,
                    GravityWellPhase::KimotoGravityWell => {
                        kimoto_gravity_well(prev, store, spacing, schedule.kgw_window, max_target)?
                    }
                    GravityWellPhase::DarkGravityWave => {
                        dark_gravity_wave(prev, store, spacing, schedule.dgw_window, max_target)?
                    }
                    GravityWellPhase::DarkGravityWave3 => dark_gravity_wave_v3(
                        prev,
                        store,
                        spacing,
                        schedule.dgw3_window,
                        max_target,
                    )?,
                }
            }
        };

        if target > max_target {
            debug!(height, "Difficulty hit proof of work limit");
            return Ok(max_target);
        }
        Ok(target)
    }

    /// Measures the clamped timespan of the interval ending at `prev`.
    ///
    /// Walks `retarget_blockspan` ancestors back; every one of them must be
    /// stored.
    pub fn timespan<S: ChainStore + ?Sized>(
        &self,
        prev: &StoredBlock,
        store: &S,
    ) -> Result<i64, VerificationError> {
        let params = self.chain.params();
        let blockspan = params.retarget_blockspan(prev.height);

        let mut cursor = *prev;
        for _ in 0..blockspan {
            cursor = parent(store, &cursor)?;
        }

        let measured = i64::from(prev.time()).saturating_sub(i64::from(cursor.time()));
        let target = i64::from(params.target_timespan_at(prev.height));
        let timespan = params.timespan_clamp(prev.height).apply(measured, target);

        debug!(
            chain = %params.chain,
            height = prev.height.saturating_add(1),
            blockspan,
            measured,
            timespan,
            target,
            "Retarget timespan"
        );
        Ok(timespan)
    }

    /// `old_target * timespan / target_timespan`.
    fn ratio_retarget<S: ChainStore + ?Sized>(
        &self,
        prev: &StoredBlock,
        store: &S,
    ) -> Result<Target, VerificationError> {
        let timespan = self.timespan(prev, store)?;
        let old_target = stored_target(prev)?;
        let target_timespan = self.chain.params().target_timespan_at(prev.height);

        // Clamped timespans are positive
        let timespan = u64::try_from(timespan).unwrap_or(0);
        Ok(old_target
            .mul_div(timespan, u64::from(target_timespan))
            .unwrap_or(old_target))
    }

    /// Testnet relaxation for non-retarget blocks.
    ///
    /// After a gap of more than twice the target spacing any difficulty is
    /// accepted. A negative gap is accepted too, matching an unsigned
    /// underflow in Bitcoin Core. Otherwise the block must declare
    /// the target of the last block that was not mined at minimum difficulty.
    fn check_min_difficulty_transition<S: ChainStore + ?Sized>(
        &self,
        prev: &StoredBlock,
        next: &BlockHeader,
        rule: MinDifficultyRule,
        store: &S,
    ) -> Result<(), VerificationError> {
        let params = self.chain.params();
        let height = prev.height.saturating_add(1);
        let delta = i64::from(next.time).saturating_sub(i64::from(prev.time()));
        let window = i64::from(params.target_spacing).saturating_mul(2);

        if !(0..=window).contains(&delta) {
            debug!(height, delta, after = rule.after_time, "Testnet gap, any difficulty allowed");
            return Ok(());
        }

        let interval = params.interval_at(prev.height);
        let genesis = self.chain.genesis().header;
        let max_target = self.chain.max_target();

        let mut cursor = *prev;
        while cursor.header != genesis
            && cursor.height.checked_rem(interval) != Some(0)
            && stored_target(&cursor)? == max_target
        {
            cursor = parent(store, &cursor)?;
        }

        let declared = CompactTarget::from(next.bits);
        let declared_target =
            Target::from_compact(declared).ok_or(VerificationError::BadTarget(declared))?;
        if stored_target(&cursor)? != declared_target {
            return Err(VerificationError::TestnetTransition {
                height,
                expected: cursor.bits(),
                declared,
            });
        }
        Ok(())
    }

    /// Compares a computed target with the declared bits at the declared
    /// precision.
    fn compare(
        &self,
        height: u32,
        computed: Target,
        declared: CompactTarget,
    ) -> Result<(), VerificationError> {
        let computed = computed.mask_to_precision_of(declared).to_compact();
        let mismatch = VerificationError::DifficultyMismatch {
            height,
            computed,
            declared,
        };

        match self.chain.params().tolerance_at(height) {
            Some(tolerance) => {
                let expected = computed.to_difficulty();
                let actual = declared.to_difficulty();
                if (expected - actual).abs() > expected * tolerance {
                    return Err(mismatch);
                }
            }
            None if computed != declared => return Err(mismatch),
            None => {}
        }

        debug!(height, bits = %declared, "Difficulty accepted");
        Ok(())
    }
}

fn parent<S: ChainStore + ?Sized>(
    store: &S,
    block: &StoredBlock,
) -> Result<StoredBlock, VerificationError> {
    store
        .get(&block.prev_blockhash())
        .ok_or(VerificationError::MissingAncestor {
            hash: block.prev_blockhash(),
            height: block.height.saturating_sub(1),
        })
}

fn stored_target(block: &StoredBlock) -> Result<Target, VerificationError> {
    block.target().ok_or(VerificationError::InvalidStoredTarget {
        bits: block.bits(),
        height: block.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Chain;
    use crate::store::MemoryChainStore;
    use crate::test_util::{ChainBuilder, candidate, synthetic_hash};

    const TIME: u32 = 1_400_000_000;

    fn chain_params(chain: Chain) -> ChainParams {
        ChainParams::for_chain(chain).unwrap()
    }

    fn target(bits: u32) -> Target {
        Target::from_compact(CompactTarget::new(bits)).unwrap()
    }

    /// `len` blocks ending at `tip_height`, `spacing` seconds apart.
    fn chain(tip_height: u32, len: u32, spacing: u32, bits: u32) -> ChainBuilder {
        let mut builder = ChainBuilder::start(tip_height + 1 - len, TIME, bits);
        builder.extend(len - 1, spacing, bits);
        builder
    }

    fn check(
        params: &ChainParams,
        builder: &ChainBuilder,
        spacing: u32,
        bits: u32,
    ) -> Result<(), VerificationError> {
        let prev = builder.tip();
        let next = candidate(&prev, prev.time() + spacing, bits);
        params.difficulty().check_difficulty(&prev, &next, builder.store())
    }

    #[test]
    fn test_genesis_difficulty_accepted_on_every_chain() {
        for chain in Chain::ALL {
            let params = chain_params(chain);
            let genesis = params.genesis();
            let prev = StoredBlock::new(genesis.hash, genesis.header, 0);
            let store: MemoryChainStore = std::iter::once(prev).collect();
            let next = candidate(
                &prev,
                prev.time() + params.params().target_spacing,
                genesis.header.bits.to_consensus(),
            );
            params
                .difficulty()
                .check_difficulty(&prev, &next, &store)
                .unwrap_or_else(|e| panic!("{chain}: {e}"));
        }
    }

    #[test]
    fn test_unexpected_change_off_boundary() {
        let params = chain_params(Chain::Bitcoin);
        let builder = chain(1000, 10, 600, 0x1c00ffff);
        assert!(check(&params, &builder, 600, 0x1c00ffff).is_ok());
        assert_eq!(
            check(&params, &builder, 600, 0x1c00fffe),
            Err(VerificationError::UnexpectedDifficultyChange {
                height: 1001,
                declared: CompactTarget::new(0x1c00fffe),
                expected: CompactTarget::new(0x1c00ffff),
            })
        );
    }

    #[test]
    fn test_bitcoin_exact_spacing_measures_one_interval_short() {
        // 2015 intervals are measured against a 2016-interval timespan
        let params = chain_params(Chain::Bitcoin);
        let builder = chain(4031, 2016, 600, 0x1c00ffff);
        let required = params
            .difficulty()
            .required_target(&builder.tip(), builder.store())
            .unwrap();
        assert_eq!(required, target(0x1c00ffff).mul_div(2015 * 600, 1_209_600).unwrap());

        assert!(matches!(
            check(&params, &builder, 600, 0x1c00ffff),
            Err(VerificationError::DifficultyMismatch { height: 4032, .. })
        ));
        assert!(check(&params, &builder, 600, required.to_compact().to_consensus()).is_ok());
    }

    #[test]
    fn test_bitcoin_upper_clamp() {
        let params = chain_params(Chain::Bitcoin);
        let builder = chain(4031, 2016, 6000, 0x1c00ffff);
        assert_eq!(
            params.difficulty().timespan(&builder.tip(), builder.store()),
            Ok(4 * 1_209_600)
        );
        assert!(check(&params, &builder, 600, 0x1c03fffc).is_ok());
    }

    #[test]
    fn test_bitcoin_clamped_to_max_target() {
        let params = chain_params(Chain::Bitcoin);
        let builder = chain(4031, 2016, 6000, 0x1d00ffff);
        let required = params
            .difficulty()
            .required_target(&builder.tip(), builder.store())
            .unwrap();
        assert_eq!(required, params.max_target());
        assert!(check(&params, &builder, 600, 0x1d00ffff).is_ok());
    }

    #[test]
    fn test_missing_ancestor_is_fatal() {
        let params = chain_params(Chain::Bitcoin);
        let mut builder = chain(4031, 2016, 600, 0x1c00ffff);
        builder.store_mut().remove(&synthetic_hash(3000));
        assert_eq!(
            check(&params, &builder, 600, 0x1c00ffff),
            Err(VerificationError::MissingAncestor {
                hash: synthetic_hash(3000),
                height: 3000,
            })
        );
    }

    #[test]
    fn test_litecoin_second_retarget_is_steady() {
        let params = chain_params(Chain::Litecoin);
        // The offset walks 2016 blocks back, so the whole interval is measured
        let builder = chain(4031, 2017, 150, 0x1d0ffff0);
        let required = params
            .difficulty()
            .required_target(&builder.tip(), builder.store())
            .unwrap();
        assert_eq!(required, target(0x1d0ffff0));
        assert!(check(&params, &builder, 150, 0x1d0ffff0).is_ok());
    }

    #[test]
    fn test_litecoin_first_retarget() {
        let params = chain_params(Chain::Litecoin);
        let builder = chain(2015, 2016, 150, 0x1d0ffff0);
        assert_eq!(
            params.difficulty().timespan(&builder.tip(), builder.store()),
            Ok(2015 * 150)
        );
    }

    #[test]
    fn test_dogecoin_digishield() {
        let params = chain_params(Chain::Dogecoin);
        let builder = chain(150_000, 2, 600, 0x1c00ffff);
        // 60 + (600 - 60) / 8 = 127, capped at 90
        assert_eq!(
            params.difficulty().timespan(&builder.tip(), builder.store()),
            Ok(90)
        );
        assert!(check(&params, &builder, 60, 0x1c017ffe).is_ok());
        assert!(matches!(
            check(&params, &builder, 60, 0x1c01fffe),
            Err(VerificationError::DifficultyMismatch { height: 150_001, .. })
        ));
    }

    #[test]
    fn test_dogecoin_early_band_allows_sixteenfold() {
        let params = chain_params(Chain::Dogecoin);
        let builder = chain(479, 241, 1, 0x1c00ffff);
        assert!(check(&params, &builder, 1, 0x1b0ffff0).is_ok());
    }

    #[test]
    fn test_dogecoin_classic_band() {
        let params = chain_params(Chain::Dogecoin);
        let builder = chain(10_319, 241, 1, 0x1c00ffff);
        assert!(check(&params, &builder, 1, 0x1b3fffc0).is_ok());
    }

    #[test]
    fn test_dogecoin_first_interval_blockspan() {
        let params = chain_params(Chain::Dogecoin);
        // 239 hops back from height 239 reach height 0
        let builder = chain(239, 240, 60, 0x1c00ffff);
        assert_eq!(
            params.difficulty().timespan(&builder.tip(), builder.store()),
            Ok(239 * 60)
        );
    }

    #[test]
    fn test_darkcoin_ratio_phase_with_tolerance() {
        let params = chain_params(Chain::Darkcoin);
        let builder = chain(575, 576, 150, 0x1d00ffff);
        // 575 * 150 s against a one-day timespan, well inside 20%
        assert!(check(&params, &builder, 150, 0x1d00ffff).is_ok());
        assert!(matches!(
            check(&params, &builder, 150, 0x1c7fff80),
            Err(VerificationError::DifficultyMismatch { height: 576, .. })
        ));
    }

    #[test]
    fn test_darkcoin_bits_fixed_between_ratio_retargets() {
        let params = chain_params(Chain::Darkcoin);
        let builder = chain(100, 101, 150, 0x1e0ffff0);
        assert!(matches!(
            check(&params, &builder, 150, 0x1e0fffff),
            Err(VerificationError::UnexpectedDifficultyChange { height: 101, .. })
        ));
    }

    #[test]
    fn test_darkcoin_kgw_phase() {
        let params = chain_params(Chain::Darkcoin);
        let builder = chain(20_000, 100, 1, 0x1c00ffff);
        let required = params
            .difficulty()
            .required_target(&builder.tip(), builder.store())
            .unwrap();
        assert_eq!(required, target(0x1c00ffff).mul_div(13, 2100).unwrap());
        assert!(check(&params, &builder, 1, required.to_compact().to_consensus()).is_ok());
    }

    #[test]
    fn test_darkcoin_gravity_walk_tolerates_gaps() {
        let params = chain_params(Chain::Darkcoin);
        let builder = ChainBuilder::start(40_000, TIME, 0x1c00ffff);
        let required = params
            .difficulty()
            .required_target(&builder.tip(), builder.store())
            .unwrap();
        // The lone stored block is re-read for the whole window and no time
        // elapses, so the timespan clamps to a third
        assert_eq!(required, target(0x1c00ffff).mul_div(7_000, 21_000).unwrap());
    }

    #[test]
    fn test_darkcoin_tolerance_ends_at_cutover() {
        let params = chain_params(Chain::Darkcoin);
        let mut builder = chain(68_588, 40, 150, 0x1c00ffff);

        let computed = params
            .difficulty()
            .required_target(&builder.tip(), builder.store())
            .unwrap();
        assert_eq!(computed, target(0x1c00ffff).mul_div(3_450, 3_600).unwrap());
        let loose = computed.mul_div(11, 10).unwrap().to_compact().to_consensus();
        assert!(check(&params, &builder, 150, loose).is_ok());

        builder.push(150, 0x1c00ffff);
        let computed = params
            .difficulty()
            .required_target(&builder.tip(), builder.store())
            .unwrap();
        let loose = computed.mul_div(11, 10).unwrap().to_compact().to_consensus();
        assert!(matches!(
            check(&params, &builder, 150, loose),
            Err(VerificationError::DifficultyMismatch { height: 68_590, .. })
        ));
        assert!(check(&params, &builder, 150, computed.to_compact().to_consensus()).is_ok());
    }

    #[test]
    fn test_testnet_slow_block_may_use_minimum_difficulty() {
        let params = chain_params(Chain::BitcoinTestnet2);
        let builder = chain(5000, 10, 600, 0x1c00ffff);
        // 25 minutes after the previous block
        assert!(check(&params, &builder, 25 * 60, 0x1d0fffff).is_ok());
    }

    #[test]
    fn test_testnet_short_gap_walks_past_minimum_difficulty_blocks() {
        let params = chain_params(Chain::BitcoinTestnet2);
        let mut builder = chain(4034, 2, 600, 0x1c00ffff);
        builder.extend(6, 1500, 0x1d0fffff);

        assert!(check(&params, &builder, 600, 0x1c00ffff).is_ok());
        assert_eq!(
            check(&params, &builder, 600, 0x1d0fffff),
            Err(VerificationError::TestnetTransition {
                height: 4041,
                expected: CompactTarget::new(0x1c00ffff),
                declared: CompactTarget::new(0x1d0fffff),
            })
        );
    }

    #[test]
    fn test_testnet_walk_stops_at_interval_boundary() {
        let params = chain_params(Chain::BitcoinTestnet2);
        let builder = chain(4036, 5, 1500, 0x1d0fffff);
        // Block 4032 starts the interval, so its bits are the reference
        assert!(check(&params, &builder, 600, 0x1d0fffff).is_ok());
    }

    #[test]
    fn test_testnet_backwards_time_is_accepted() {
        let params = chain_params(Chain::BitcoinTestnet2);
        let builder = chain(5000, 10, 600, 0x1c00ffff);
        let prev = builder.tip();
        let next = candidate(&prev, prev.time() - 10, 0x1d0fffff);
        assert!(params
            .difficulty()
            .check_difficulty(&prev, &next, builder.store())
            .is_ok());
    }

    #[test]
    fn test_testnet_rule_inactive_before_date() {
        let params = chain_params(Chain::BitcoinTestnet2);
        let mut builder = ChainBuilder::start(100, 1_300_000_000, 0x1c00ffff);
        builder.extend(5, 600, 0x1c00ffff);
        assert!(matches!(
            check(&params, &builder, 25 * 60, 0x1d0fffff),
            Err(VerificationError::UnexpectedDifficultyChange { .. })
        ));
    }

    #[test]
    fn test_litecoin_testnet_rule_always_active() {
        let params = chain_params(Chain::LitecoinTestnet);
        let mut builder = chain(3000, 2, 150, 0x1c00ffff);
        builder.extend(3, 400, 0x1e0fffff);
        assert!(check(&params, &builder, 301, 0x1e0fffff).is_ok());
        assert!(check(&params, &builder, 150, 0x1c00ffff).is_ok());
        assert!(matches!(
            check(&params, &builder, 150, 0x1e0fffff),
            Err(VerificationError::TestnetTransition { height: 3004, .. })
        ));
    }
}

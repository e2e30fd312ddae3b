use serde::Serialize;

use crate::blockdata::genesis::GenesisInfo;
use crate::hashes::{HashPipeline, ScryptParams};
use crate::network::Chain;
use crate::pow::CompactTarget;

/// Limits applied to a measured retarget timespan `t` against the target
/// timespan `T`. All arithmetic is truncating integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimespanClamp {
    /// Clamp to `[T / min_divisor, T * max_multiplier]`.
    Ratio {
        min_divisor: i64,
        max_multiplier: i64,
    },
    /// Replace `t` with `T + (t - T) / dampening`, then clamp to
    /// `[T - T/4, T + T/2]`.
    Dampened { dampening: i64 },
}

impl TimespanClamp {
    /// `[T/4, 4T]`.
    pub const CLASSIC: Self = TimespanClamp::Ratio {
        min_divisor: 4,
        max_multiplier: 4,
    };

    /// Applies the limits to a measured timespan.
    #[allow(clippy::arithmetic_side_effects, reason = "Divisors are non-zero constants")]
    pub fn apply(self, timespan: i64, target: i64) -> i64 {
        match self {
            TimespanClamp::Ratio {
                min_divisor,
                max_multiplier,
            } => timespan
                .max(target / min_divisor)
                .min(target.saturating_mul(max_multiplier)),
            TimespanClamp::Dampened { dampening } => {
                let dampened = target + (timespan - target) / dampening;
                dampened.max(target - target / 4).min(target + target / 2)
            }
        }
    }
}

/// A timespan clamp that applies from `from_height` (of the previous block)
/// upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimespanBand {
    pub from_height: u32,
    pub clamp: TimespanClamp,
}

/// Dogecoin's clamp schedule, highest band first.
pub const DOGECOIN_TIMESPAN_BANDS: [TimespanBand; 4] = [
    TimespanBand {
        from_height: 145_000,
        clamp: TimespanClamp::Dampened { dampening: 8 },
    },
    TimespanBand {
        from_height: 10_000,
        clamp: TimespanClamp::CLASSIC,
    },
    TimespanBand {
        from_height: 5_000,
        clamp: TimespanClamp::Ratio {
            min_divisor: 8,
            max_multiplier: 4,
        },
    },
    TimespanBand {
        from_height: 0,
        clamp: TimespanClamp::Ratio {
            min_divisor: 16,
            max_multiplier: 4,
        },
    },
];

/// Number of blocks a gravity-well walk needs and may visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowBounds {
    pub min: u64,
    pub max: u64,
}

/// Which algorithm computes the next target on a gravity-well chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GravityWellPhase {
    /// Classic ratio retarget at interval boundaries.
    Ratio,
    KimotoGravityWell,
    DarkGravityWave,
    DarkGravityWave3,
}

/// Height schedule of Darkcoin's retarget algorithms. Heights are those of
/// the block being checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GravityWellSchedule {
    /// First height retargeting every block with Kimoto Gravity Well.
    pub kgw_height: u32,
    /// First height using Dark Gravity Wave.
    pub dgw_height: u32,
    /// First height using Dark Gravity Wave v3.
    pub dgw3_height: u32,
    /// Heights below this accept a relative difficulty error of `tolerance`.
    pub tolerance_until: u32,
    pub tolerance: f64,
    pub kgw_window: WindowBounds,
    pub dgw_window: WindowBounds,
    pub dgw3_window: WindowBounds,
}

impl GravityWellSchedule {
    pub fn phase(&self, height: u32) -> GravityWellPhase {
        if height < self.kgw_height {
            GravityWellPhase::Ratio
        } else if height < self.dgw_height {
            GravityWellPhase::KimotoGravityWell
        } else if height < self.dgw3_height {
            GravityWellPhase::DarkGravityWave
        } else {
            GravityWellPhase::DarkGravityWave3
        }
    }
}

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Darkcoin's schedule. KGW's window spans 1/40 of a day to a week of
/// 150-second blocks.
pub const DARKCOIN_SCHEDULE: GravityWellSchedule = GravityWellSchedule {
    kgw_height: 15_200,
    dgw_height: 34_140,
    dgw3_height: 68_589,
    tolerance_until: 68_590,
    tolerance: 0.2,
    kgw_window: WindowBounds {
        min: SECONDS_PER_DAY / 40 / 150,
        max: SECONDS_PER_DAY * 7 / 150,
    },
    dgw_window: WindowBounds { min: 14, max: 140 },
    dgw3_window: WindowBounds { min: 24, max: 24 },
};

/// How a chain derives the next target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetargetStrategy {
    /// Ratio retarget every `interval` blocks, timespan clamped to `[T/4, 4T]`.
    Fixed,
    /// Ratio retarget whose interval drops to `fast_interval` from
    /// `fast_height`, with height-banded timespan clamps.
    Variable {
        fast_height: u32,
        fast_interval: u32,
        bands: &'static [TimespanBand],
    },
    /// Height-phased gravity-well algorithms.
    GravityWell(GravityWellSchedule),
}

/// Testnet rule allowing minimum-difficulty blocks after a slow gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MinDifficultyRule {
    /// The rule applies to blocks whose timestamp is strictly after this.
    pub after_time: u32,
}

/// Consensus parameters for the supported chains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Params {
    /// Chain for which these parameters are defined.
    pub chain: Chain,
    /// Reverse-DNS chain identifier.
    pub id: &'static str,
    /// Function whose output must not exceed the target.
    pub pow_hash: HashPipeline,
    /// Function producing the block identity hash.
    pub block_hash: HashPipeline,
    /// Expected amount of time to mine one block, in seconds.
    pub target_spacing: u32,
    /// Expected duration of a retarget interval, in seconds.
    pub target_timespan: u32,
    /// Blocks per retarget interval.
    pub interval: u32,
    /// Extra block walked back when measuring a retarget timespan after the
    /// first interval.
    pub interval_offset: u32,
    /// The easiest permitted target.
    pub max_target: CompactTarget,
    pub retarget: RetargetStrategy,
    pub min_difficulty: Option<MinDifficultyRule>,
    pub genesis: GenesisInfo,
}

impl Params {
    /// Consensus parameters for Bitcoin mainnet.
    pub const BITCOIN: Self = Self {
        chain: Chain::Bitcoin,
        id: "org.bitcoin.production",
        pow_hash: HashPipeline::Sha256d,
        block_hash: HashPipeline::Sha256d,
        target_spacing: 10 * 60,             // 10 minutes
        target_timespan: 14 * 24 * 60 * 60, // two weeks
        interval: 2016,
        interval_offset: 0,
        max_target: CompactTarget::new(0x1d00ffff),
        retarget: RetargetStrategy::Fixed,
        min_difficulty: None,
        genesis: GenesisInfo::BITCOIN,
    };
    /// Consensus parameters for the second Bitcoin testnet.
    pub const BITCOIN_TESTNET2: Self = Self {
        chain: Chain::BitcoinTestnet2,
        id: "org.bitcoin.test",
        max_target: CompactTarget::new(0x1d0fffff),
        min_difficulty: Some(MinDifficultyRule {
            after_time: 1_329_264_000, // 2012-02-15
        }),
        genesis: GenesisInfo::BITCOIN_TESTNET2,
        ..Self::BITCOIN
    };
    /// Consensus parameters for Litecoin mainnet.
    pub const LITECOIN: Self = Self {
        chain: Chain::Litecoin,
        id: "org.litecoin.production",
        pow_hash: HashPipeline::Scrypt(ScryptParams::LITECOIN),
        block_hash: HashPipeline::Sha256d,
        target_spacing: 150,                         // 2.5 minutes
        target_timespan: 7 * 24 * 60 * 60 / 2,       // 3.5 days
        interval: 7 * 24 * 60 * 60 / 2 / 150,        // 2016
        interval_offset: 1,
        max_target: CompactTarget::new(0x1e0fffff),
        retarget: RetargetStrategy::Fixed,
        min_difficulty: None,
        genesis: GenesisInfo::LITECOIN,
    };
    /// Consensus parameters for the Litecoin testnet.
    pub const LITECOIN_TESTNET: Self = Self {
        chain: Chain::LitecoinTestnet,
        id: "org.litecoin.testnet",
        min_difficulty: Some(MinDifficultyRule { after_time: 0 }),
        genesis: GenesisInfo::LITECOIN_TESTNET,
        ..Self::LITECOIN
    };
    /// Consensus parameters for Dogecoin mainnet.
    pub const DOGECOIN: Self = Self {
        chain: Chain::Dogecoin,
        id: "org.dogecoin.production",
        pow_hash: HashPipeline::Scrypt(ScryptParams::LITECOIN),
        block_hash: HashPipeline::Sha256d,
        target_spacing: 60,          // 1 minute
        target_timespan: 4 * 60 * 60, // 4 hours
        interval: 4 * 60,
        interval_offset: 1,
        max_target: CompactTarget::new(0x1e0fffff),
        retarget: RetargetStrategy::Variable {
            fast_height: 145_000,
            fast_interval: 1,
            bands: &DOGECOIN_TIMESPAN_BANDS,
        },
        min_difficulty: None,
        genesis: GenesisInfo::DOGECOIN,
    };
    /// Consensus parameters for Darkcoin mainnet.
    pub const DARKCOIN: Self = Self {
        chain: Chain::Darkcoin,
        id: "org.darkcoin.production",
        pow_hash: HashPipeline::X11,
        block_hash: HashPipeline::X11,
        target_spacing: 150,            // 2.5 minutes
        target_timespan: 24 * 60 * 60, // 1 day
        interval: 24 * 60 * 60 / 150,
        interval_offset: 1,
        max_target: CompactTarget::new(0x1e0fffff),
        retarget: RetargetStrategy::GravityWell(DARKCOIN_SCHEDULE),
        min_difficulty: None,
        genesis: GenesisInfo::DARKCOIN,
    };

    /// Blocks per retarget interval in effect after `height`.
    pub fn interval_at(&self, height: u32) -> u32 {
        match self.retarget {
            RetargetStrategy::Variable {
                fast_height,
                fast_interval,
                ..
            } if height >= fast_height => fast_interval,
            _ => self.interval,
        }
    }

    /// Target timespan in effect after `height`.
    pub fn target_timespan_at(&self, height: u32) -> u32 {
        match self.retarget {
            RetargetStrategy::Variable { .. } => self
                .interval_at(height)
                .saturating_mul(self.target_spacing),
            _ => self.target_timespan,
        }
    }

    /// Number of ancestors walked from `prev_height` to find the start of
    /// the interval being measured.
    ///
    /// The first interval has no block before its start, so the offset only
    /// applies once `prev_height + 1` lies beyond it.
    pub fn retarget_blockspan(&self, prev_height: u32) -> u32 {
        let interval = self.interval_at(prev_height);
        let offset = if prev_height.saturating_add(1) <= interval {
            0
        } else {
            self.interval_offset
        };
        interval.saturating_sub(1).saturating_add(offset)
    }

    /// Whether the block after `prev_height` is a difficulty transition point.
    pub fn should_retarget(&self, prev_height: u32) -> bool {
        let height = prev_height.saturating_add(1);
        if let RetargetStrategy::GravityWell(schedule) = self.retarget {
            if height >= schedule.kgw_height {
                return true;
            }
        }
        match self.interval_at(prev_height) {
            0 => false,
            interval => height % interval == 0,
        }
    }

    /// Timespan limits for a retarget following `prev_height`.
    pub fn timespan_clamp(&self, prev_height: u32) -> TimespanClamp {
        match self.retarget {
            RetargetStrategy::Variable { bands, .. } => bands
                .iter()
                .find(|band| prev_height >= band.from_height)
                .map_or(TimespanClamp::CLASSIC, |band| band.clamp),
            RetargetStrategy::Fixed | RetargetStrategy::GravityWell(_) => TimespanClamp::CLASSIC,
        }
    }

    /// Relative difficulty error accepted at `height`, if any.
    pub fn tolerance_at(&self, height: u32) -> Option<f64> {
        match self.retarget {
            RetargetStrategy::GravityWell(schedule) if height < schedule.tolerance_until => {
                Some(schedule.tolerance)
            }
            _ => None,
        }
    }
}

/// Pure-random greedy refinement: no population, just repeated "try a batch
/// of random placements for a random tile, commit the single best one if it
/// improves the match over its own footprint".
///
/// this is the consumer that justifies score_tile as a distinct entry point:
/// each trial is judged in O(tile footprint) without painting anything, and
/// only the winning placement is actually pasted.
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use rayon::prelude::*;

use crate::pool::{ImagePool, SourceImage};
use crate::raster::{draw_tile, score_tile, TileTransform};
use crate::settings::Settings;

/// random placements evaluated per committed paste
const TRIES_PER_ROUND: usize = 100;

pub struct GreedyRefiner {
    target: std::sync::Arc<SourceImage>,
    pool: std::sync::Arc<ImagePool>,
    settings: Settings,
    pub composite: Vec<u8>,
    seed: u64,
    round: u64,
}

impl GreedyRefiner {
    pub fn new(
        target: std::sync::Arc<SourceImage>,
        pool: std::sync::Arc<ImagePool>,
        settings: Settings,
        seed: u64,
    ) -> Self {
        settings.validate();
        assert!(
            target.width > 0 && target.height > 0,
            "GreedyRefiner: zero-sized target"
        );
        let composite = vec![0u8; target.byte_len()];
        Self { target, pool, settings, composite, seed, round: 0 }
    }

    /// one round: pick a random tile, evaluate TRIES_PER_ROUND random
    /// placements in parallel, paste the best one if it beats what the
    /// composite already has in that region. returns true if a paste landed.
    pub fn round(&mut self) -> bool {
        profiling::scope!("GreedyRefiner::round");

        self.round += 1;
        let mut rng = Pcg32::seed_from_u64(self.seed ^ self.round.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let img = self.pool.get(rng.random_range(0..self.pool.count()));
        let target = &self.target;
        let (dw, dh, ds) = (target.width, target.height, target.stride);
        let settings = self.settings;
        let composite = &self.composite;
        let base_seed = rng.random::<u64>();

        // independent trials, one RNG each; keep the placement whose painted
        // footprint would be strictly closer to the target than the current
        // composite content
        let best = (0..TRIES_PER_ROUND)
            .into_par_iter()
            .filter_map(|i| {
                let mut rng = Pcg32::seed_from_u64(base_seed.wrapping_add(i as u64));
                let t = TileTransform {
                    anchor_x: rng.random_range(0.0..dw as f32),
                    anchor_y: rng.random_range(0.0..dh as f32),
                    pivot_x: 0.0,
                    pivot_y: 0.0,
                    angle: rng.random_range(0.0..std::f32::consts::TAU),
                    scale: rng.random_range(settings.min_scale..settings.max_scale),
                };
                let pair = score_tile(
                    &target.data,
                    dw,
                    dh,
                    ds,
                    &img.data,
                    img.width,
                    img.height,
                    img.stride,
                    composite,
                    &t,
                );
                (pair.painted < pair.existing).then_some((pair.painted, t))
            })
            .min_by_key(|(painted, _)| *painted);

        match best {
            Some((_, t)) => {
                draw_tile(
                    &mut self.composite,
                    dw,
                    dh,
                    ds,
                    &img.data,
                    img.width,
                    img.height,
                    img.stride,
                    &t,
                );
                true
            }
            None => false,
        }
    }

    pub fn fitness(&self) -> u64 {
        crate::fitness::sad(&self.composite, &self.target.data)
    }
}

// Habitat module organization
// mod.rs owns the population and the generational loop; mutations.rs holds
// the crossover and mutation operators.

mod mutations;

use std::sync::Arc;

use rand::SeedableRng;
use rand::Rng;
use rand_pcg::Pcg32;
use rayon::prelude::*;

use crate::fitness::sad;
use crate::neighbors::NeighborIndex;
use crate::pool::{ImagePool, SourceImage};
use crate::raster::{draw_tile, TileTransform};
use crate::settings::Settings;

use mutations::MutationCtx;

/// one tile instance: which pool image it uses and where/how it is pasted.
/// the anchor is normalized to [0,1] fractions of the destination so the
/// placement stays meaningful when the destination is resized; the image is
/// a stable pool index, re-resolved at paint time, never a cached reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub image: usize,
    pub anchor_x: f32,
    pub anchor_y: f32,
    pub angle: f32,
    pub scale: f32,
}

/// one member of the population: an ordered placement sequence (paint order
/// is z-order - later entries overwrite earlier ones), its rendered
/// composite, and its fitness. u64::MAX fitness means "not yet scored".
pub struct Candidate {
    pub placements: Vec<Placement>,
    pub composite: Vec<u8>,
    pub fitness: u64,
}

impl Candidate {
    fn new(byte_len: usize) -> Self {
        Self {
            placements: Vec::new(),
            composite: vec![0u8; byte_len],
            fitness: u64::MAX,
        }
    }
}

/// the evolutionary search engine: owns the population, holds shared
/// references to the target image and the source pool, and advances one
/// generation per [`Habitat::step`] call. termination is the caller's job.
pub struct Habitat {
    population: Vec<Candidate>,
    settings: Settings,
    target: Arc<SourceImage>,
    pool: Arc<ImagePool>,
    neighbors: NeighborIndex,
    seed: u64,
    generation: u64,
}

/// derive an independent per-candidate generator so parallel pipeline
/// iterations never share RNG state, while staying reproducible under a
/// fixed master seed.
fn candidate_rng(seed: u64, generation: u64, index: usize) -> Pcg32 {
    let mix = seed
        ^ generation.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_mul(0xD1B5_4A32_D192_ED03);
    Pcg32::seed_from_u64(mix)
}

/// clear the candidate's composite, paint every placement in sequence order,
/// then score the full frame against the target.
fn render_and_score(cand: &mut Candidate, target: &SourceImage, pool: &ImagePool) {
    profiling::scope!("render_and_score");

    cand.composite.fill(0);
    for p in &cand.placements {
        let img = pool.get(p.image);
        let t = TileTransform {
            anchor_x: p.anchor_x * target.width as f32,
            anchor_y: p.anchor_y * target.height as f32,
            pivot_x: 0.0,
            pivot_y: 0.0,
            angle: p.angle,
            scale: p.scale,
        };
        draw_tile(
            &mut cand.composite,
            target.width,
            target.height,
            target.stride,
            &img.data,
            img.width,
            img.height,
            img.stride,
            &t,
        );
    }
    cand.fitness = sad(&cand.composite, &target.data);
}

impl Habitat {
    pub fn new(
        target: Arc<SourceImage>,
        pool: Arc<ImagePool>,
        settings: Settings,
        seed: u64,
    ) -> Self {
        profiling::scope!("Habitat::new");
        settings.validate();
        assert!(
            target.width > 0 && target.height > 0,
            "Habitat: zero-sized target"
        );

        let neighbors = NeighborIndex::build(&pool);
        let byte_len = target.byte_len();

        let mut population: Vec<Candidate> = (0..settings.population_size)
            .map(|_| Candidate::new(byte_len))
            .collect();

        let ctx = MutationCtx {
            settings: &settings,
            pool: &pool,
            neighbors: &neighbors,
        };
        population.par_iter_mut().enumerate().for_each(|(i, cand)| {
            let mut rng = candidate_rng(seed, 0, i);
            cand.placements = (0..settings.placement_count)
                .map(|_| mutations::random_placement(&ctx, &mut rng))
                .collect();
            render_and_score(cand, &target, &pool);
        });
        population.sort_by_key(|c| c.fitness);

        Self {
            population,
            settings,
            target,
            pool,
            neighbors,
            seed,
            generation: 0,
        }
    }

    /// indices `[0, elite_count)` of the sorted population survive a
    /// generation untouched; everything above gets replaced
    fn elite_count(&self) -> usize {
        let pop = self.settings.population_size;
        pop - ((pop as f32) * self.settings.reroll).ceil() as usize
    }

    /// advance one generation: sort, then rebuild every non-elite candidate
    /// by crossover or mutation and re-render/re-score it. the non-elite
    /// pipelines are independent (each touches only its own candidate, with
    /// reads of shared immutable state), so they run data-parallel.
    pub fn step(&mut self) {
        profiling::scope!("Habitat::step");

        self.population.sort_by_key(|c| c.fitness);
        self.generation += 1;

        let elite_count = self.elite_count();
        let generation = self.generation;
        let seed = self.seed;
        let settings = self.settings;
        let crossover_chance = settings.crossover_chance;

        let (elites, rest) = self.population.split_at_mut(elite_count);
        let elites: &[Candidate] = elites;
        let target = &self.target;
        let pool = &self.pool;
        let ctx = MutationCtx {
            settings: &settings,
            pool,
            neighbors: &self.neighbors,
        };

        rest.par_iter_mut().enumerate().for_each(|(k, cand)| {
            let mut rng = candidate_rng(seed, generation, elite_count + k);

            // crossover needs at least one elite donor; with none available
            // (reroll = 1.0) the roll degrades to mutation
            if elite_count > 0 && rng.random_range(0..100u32) < crossover_chance {
                let a = &elites[rng.random_range(0..elite_count)];
                let b = &elites[rng.random_range(0..elite_count)];
                cand.placements = mutations::crossover(a, b, &mut rng);
            } else {
                mutations::mutate(cand, &ctx, &mut rng);
            }

            render_and_score(cand, target, pool);
        });

        self.population.sort_by_key(|c| c.fitness);
    }

    /// the best-known candidate (lowest fitness)
    pub fn best(&self) -> &Candidate {
        &self.population[0]
    }

    #[allow(dead_code)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[allow(dead_code)]
    pub fn population(&self) -> &[Candidate] {
        &self.population
    }

    /// caller-triggered, stop-the-world pool swap (progressive refinement).
    /// every placement's stable image index is re-resolved against the new
    /// pool, every composite is reallocated to the new destination shape,
    /// and the whole population is re-rendered and re-scored.
    pub fn reload_after_pool_change(&mut self, pool: Arc<ImagePool>, target: Arc<SourceImage>) {
        profiling::scope!("Habitat::reload_after_pool_change");
        assert!(
            target.width > 0 && target.height > 0,
            "Habitat: zero-sized target"
        );

        self.neighbors = NeighborIndex::build(&pool);
        self.pool = pool;
        self.target = target;

        let byte_len = self.target.byte_len();
        let count = self.pool.count();
        let target = &self.target;
        let pool = &self.pool;

        self.population.par_iter_mut().for_each(|cand| {
            for p in &mut cand.placements {
                // indices past the end of a smaller pool wrap around rather
                // than dangle
                p.image %= count;
            }
            cand.composite = vec![0u8; byte_len];
            render_and_score(cand, target, pool);
        });
        self.population.sort_by_key(|c| c.fitness);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SourceImage;

    fn test_settings() -> Settings {
        Settings {
            placement_count: 3,
            population_size: 6,
            reroll: 0.5,
            crossover_chance: 50,
            min_scale: 0.5,
            max_scale: 1.5,
            ..Settings::default()
        }
    }

    fn test_pool() -> Arc<ImagePool> {
        Arc::new(ImagePool::new(vec![
            SourceImage::solid(2, 2, 0x40),
            SourceImage::solid(2, 2, 0x80),
            SourceImage::solid(2, 2, 0xC0),
        ]))
    }

    fn test_habitat(seed: u64) -> Habitat {
        let target = Arc::new(SourceImage::solid(4, 4, 0x80));
        Habitat::new(target, test_pool(), test_settings(), seed)
    }

    fn fitnesses(h: &Habitat) -> Vec<u64> {
        h.population().iter().map(|c| c.fitness).collect()
    }

    #[test]
    fn initial_population_is_scored_and_sized() {
        let h = test_habitat(1);
        assert_eq!(h.population().len(), 6);
        for c in h.population() {
            assert_eq!(c.placements.len(), 3);
            assert_ne!(c.fitness, u64::MAX, "every candidate scored at init");
            assert_eq!(c.composite.len(), 4 * 4 * 4);
        }
    }

    #[test]
    fn population_stays_sorted_across_steps() {
        let mut h = test_habitat(2);
        for _ in 0..4 {
            h.step();
            let f = fitnesses(&h);
            assert!(f.windows(2).all(|w| w[0] <= w[1]), "not sorted: {f:?}");
        }
    }

    #[test]
    fn best_fitness_never_regresses() {
        // elites carry over untouched, so the best score is monotone
        let mut h = test_habitat(3);
        let mut best = h.best().fitness;
        for _ in 0..8 {
            h.step();
            assert!(h.best().fitness <= best);
            best = h.best().fitness;
        }
    }

    #[test]
    fn elites_survive_a_generation_unchanged() {
        let mut h = test_habitat(4);
        h.step();

        // population is sorted after step; the elite range of the NEXT step
        // is exactly the current head of the population
        let elite_count = h.elite_count();
        let snapshot: Vec<(u64, Vec<u8>)> = h.population()[..elite_count]
            .iter()
            .map(|c| (c.fitness, c.composite.clone()))
            .collect();

        h.step();

        for (fitness, composite) in &snapshot {
            assert!(
                h.population()
                    .iter()
                    .any(|c| c.fitness == *fitness && &c.composite == composite),
                "elite candidate lost or modified"
            );
        }
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let mut a = test_habitat(42);
        let mut b = test_habitat(42);
        for _ in 0..3 {
            a.step();
            b.step();
        }
        assert_eq!(fitnesses(&a), fitnesses(&b));
    }

    #[test]
    fn empty_candidate_is_valid_and_scores_blank() {
        let target = SourceImage::solid(4, 4, 0x80);
        let pool = test_pool();
        let mut cand = Candidate::new(target.byte_len());

        render_and_score(&mut cand, &target, &pool);

        assert!(cand.composite.iter().all(|&b| b == 0));
        assert_eq!(cand.fitness, sad(&cand.composite, &target.data));
    }

    #[test]
    fn pool_replacement_reresolves_and_rerenders() {
        let mut h = test_habitat(5);
        h.step();

        // shrink the pool to one image and grow the destination
        let new_pool = Arc::new(ImagePool::new(vec![SourceImage::solid(2, 2, 0x20)]));
        let new_target = Arc::new(SourceImage::solid(6, 6, 0x20));
        h.reload_after_pool_change(new_pool, new_target);

        for c in h.population() {
            assert!(c.placements.iter().all(|p| p.image == 0));
            assert_eq!(c.composite.len(), 6 * 6 * 4);
            assert_ne!(c.fitness, u64::MAX);
        }
        let f = fitnesses(&h);
        assert!(f.windows(2).all(|w| w[0] <= w[1]));
    }
}

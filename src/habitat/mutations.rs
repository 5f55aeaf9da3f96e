use rand::Rng;
use rand_pcg::Pcg32;

use crate::neighbors::NeighborIndex;
use crate::pool::ImagePool;
use crate::settings::Settings;

use super::{Candidate, Placement};

/// shared immutable state the operators read; bundled so the per-candidate
/// pipeline can borrow it once
pub(super) struct MutationCtx<'a> {
    pub settings: &'a Settings,
    pub pool: &'a ImagePool,
    pub neighbors: &'a NeighborIndex,
}

/// a brand-new random placement: random tile, random normalized anchor,
/// random angle in [0, 2pi), random scale inside the configured bounds
pub(super) fn random_placement(ctx: &MutationCtx, rng: &mut Pcg32) -> Placement {
    Placement {
        image: rng.random_range(0..ctx.pool.count()),
        anchor_x: rng.random::<f32>(),
        anchor_y: rng.random::<f32>(),
        angle: rng.random_range(0.0..std::f32::consts::TAU),
        scale: rng.random_range(ctx.settings.min_scale..ctx.settings.max_scale),
    }
}

/// position-wise uniform crossover: each slot up to the shorter parent's
/// length comes from one parent or the other with equal probability. the
/// child truncates to min(|A|, |B|) placements, so a candidate can shrink
/// through crossover.
pub(super) fn crossover(a: &Candidate, b: &Candidate, rng: &mut Pcg32) -> Vec<Placement> {
    let len = a.placements.len().min(b.placements.len());
    (0..len)
        .map(|i| {
            if rng.random::<bool>() {
                a.placements[i]
            } else {
                b.placements[i]
            }
        })
        .collect()
}

/// weighted-roll dispatch over the three mutation operators
pub(super) fn mutate(cand: &mut Candidate, ctx: &MutationCtx, rng: &mut Pcg32) {
    let s = ctx.settings;
    let roll = rng.random_range(0..100u32);
    if roll < s.mutate_adjust_weight {
        mutate_adjust(cand, ctx, rng);
    } else if roll < s.mutate_adjust_weight + s.mutate_add_weight {
        mutate_add(cand, ctx, rng);
    } else {
        mutate_remove(cand, rng);
    }
}

/// perturb one randomly chosen placement: angle by +-[0, 0.5) rad, anchor by
/// +-[0, 0.1) per axis, scale by a random in-range delta clamped back into
/// bounds. occasionally the tile itself is swapped for one of the nearest
/// neighbors of the placement's own source image, so substitutions stay
/// visually coherent.
fn mutate_adjust(cand: &mut Candidate, ctx: &MutationCtx, rng: &mut Pcg32) {
    if cand.placements.is_empty() {
        return;
    }
    let s = ctx.settings;
    let idx = rng.random_range(0..cand.placements.len());
    let p = &mut cand.placements[idx];

    p.angle += rng.random_range(-0.5..0.5f32);
    p.anchor_x = (p.anchor_x + rng.random_range(-0.1..0.1f32)).clamp(0.0, 1.0);
    p.anchor_y = (p.anchor_y + rng.random_range(-0.1..0.1f32)).clamp(0.0, 1.0);

    let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
    let delta = rng.random_range(s.min_scale..s.max_scale) * 0.3 * sign;
    p.scale = (p.scale + delta).clamp(s.min_scale, s.max_scale);

    if rng.random::<f32>() < s.neighbor_swap_chance {
        let nbrs = ctx.neighbors.neighbors_of(p.image);
        if !nbrs.is_empty() {
            p.image = nbrs[rng.random_range(0..nbrs.len())].image;
        }
    }
}

/// append one brand-new random placement (paints on top of everything else)
fn mutate_add(cand: &mut Candidate, ctx: &MutationCtx, rng: &mut Pcg32) {
    let p = random_placement(ctx, rng);
    cand.placements.push(p);
}

/// delete one randomly chosen placement; no-op on an empty sequence
fn mutate_remove(cand: &mut Candidate, rng: &mut Pcg32) {
    if cand.placements.is_empty() {
        return;
    }
    let idx = rng.random_range(0..cand.placements.len());
    cand.placements.remove(idx);
}

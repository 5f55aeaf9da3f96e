use rayon::prelude::*;

use crate::fitness::sad;
use crate::pool::ImagePool;

/// how many visually-closest neighbors to retain per source image
pub const NEIGHBOR_K: usize = 5;

/// (source image index, dissimilarity score); lower score = more similar
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborEntry {
    pub image: usize,
    pub score: u64,
}

/// per-image table of the K most visually similar other source images,
/// ranked by size-normalized full-buffer SAD. built once per pool load
/// (O(n^2) in image count) and consulted by the adjust mutation to bias tile
/// substitutions toward coherent replacements.
pub struct NeighborIndex {
    table: Vec<Vec<NeighborEntry>>,
}

impl NeighborIndex {
    pub fn build(pool: &ImagePool) -> Self {
        profiling::scope!("NeighborIndex::build");
        let n = pool.count();

        // score every unordered pair once, in parallel over the first index.
        // the score is SAD over the overlapping byte count, normalized by the
        // smaller buffer so differently sized tiles stay comparable.
        let pairs: Vec<(usize, usize, u64)> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let a = pool.get(i);
                (i + 1..n).map(move |j| {
                    let b = pool.get(j);
                    let overlap = a.byte_len().min(b.byte_len());
                    let score = sad(&a.data[..overlap], &b.data[..overlap]) / overlap as u64;
                    (i, j, score)
                })
            })
            .collect();

        let mut table: Vec<Vec<NeighborEntry>> = vec![Vec::new(); n];
        for (i, j, score) in pairs {
            table[i].push(NeighborEntry { image: j, score });
            table[j].push(NeighborEntry { image: i, score });
        }

        for entries in &mut table {
            entries.sort_by_key(|e| e.score);
            entries.truncate(NEIGHBOR_K);
        }

        NeighborIndex { table }
    }

    /// up to K nearest neighbors of `image`, most similar first
    #[inline]
    pub fn neighbors_of(&self, image: usize) -> &[NeighborEntry] {
        &self.table[image]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SourceImage;

    #[test]
    fn identical_images_rank_before_dissimilar_ones() {
        // A and B byte-identical, C maximally different from both
        let a = SourceImage::solid(4, 4, 0x00);
        let b = SourceImage::solid(4, 4, 0x00);
        let c = SourceImage::solid(4, 4, 0xFF);
        let pool = ImagePool::new(vec![a, b, c]);

        let index = NeighborIndex::build(&pool);

        let nbrs = index.neighbors_of(0);
        assert_eq!(nbrs.len(), 2);
        assert_eq!(nbrs[0].image, 1);
        assert_eq!(nbrs[0].score, 0);
        assert_eq!(nbrs[1].image, 2);
        assert!(nbrs[1].score > nbrs[0].score);
    }

    #[test]
    fn table_is_symmetric() {
        let pool = ImagePool::new(vec![
            SourceImage::solid(4, 4, 0x10),
            SourceImage::solid(4, 4, 0x20),
        ]);
        let index = NeighborIndex::build(&pool);

        assert_eq!(index.neighbors_of(0)[0].image, 1);
        assert_eq!(index.neighbors_of(1)[0].image, 0);
        assert_eq!(index.neighbors_of(0)[0].score, index.neighbors_of(1)[0].score);
    }

    #[test]
    fn retains_at_most_k_entries() {
        let images: Vec<SourceImage> =
            (0..NEIGHBOR_K + 3).map(|i| SourceImage::solid(4, 4, (i * 20) as u8)).collect();
        let pool = ImagePool::new(images);
        let index = NeighborIndex::build(&pool);

        for i in 0..pool.count() {
            assert!(index.neighbors_of(i).len() <= NEIGHBOR_K);
        }
    }

    #[test]
    fn mixed_sizes_use_overlapping_bytes() {
        // smaller image compared against the prefix of the larger one
        let small = SourceImage::solid(2, 2, 0x00);
        let large = SourceImage::solid(4, 4, 0x00);
        let pool = ImagePool::new(vec![small, large]);
        let index = NeighborIndex::build(&pool);

        assert_eq!(index.neighbors_of(0)[0].score, 0);
    }
}

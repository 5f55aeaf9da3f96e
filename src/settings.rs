/// run settings for evomosaic
/// immutable once a run starts; loaded from settings.json when present
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// placements per candidate at initialization (mutations may grow/shrink it)
    pub placement_count: usize,
    /// candidates in the population
    pub population_size: usize,
    /// share of the population replaced each generation (0..1]
    pub reroll: f32,
    /// percent chance a replaced candidate is built by crossover instead of mutation
    pub crossover_chance: u32,
    /// scale bounds for placements (source-to-destination pixel ratio)
    pub min_scale: f32,
    pub max_scale: f32,
    /// mutation operator weights, percent; must sum to 100
    pub mutate_adjust_weight: u32,
    pub mutate_add_weight: u32,
    pub mutate_remove_weight: u32,
    /// chance that an adjust mutation also swaps the tile for one of its
    /// precomputed nearest neighbors
    pub neighbor_swap_chance: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            placement_count: 12,
            population_size: 30,
            reroll: 0.7,
            crossover_chance: 70,
            min_scale: 0.001,
            max_scale: 1.0,
            mutate_adjust_weight: 60,
            mutate_add_weight: 28,
            mutate_remove_weight: 12,
            neighbor_swap_chance: 0.1,
        }
    }
}

impl Settings {
    /// save settings to JSON file
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write("settings.json", json)?;
        Ok(())
    }

    /// load settings from JSON file, or return defaults if file doesn't exist
    pub fn load() -> Self {
        match std::fs::read_to_string("settings.json") {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("failed to parse settings.json: {e}. using defaults.");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// fail fast on caller-bug configurations; a bad settings file is a
    /// precondition violation, not a runtime condition to recover from
    pub fn validate(&self) {
        assert!(self.population_size > 0, "population_size must be positive");
        assert!(
            self.reroll > 0.0 && self.reroll <= 1.0,
            "reroll must be in (0, 1]"
        );
        assert!(self.crossover_chance <= 100, "crossover_chance is a percent");
        assert!(
            self.min_scale > 0.0 && self.min_scale < self.max_scale,
            "scale bounds must satisfy 0 < min < max"
        );
        assert_eq!(
            self.mutate_adjust_weight + self.mutate_add_weight + self.mutate_remove_weight,
            100,
            "mutation weights must sum to 100"
        );
        assert!(
            (0.0..=1.0).contains(&self.neighbor_swap_chance),
            "neighbor_swap_chance must be in [0, 1]"
        );
    }
}

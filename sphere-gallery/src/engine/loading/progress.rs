use bevy::prelude::*;

#[derive(Resource, Default)]
pub struct LoadingProgress {
    pub items_loaded: bool,
    pub render_ready: bool,
    pub atlas: Option<AtlasProgress>,
}

/// Thumbnail count for the most recently requested atlas build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasProgress {
    pub generation: u64,
    pub total: usize,
    pub done: usize,
}

impl AtlasProgress {
    pub fn loaded(&self) -> usize {
        self.done.min(self.total)
    }

    pub fn is_complete(&self) -> bool {
        self.loaded() == self.total
    }

    /// Fraction in `0..=1`; an empty build counts as complete.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.loaded() as f32 / self.total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped_to_the_total() {
        let progress = AtlasProgress {
            generation: 4,
            total: 8,
            done: 2,
        };
        assert_eq!(progress.fraction(), 0.25);
        assert!(!progress.is_complete());

        let over = AtlasProgress { done: 9, ..progress };
        assert_eq!(over.loaded(), 8);
        assert!(over.is_complete());

        let empty = AtlasProgress {
            generation: 1,
            total: 0,
            done: 0,
        };
        assert!(empty.is_complete());
        assert_eq!(empty.fraction(), 1.0);
    }
}

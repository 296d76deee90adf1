//! Dominant drawing colors

use indexmap::IndexMap;

use crate::content::Rgb;

/// Default palette length
pub const PALETTE_SIZE: usize = 3;

/// Frequency counter that remembers first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorTally {
    counts: IndexMap<Rgb, usize>,
}

impl ColorTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, color: Rgb) {
        *self.counts.entry(color).or_insert(0) += 1;
    }

    pub fn extend<I: IntoIterator<Item = Rgb>>(&mut self, colors: I) {
        for color in colors {
            self.add(color);
        }
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Up to `n` most frequent colors; equal counts keep first-seen order
    pub fn most_common(&self, n: usize) -> Vec<Rgb> {
        let mut ranked: Vec<(usize, Rgb, usize)> = self
            .counts
            .iter()
            .enumerate()
            .map(|(order, (color, count))| (order, *color, *count))
            .collect();
        ranked.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().take(n).map(|(_, color, _)| color).collect()
    }

    /// Hex strings of the default-sized palette
    pub fn palette(&self) -> Vec<String> {
        self.most_common(PALETTE_SIZE)
            .iter()
            .map(Rgb::to_hex)
            .collect()
    }
}

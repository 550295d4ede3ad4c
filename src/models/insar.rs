use crate::stats;
use chrono::NaiveDate;

/// One persistent scatterer from the InSAR product.
#[derive(Debug, Clone, PartialEq)]
pub struct InsarPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub temporal_coherence: f64,
    /// Displacement in mm per acquisition, `NaN` where missing.
    pub displacements: Vec<f64>,
}

impl InsarPoint {
    /// Mean displacement over all acquisitions, the value mapped as velocity.
    pub fn mean_displacement(&self) -> Option<f64> {
        stats::mean(&self.displacements)
    }
}

/// An InSAR table: acquisition dates plus one displacement series per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsarDataset {
    pub dates: Vec<NaiveDate>,
    pub points: Vec<InsarPoint>,
}

impl InsarDataset {
    /// Keeps points whose temporal coherence reaches `min_coherence`.
    pub fn filter_coherence(&self, min_coherence: f64) -> InsarDataset {
        InsarDataset {
            dates: self.dates.clone(),
            points: self
                .points
                .iter()
                .filter(|p| p.temporal_coherence >= min_coherence)
                .cloned()
                .collect(),
        }
    }

    pub fn coordinates(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().map(|p| (p.latitude, p.longitude))
    }

    /// Per-date mean displacement of the points at `indexes`.
    pub fn average_series(&self, indexes: &[usize]) -> Vec<f64> {
        stats::column_means(
            indexes
                .iter()
                .filter_map(|&i| self.points.get(i))
                .map(|p| p.displacements.as_slice()),
            self.dates.len(),
        )
    }

    /// Years elapsed since the first acquisition for every date.
    pub fn decimal_years(&self) -> Vec<f64> {
        match self.dates.first() {
            Some(first) => self
                .dates
                .iter()
                .map(|d| (*d - *first).num_days() as f64 / 365.25)
                .collect(),
            None => Vec::new(),
        }
    }
}

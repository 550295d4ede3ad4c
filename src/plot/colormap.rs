//! Colour maps for value-coded scatter plots.

/// An RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const RED: Rgb = Rgb(214, 39, 40);
    pub const BLUE: Rgb = Rgb(31, 119, 180);
    pub const GREEN: Rgb = Rgb(44, 160, 44);
    pub const GRID: Rgb = Rgb(200, 200, 200);

    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    /// Diverging dark blue, white, dark red.
    Seismic,
    /// Sequential dark purple to yellow.
    Plasma,
}

const SEISMIC: [(f64, Rgb); 5] = [
    (0.0, Rgb(0, 0, 77)),
    (0.25, Rgb(0, 0, 255)),
    (0.5, Rgb(255, 255, 255)),
    (0.75, Rgb(255, 0, 0)),
    (1.0, Rgb(128, 0, 0)),
];

const PLASMA: [(f64, Rgb); 5] = [
    (0.0, Rgb(13, 8, 135)),
    (0.25, Rgb(126, 3, 168)),
    (0.5, Rgb(204, 71, 120)),
    (0.75, Rgb(248, 149, 64)),
    (1.0, Rgb(240, 249, 33)),
];

impl Colormap {
    fn stops(self) -> &'static [(f64, Rgb)] {
        match self {
            Colormap::Seismic => &SEISMIC,
            Colormap::Plasma => &PLASMA,
        }
    }

    /// Colour at position `t`, clamped to `[0, 1]`.
    pub fn at(self, t: f64) -> Rgb {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
        let stops = self.stops();
        for pair in stops.windows(2) {
            let (t0, c0) = pair[0];
            let (t1, c1) = pair[1];
            if t <= t1 {
                let f = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
                let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
                return Rgb(lerp(c0.0, c1.0), lerp(c0.1, c1.1), lerp(c0.2, c1.2));
            }
        }
        stops[stops.len() - 1].1
    }

    /// Colour for `value` within `[min, max]`.
    pub fn map(self, value: f64, min: f64, max: f64) -> Rgb {
        if max > min {
            self.at((value - min) / (max - min))
        } else {
            self.at(0.5)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seismic_is_white_in_the_middle() {
        assert_eq!(Colormap::Seismic.at(0.5), Rgb::WHITE);
        assert_eq!(Colormap::Seismic.map(0.0, -3.0, 3.0), Rgb::WHITE);
    }

    #[test]
    fn values_are_clamped() {
        assert_eq!(Colormap::Plasma.at(-1.0), Rgb(13, 8, 135));
        assert_eq!(Colormap::Plasma.at(2.0), Rgb(240, 249, 33));
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(Rgb(255, 0, 16).hex(), "#ff0010");
    }
}

//! SVG plotting.
//!
//! - colormap: value to colour mapping (seismic, plasma)
//! - figure: multi-panel figures, axes, legends, markers and colour bars

pub mod colormap;
pub mod figure;

pub use colormap::{Colormap, Rgb};
pub use figure::{ColorBar, Figure, Layout, Marker, Panel, Series, date_to_axis};

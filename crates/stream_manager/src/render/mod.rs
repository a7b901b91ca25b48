//! Map renderer adapter
//!
//! The map widget is an opaque surface behind `MapSurface`. `MapRenderer`
//! owns the marker and polyline registries and turns vehicle snapshots into
//! create / update / remove calls.

mod log_surface;
mod renderer;

pub use log_surface::{LogSurface, SurfaceCall};
pub use renderer::{MapRenderer, MarkerStyle, PALETTE};

/// Latitude / longitude pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<&contracts::PathPoint> for LatLng {
    fn from(point: &contracts::PathPoint) -> Self {
        Self {
            lat: point.lat,
            lng: point.lng,
        }
    }
}

/// Imperative drawing surface
pub trait MapSurface {
    type Marker;
    type Polyline;

    fn create_marker(&mut self, position: LatLng, style: &MarkerStyle) -> Self::Marker;

    fn move_marker(&mut self, marker: &mut Self::Marker, position: LatLng, style: &MarkerStyle);

    fn remove_marker(&mut self, marker: Self::Marker);

    fn create_polyline(&mut self, path: &[LatLng], color: &str) -> Self::Polyline;

    fn update_polyline(&mut self, polyline: &mut Self::Polyline, path: &[LatLng]);

    fn remove_polyline(&mut self, polyline: Self::Polyline);

    fn set_center(&mut self, center: LatLng, zoom: Option<u8>);
}

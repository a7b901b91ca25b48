use std::collections::{BTreeMap, HashMap};

use contracts::{VehicleId, VehicleStreamState};
use tracing::debug;

use super::{LatLng, MapSurface};

/// Marker / polyline colours. A vehicle keeps its colour while it is drawn;
/// a new vehicle takes the first colour no drawn vehicle is using.
pub const PALETTE: [&str; 8] = [
    "#FF0000", "#0000FF", "#00AA00", "#FF8800", "#8800FF", "#00AAAA", "#FF00AA", "#666666",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    pub color: &'static str,
    pub label: String,
    /// Compass bearing for the marker icon; `None` draws an unrotated icon
    pub heading: Option<f64>,
}

struct VehicleLayer<S: MapSurface> {
    marker: S::Marker,
    polyline: Option<S::Polyline>,
}

pub struct MapRenderer<S: MapSurface> {
    surface: S,
    layers: HashMap<VehicleId, VehicleLayer<S>>,
    colors: HashMap<VehicleId, &'static str>,
    follow: Option<VehicleId>,
    follow_zoom: Option<u8>,
}

impl<S: MapSurface> MapRenderer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            layers: HashMap::new(),
            colors: HashMap::new(),
            follow: None,
            follow_zoom: None,
        }
    }

    /// Keep the map centred on `vehicle_id` on every sync
    pub fn follow(&mut self, vehicle_id: Option<VehicleId>, zoom: Option<u8>) {
        self.follow = vehicle_id;
        self.follow_zoom = zoom;
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn rendered(&self) -> usize {
        self.layers.len()
    }

    /// Colour of a drawn vehicle
    pub fn color_of(&self, vehicle_id: &VehicleId) -> Option<&'static str> {
        self.colors.get(vehicle_id).copied()
    }

    fn assign_color(&mut self, vehicle_id: &VehicleId) -> &'static str {
        if let Some(color) = self.colors.get(vehicle_id).copied() {
            return color;
        }
        let color = PALETTE
            .iter()
            .copied()
            .find(|c| !self.colors.values().any(|used| used == c))
            .unwrap_or(PALETTE[self.colors.len() % PALETTE.len()]);
        self.colors.insert(vehicle_id.clone(), color);
        color
    }

    /// Bring the surface in line with `vehicles`.
    ///
    /// Vehicles without a last point are treated as absent.
    pub fn sync(&mut self, vehicles: &BTreeMap<VehicleId, VehicleStreamState>) {
        let gone: Vec<VehicleId> = self
            .layers
            .keys()
            .filter(|id| !vehicles.get(*id).is_some_and(VehicleStreamState::has_data))
            .cloned()
            .collect();
        for id in gone {
            self.remove(&id);
        }

        for (id, state) in vehicles {
            let Some(point) = state.last_point else {
                continue;
            };
            let style = MarkerStyle {
                color: self.assign_color(id),
                label: label_for(id, state),
                heading: point.heading,
            };
            let position = LatLng::from(&point);
            let path: Vec<LatLng> = state.path.iter().map(LatLng::from).collect();

            match self.layers.get_mut(id) {
                Some(layer) => {
                    self.surface.move_marker(&mut layer.marker, position, &style);
                    match layer.polyline.as_mut() {
                        Some(polyline) => self.surface.update_polyline(polyline, &path),
                        None if path.len() >= 2 => {
                            layer.polyline = Some(self.surface.create_polyline(&path, style.color));
                        }
                        None => {}
                    }
                }
                None => {
                    debug!(vehicle_id = %id, "Creating map marker");
                    let marker = self.surface.create_marker(position, &style);
                    let polyline =
                        (path.len() >= 2).then(|| self.surface.create_polyline(&path, style.color));
                    self.layers.insert(
                        id.clone(),
                        VehicleLayer { marker, polyline },
                    );
                }
            }

            if self.follow.as_ref() == Some(id) {
                self.surface.set_center(position, self.follow_zoom);
            }
        }
    }

    fn remove(&mut self, vehicle_id: &VehicleId) {
        self.colors.remove(vehicle_id);
        if let Some(layer) = self.layers.remove(vehicle_id) {
            debug!(vehicle_id = %vehicle_id, "Removing map marker");
            self.surface.remove_marker(layer.marker);
            if let Some(polyline) = layer.polyline {
                self.surface.remove_polyline(polyline);
            }
        }
    }

    /// Remove everything drawn
    pub fn clear(&mut self) {
        let ids: Vec<VehicleId> = self.layers.keys().cloned().collect();
        for id in ids {
            self.remove(&id);
        }
    }
}

fn label_for(id: &VehicleId, state: &VehicleStreamState) -> String {
    match &state.last_telemetry {
        Some(telemetry) => telemetry.display_label(),
        None => format!("Vehicle_{id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{LogSurface, SurfaceCall};
    use contracts::PathPoint;

    fn state(points: &[(f64, f64)]) -> VehicleStreamState {
        let path: Vec<PathPoint> = points
            .iter()
            .map(|&(lat, lng)| PathPoint {
                lat,
                lng,
                timestamp_ms: 0,
                speed_kmh: 0.0,
                heading: None,
            })
            .collect();
        VehicleStreamState {
            last_point: path.last().copied(),
            last_telemetry: None,
            path,
        }
    }

    #[test]
    fn test_creates_then_updates() {
        let mut renderer = MapRenderer::new(LogSurface::new());
        let mut vehicles = BTreeMap::new();
        vehicles.insert(VehicleId::from("a"), state(&[(1.0, 1.0)]));

        renderer.sync(&vehicles);
        assert_eq!(renderer.rendered(), 1);
        assert_eq!(renderer.surface().count(|c| matches!(c, SurfaceCall::CreateMarker { .. })), 1);
        assert_eq!(renderer.surface().count(|c| matches!(c, SurfaceCall::CreatePolyline { .. })), 0);

        vehicles.insert(VehicleId::from("a"), state(&[(1.0, 1.0), (2.0, 2.0)]));
        renderer.sync(&vehicles);
        assert_eq!(renderer.surface().count(|c| matches!(c, SurfaceCall::CreateMarker { .. })), 1);
        assert_eq!(renderer.surface().count(|c| matches!(c, SurfaceCall::MoveMarker { .. })), 1);
        assert_eq!(renderer.surface().count(|c| matches!(c, SurfaceCall::CreatePolyline { .. })), 1);
    }

    #[test]
    fn test_removes_absent_vehicles() {
        let mut renderer = MapRenderer::new(LogSurface::new());
        let mut vehicles = BTreeMap::new();
        vehicles.insert(VehicleId::from("a"), state(&[(1.0, 1.0), (2.0, 2.0)]));
        vehicles.insert(VehicleId::from("b"), state(&[(3.0, 3.0)]));
        renderer.sync(&vehicles);

        vehicles.remove(&VehicleId::from("a"));
        renderer.sync(&vehicles);
        assert_eq!(renderer.rendered(), 1);
        assert_eq!(renderer.surface().count(|c| matches!(c, SurfaceCall::RemoveMarker { .. })), 1);
        assert_eq!(renderer.surface().count(|c| matches!(c, SurfaceCall::RemovePolyline { .. })), 1);
    }

    #[test]
    fn test_stable_colors_and_follow() {
        let mut renderer = MapRenderer::new(LogSurface::new());
        renderer.follow(Some("b".into()), Some(15));
        let mut vehicles = BTreeMap::new();
        vehicles.insert(VehicleId::from("a"), state(&[(1.0, 1.0)]));
        vehicles.insert(VehicleId::from("b"), state(&[(3.0, 4.0)]));
        renderer.sync(&vehicles);

        assert_eq!(renderer.color_of(&"a".into()), Some(PALETTE[0]));
        assert_eq!(renderer.color_of(&"b".into()), Some(PALETTE[1]));
        assert_eq!(
            renderer.surface().calls().last(),
            Some(&SurfaceCall::SetCenter {
                center: LatLng { lat: 3.0, lng: 4.0 },
                zoom: Some(15)
            })
        );
    }

    #[test]
    fn test_removed_vehicle_releases_color() {
        let mut renderer = MapRenderer::new(LogSurface::new());
        let mut vehicles = BTreeMap::new();
        vehicles.insert(VehicleId::from("a"), state(&[(1.0, 1.0)]));
        vehicles.insert(VehicleId::from("b"), state(&[(2.0, 2.0)]));
        renderer.sync(&vehicles);

        vehicles.remove(&VehicleId::from("a"));
        renderer.sync(&vehicles);
        assert_eq!(renderer.color_of(&"a".into()), None);
        assert_eq!(renderer.color_of(&"b".into()), Some(PALETTE[1]));

        vehicles.insert(VehicleId::from("c"), state(&[(3.0, 3.0)]));
        renderer.sync(&vehicles);
        assert_eq!(renderer.color_of(&"c".into()), Some(PALETTE[0]));
        assert_eq!(renderer.color_of(&"b".into()), Some(PALETTE[1]));
    }

    #[test]
    fn test_default_label() {
        let mut renderer = MapRenderer::new(LogSurface::new());
        let mut vehicles = BTreeMap::new();
        vehicles.insert(VehicleId::from("veh-0007"), state(&[(1.0, 1.0)]));
        renderer.sync(&vehicles);
        assert!(matches!(
            renderer.surface().calls().first(),
            Some(SurfaceCall::CreateMarker { label, .. }) if label == "Vehicle_veh-0007"
        ));
    }
}

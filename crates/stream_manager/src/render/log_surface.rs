//! Headless surface: records every call and logs it through `tracing`.
//! Used by the CLI and in tests.

use tracing::debug;

use super::{LatLng, MapSurface, MarkerStyle};

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    CreateMarker {
        id: u64,
        position: LatLng,
        label: String,
        color: &'static str,
    },
    MoveMarker {
        id: u64,
        position: LatLng,
        heading: Option<f64>,
    },
    RemoveMarker {
        id: u64,
    },
    CreatePolyline {
        id: u64,
        points: usize,
    },
    UpdatePolyline {
        id: u64,
        points: usize,
    },
    RemovePolyline {
        id: u64,
    },
    SetCenter {
        center: LatLng,
        zoom: Option<u8>,
    },
}

#[derive(Debug)]
pub struct LogSurface {
    next_id: u64,
    calls: Vec<SurfaceCall>,
    keep_history: bool,
}

impl Default for LogSurface {
    fn default() -> Self {
        Self {
            next_id: 0,
            calls: Vec::new(),
            keep_history: true,
        }
    }
}

impl LogSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log only; `calls()` stays empty. For long-running processes.
    pub fn without_history() -> Self {
        Self {
            keep_history: false,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn count(&self, predicate: impl Fn(&SurfaceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, call: SurfaceCall) {
        debug!(call = ?call, "map surface");
        if self.keep_history {
            self.calls.push(call);
        }
    }
}

impl MapSurface for LogSurface {
    type Marker = u64;
    type Polyline = u64;

    fn create_marker(&mut self, position: LatLng, style: &MarkerStyle) -> u64 {
        let id = self.next();
        self.record(SurfaceCall::CreateMarker {
            id,
            position,
            label: style.label.clone(),
            color: style.color,
        });
        id
    }

    fn move_marker(&mut self, marker: &mut u64, position: LatLng, style: &MarkerStyle) {
        self.record(SurfaceCall::MoveMarker {
            id: *marker,
            position,
            heading: style.heading,
        });
    }

    fn remove_marker(&mut self, marker: u64) {
        self.record(SurfaceCall::RemoveMarker { id: marker });
    }

    fn create_polyline(&mut self, path: &[LatLng], _color: &str) -> u64 {
        let id = self.next();
        self.record(SurfaceCall::CreatePolyline {
            id,
            points: path.len(),
        });
        id
    }

    fn update_polyline(&mut self, polyline: &mut u64, path: &[LatLng]) {
        self.record(SurfaceCall::UpdatePolyline {
            id: *polyline,
            points: path.len(),
        });
    }

    fn remove_polyline(&mut self, polyline: u64) {
        self.record(SurfaceCall::RemovePolyline { id: polyline });
    }

    fn set_center(&mut self, center: LatLng, zoom: Option<u8>) {
        self.record(SurfaceCall::SetCenter { center, zoom });
    }
}

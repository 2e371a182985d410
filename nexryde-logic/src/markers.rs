use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    live_set::LivePositionSet,
    location::Location,
    record::{PositionRecord, Role, VehicleClass},
};

/// Fixed viewport padding used when fitting bounds, in pixels
pub const FIT_PADDING_PX: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerIcon {
    Person,
    Tricycle,
    Car,
    Bus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub icon: MarkerIcon,
    pub color: &'static str,
    /// Glyph rotation, follows the actor's heading
    pub rotation_deg: f64,
}

/// Marker appearance is a pure function of role, vehicle class and heading
pub fn marker_style(record: &PositionRecord) -> MarkerStyle {
    match record.role {
        Role::Passenger => MarkerStyle {
            icon: MarkerIcon::Person,
            color: "#2563eb",
            rotation_deg: 0.0,
        },
        Role::Driver => {
            let class = record
                .vehicle_label
                .as_deref()
                .and_then(VehicleClass::from_label);
            let (icon, color) = match class {
                Some(VehicleClass::Pragia) => (MarkerIcon::Tricycle, "#f59e0b"),
                Some(VehicleClass::Taxi) => (MarkerIcon::Car, "#16a34a"),
                Some(VehicleClass::Shuttle) => (MarkerIcon::Bus, "#7c3aed"),
                None => (MarkerIcon::Car, "#6b7280"),
            };
            MarkerStyle {
                icon,
                color,
                rotation_deg: record.heading,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Rectangle of coordinates a viewport should cover
pub struct Bounds {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl Bounds {
    pub fn of(loc: Location) -> Self {
        Self {
            min_lat: loc.lat,
            min_lng: loc.lng,
            max_lat: loc.lat,
            max_lng: loc.lng,
        }
    }

    pub fn extend(&mut self, loc: Location) {
        self.min_lat = self.min_lat.min(loc.lat);
        self.min_lng = self.min_lng.min(loc.lng);
        self.max_lat = self.max_lat.max(loc.lat);
        self.max_lng = self.max_lng.max(loc.lng);
    }
}

/// Rendering sink for a tile-based map widget. Implementations perform no
/// business logic, they just execute marker and viewport commands.
pub trait MapSurface {
    fn add_marker(&mut self, id: Uuid, loc: Location, style: MarkerStyle);
    fn move_marker(&mut self, id: Uuid, loc: Location, style: MarkerStyle);
    fn remove_marker(&mut self, id: Uuid);
    fn fit_bounds(&mut self, bounds: Bounds, padding_px: u32);
}

#[derive(Debug, Default)]
/// Keeps one marker per live actor in sync with the position set without
/// leaking markers. Re-invoking with an unchanged set issues no commands.
pub struct MarkerReconciler {
    shown: HashMap<Uuid, (Location, MarkerStyle)>,
    fitted: bool,
    had_markers: bool,
}

impl MarkerReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync(
        &mut self,
        live: &LivePositionSet,
        viewer: Option<Location>,
        surface: &mut impl MapSurface,
    ) {
        let gone = self
            .shown
            .keys()
            .copied()
            .filter(|id| live.get(id).is_none())
            .collect::<Vec<_>>();
        for id in gone {
            self.shown.remove(&id);
            surface.remove_marker(id);
        }

        for record in live.iter() {
            let loc = record.location();
            let style = marker_style(record);
            match self.shown.get(&record.user_id).copied() {
                None => {
                    surface.add_marker(record.user_id, loc, style);
                    self.shown.insert(record.user_id, (loc, style));
                }
                Some((shown_loc, shown_style)) if shown_loc != loc || shown_style != style => {
                    surface.move_marker(record.user_id, loc, style);
                    self.shown.insert(record.user_id, (loc, style));
                }
                Some(_) => {}
            }
        }

        self.refit(viewer, surface);
        self.had_markers = !self.shown.is_empty();
    }

    /// Recenter on the first own-location fix and whenever markers first
    /// appear on an empty map
    fn refit(&mut self, viewer: Option<Location>, surface: &mut impl MapSurface) {
        let first_fix = !self.fitted && viewer.is_some();
        let markers_appeared = !self.had_markers && !self.shown.is_empty();
        if !first_fix && !markers_appeared {
            return;
        }

        let mut points = self.shown.values().map(|(loc, _)| *loc);
        let Some(seed) = viewer.or_else(|| points.next()) else {
            return;
        };
        let mut bounds = Bounds::of(seed);
        for loc in points {
            bounds.extend(loc);
        }

        surface.fit_bounds(bounds, FIT_PADDING_PX);
        self.fitted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreChange;
    use chrono::Utc;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Add(Uuid),
        Move(Uuid),
        Remove(Uuid),
        Fit(Bounds),
    }

    #[derive(Debug, Default)]
    struct RecordingSurface {
        ops: Vec<Op>,
    }

    impl MapSurface for RecordingSurface {
        fn add_marker(&mut self, id: Uuid, _loc: Location, _style: MarkerStyle) {
            self.ops.push(Op::Add(id));
        }
        fn move_marker(&mut self, id: Uuid, _loc: Location, _style: MarkerStyle) {
            self.ops.push(Op::Move(id));
        }
        fn remove_marker(&mut self, id: Uuid) {
            self.ops.push(Op::Remove(id));
        }
        fn fit_bounds(&mut self, bounds: Bounds, _padding_px: u32) {
            self.ops.push(Op::Fit(bounds));
        }
    }

    fn record(user_id: Uuid, role: Role, lat: f64) -> PositionRecord {
        PositionRecord {
            user_id,
            role,
            lat,
            lng: -0.18,
            heading: 45.0,
            speed: 10.0,
            vehicle_label: Some("Pragia UH-07".to_string()),
            trip_id: None,
            updated_at: Utc::now(),
        }
    }

    fn set_of(records: Vec<PositionRecord>) -> LivePositionSet {
        let mut set = LivePositionSet::new(120);
        let now = Utc::now();
        for r in records {
            set.apply(StoreChange::Upsert(r), now);
        }
        set
    }

    #[test]
    fn test_style_is_pure_projection() {
        let driver = record(Uuid::new_v4(), Role::Driver, 5.6);
        let style = marker_style(&driver);
        assert_eq!(style.icon, MarkerIcon::Tricycle);
        assert_eq!(style.rotation_deg, 45.0);

        let passenger = record(Uuid::new_v4(), Role::Passenger, 5.6);
        let style = marker_style(&passenger);
        assert_eq!(style.icon, MarkerIcon::Person);
        assert_eq!(style.rotation_deg, 0.0);
    }

    #[test]
    fn test_sync_is_idempotent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let set = set_of(vec![record(a, Role::Driver, 5.60), record(b, Role::Passenger, 5.61)]);

        let mut surface = RecordingSurface::default();
        let mut markers = MarkerReconciler::new();

        markers.sync(&set, None, &mut surface);
        assert_eq!(surface.ops.len(), 3, "Two adds and one fit expected");

        surface.ops.clear();
        markers.sync(&set, None, &mut surface);
        assert!(
            surface.ops.is_empty(),
            "Unchanged set must issue no commands, got {:?}",
            surface.ops
        );
    }

    #[test]
    fn test_sync_moves_and_removes() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let set = set_of(vec![record(a, Role::Driver, 5.60), record(b, Role::Driver, 5.61)]);

        let mut surface = RecordingSurface::default();
        let mut markers = MarkerReconciler::new();
        markers.sync(&set, None, &mut surface);

        // A moves, B disappears
        let set = set_of(vec![record(a, Role::Driver, 5.62)]);
        surface.ops.clear();
        markers.sync(&set, None, &mut surface);

        assert!(surface.ops.contains(&Op::Move(a)));
        assert!(surface.ops.contains(&Op::Remove(b)));
        assert_eq!(surface.ops.len(), 2);
    }

    #[test]
    fn test_fit_on_first_fix_and_reappearance() {
        let a = Uuid::new_v4();
        let viewer = Location::new(5.55, -0.20);

        let mut surface = RecordingSurface::default();
        let mut markers = MarkerReconciler::new();

        // Empty set but we know where the viewer is: center on them
        markers.sync(&set_of(vec![]), Some(viewer), &mut surface);
        assert!(matches!(surface.ops.as_slice(), [Op::Fit(_)]));

        // Steady state: no refit
        surface.ops.clear();
        markers.sync(&set_of(vec![record(a, Role::Driver, 5.60)]), Some(viewer), &mut surface);
        let fits = surface.ops.iter().filter(|op| matches!(op, Op::Fit(_))).count();
        assert_eq!(fits, 1, "Markers appearing on an empty map must refit");

        surface.ops.clear();
        markers.sync(&set_of(vec![record(a, Role::Driver, 5.60)]), Some(viewer), &mut surface);
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn test_fit_covers_viewer_and_markers() {
        let a = Uuid::new_v4();
        let viewer = Location::new(5.55, -0.20);
        let set = set_of(vec![record(a, Role::Driver, 5.65)]);

        let mut surface = RecordingSurface::default();
        let mut markers = MarkerReconciler::new();
        markers.sync(&set, Some(viewer), &mut surface);

        let bounds = surface
            .ops
            .iter()
            .find_map(|op| if let Op::Fit(b) = op { Some(*b) } else { None })
            .expect("No fit issued");
        assert!(bounds.min_lat <= 5.55 && bounds.max_lat >= 5.65);
    }
}

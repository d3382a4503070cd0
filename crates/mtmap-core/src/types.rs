// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the mtmap control bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MtMapError, Result};

/// Unique identifier for one plugin attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque overlay handle. Issued from 1 upwards and never reused within a
/// registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayId(pub i64);

impl std::fmt::Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the host UI framework assigns to an embedded map surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub i64);

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(MtMapError::invalid(format!(
                "latitude out of range: {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(MtMapError::invalid(format!(
                "longitude out of range: {}",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Packed 32-bit ARGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Argb(pub u32);

impl Argb {
    /// Decode a color integer as sent by the host.
    ///
    /// Hosts with signed 32-bit ints send opaque colors as negative numbers,
    /// so both the `i32` and `u32` ranges are accepted.
    pub fn from_wire(value: i64) -> Result<Self> {
        if let Ok(v) = u32::try_from(value) {
            return Ok(Self(v));
        }
        if let Ok(v) = i32::try_from(value) {
            return Ok(Self(v as u32));
        }
        Err(MtMapError::invalid(format!("color out of range: {value}")))
    }

    pub fn alpha(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn red(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(&self) -> u8 {
        self.0 as u8
    }
}

/// Point marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub position: LatLng,
    pub title: Option<String>,
    pub snippet: Option<String>,
    /// Asset path or platform resource name for a custom icon.
    pub icon: Option<String>,
}

/// Open line through an ordered list of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<LatLng>,
    pub color: Argb,
    pub width: f64,
    /// Great-circle interpolation between points instead of planar segments.
    pub geodesic: bool,
}

/// Closed ring; the last point implicitly joins the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<LatLng>,
    pub fill_color: Argb,
    pub stroke_color: Argb,
    pub stroke_width: f64,
}

/// The three overlay kinds the bridge manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlayKind {
    Marker,
    Polyline,
    Polygon,
}

impl OverlayKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Marker => "marker",
            Self::Polyline => "polyline",
            Self::Polygon => "polygon",
        }
    }
}

/// A map overlay descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Overlay {
    Marker(Marker),
    Polyline(Polyline),
    Polygon(Polygon),
}

impl Overlay {
    pub fn kind(&self) -> OverlayKind {
        match self {
            Self::Marker(_) => OverlayKind::Marker,
            Self::Polyline(_) => OverlayKind::Polyline,
            Self::Polygon(_) => OverlayKind::Polygon,
        }
    }

    /// Check the geometry is well-formed before it reaches a renderer.
    ///
    /// Lines need at least two points and rings at least three; an empty
    /// point list is always rejected.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Marker(m) => m.position.validate(),
            Self::Polyline(p) => {
                validate_points(&p.points, 2, "polyline")?;
                validate_width(p.width, "width")
            }
            Self::Polygon(p) => {
                validate_points(&p.points, 3, "polygon")?;
                validate_width(p.stroke_width, "strokeWidth")
            }
        }
    }
}

fn validate_points(points: &[LatLng], min: usize, what: &str) -> Result<()> {
    if points.is_empty() {
        return Err(MtMapError::invalid(format!("{what} points must not be empty")));
    }
    if points.len() < min {
        return Err(MtMapError::invalid(format!(
            "{what} needs at least {min} points, got {}",
            points.len()
        )));
    }
    points.iter().try_for_each(LatLng::validate)
}

fn validate_width(width: f64, field: &str) -> Result<()> {
    if !width.is_finite() || width < 0.0 {
        return Err(MtMapError::invalid(format!("{field} must be a non-negative number")));
    }
    Ok(())
}

/// Base map type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MapType {
    Standard,
    Satellite,
    Hybrid,
    Terrain,
}

/// Style descriptor passed to the renderer.
///
/// Well-known keys are decoded; anything else is preserved verbatim in
/// `extra` so SDK-specific options pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_type: Option<MapType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildings_enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// On-map UI controls that can be toggled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapControl {
    MyLocation,
    MyLocationButton,
    ZoomControls,
    Compass,
    ScaleBar,
}

/// Current toggle state of every [`MapControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub my_location: bool,
    pub my_location_button: bool,
    pub zoom_controls: bool,
    pub compass: bool,
    pub scale_bar: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            my_location: false,
            my_location_button: false,
            zoom_controls: true,
            compass: true,
            scale_bar: false,
        }
    }
}

impl ControlState {
    pub fn set(&mut self, control: MapControl, enabled: bool) {
        match control {
            MapControl::MyLocation => self.my_location = enabled,
            MapControl::MyLocationButton => self.my_location_button = enabled,
            MapControl::ZoomControls => self.zoom_controls = enabled,
            MapControl::Compass => self.compass = enabled,
            MapControl::ScaleBar => self.scale_bar = enabled,
        }
    }

    pub fn get(&self, control: MapControl) -> bool {
        match control {
            MapControl::MyLocation => self.my_location,
            MapControl::MyLocationButton => self.my_location_button,
            MapControl::ZoomControls => self.zoom_controls,
            MapControl::Compass => self.compass,
            MapControl::ScaleBar => self.scale_bar,
        }
    }
}

/// Physical size of an embedded surface, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewSize {
    pub width: f64,
    pub height: f64,
}

impl ViewSize {
    pub fn new(width: f64, height: f64) -> Result<Self> {
        if !(width.is_finite() && width > 0.0) || !(height.is_finite() && height > 0.0) {
            return Err(MtMapError::invalid(format!(
                "view size must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }
}

/// Parameters the host passes when it mounts an embedded map view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationParams {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub zoom: Option<f64>,
    #[serde(default)]
    pub style: Option<MapStyle>,
}

impl CreationParams {
    /// The initial camera target, present only when both coordinates are.
    pub fn initial_center(&self) -> Option<LatLng> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        }
    }
}

/// A single reported position from the location service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in metres.
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            timestamp: Utc::now(),
        }
    }
}

/// Something the continuous location subscription reported.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Fix(LocationFix),
    Error(String),
}

/// Authorization state of the device location service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authorization {
    Granted,
    Denied,
    NotDetermined,
}

/// Handle returned by the location service for an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub u64);

/// Travel mode for route calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportMode {
    Driving,
    Walking,
    Cycling,
    Transit,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driving => "driving",
            Self::Walking => "walking",
            Self::Cycling => "cycling",
            Self::Transit => "transit",
        }
    }
}

impl std::str::FromStr for TransportMode {
    type Err = MtMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "driving" => Ok(Self::Driving),
            "walking" => Ok(Self::Walking),
            "cycling" | "riding" => Ok(Self::Cycling),
            "transit" => Ok(Self::Transit),
            other => Err(MtMapError::invalid(format!("unknown transportMode: {other}"))),
        }
    }
}

/// A routing request between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub start: LatLng,
    pub end: LatLng,
    pub mode: TransportMode,
}

/// A route computed by the routing backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub start: LatLng,
    pub end: LatLng,
    pub transport_mode: TransportMode,
    /// Metres.
    pub distance: f64,
    /// Seconds.
    pub duration: f64,
    pub points: Vec<LatLng>,
}

/// A nearby-place search.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceQuery {
    pub center: LatLng,
    /// Metres.
    pub radius: f64,
    pub keyword: Option<String>,
    pub category: Option<String>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(flatten)]
    pub position: LatLng,
    pub address: Option<String>,
    /// Metres from the query center.
    pub distance: Option<f64>,
}

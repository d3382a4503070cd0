// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire protocol: command envelopes, replies, unsolicited events, and the
// per-method argument schema.
//
// Envelope:  {"method": "addMarker", "arguments": {"latitude": 39.9, ...}}
// Replies:   {"success": <value>}
//            {"errorCode": "INVALID_ARGUMENT", "errorMessage": "..."}
//            {"notImplemented": true}
// Events:    {"method": "onLocationUpdate", "arguments": {...}}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use mtmap_core::error::{MtMapError, Result};
use mtmap_core::types::{LatLng, LocationEvent};

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// One command as sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default, deserialize_with = "nullable_map")]
    pub arguments: Map<String, Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// A call with no arguments.
    pub fn bare(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }
}

fn nullable_map<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Exactly one of these answers every [`MethodCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Success {
        success: Value,
    },
    Error {
        #[serde(rename = "errorCode")]
        code: String,
        #[serde(rename = "errorMessage")]
        message: String,
    },
    NotImplemented {
        #[serde(rename = "notImplemented")]
        not_implemented: bool,
    },
}

impl Reply {
    pub fn success(value: impl Into<Value>) -> Self {
        Self::Success {
            success: value.into(),
        }
    }

    pub fn not_implemented() -> Self {
        Self::NotImplemented {
            not_implemented: true,
        }
    }

    /// Structured error reply. `NotImplemented` errors become the dedicated
    /// not-implemented outcome rather than an error code.
    pub fn from_error(err: &MtMapError) -> Self {
        if let MtMapError::NotImplemented(_) = err {
            return Self::not_implemented();
        }
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Success { success } => Some(success),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<Result<Value>> for Reply {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => Self::from_error(&e),
        }
    }
}

/// Unsolicited push on the global channel. No reply is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "arguments", rename_all = "camelCase")]
pub enum Event {
    OnLocationUpdate {
        latitude: f64,
        longitude: f64,
        accuracy: f64,
    },
    OnLocationError {
        description: String,
    },
}

impl From<LocationEvent> for Event {
    fn from(event: LocationEvent) -> Self {
        match event {
            LocationEvent::Fix(fix) => Self::OnLocationUpdate {
                latitude: fix.latitude,
                longitude: fix.longitude,
                accuracy: fix.accuracy,
            },
            LocationEvent::Error(description) => Self::OnLocationError { description },
        }
    }
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

/// Every command the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GetPlatformVersion,
    Initialize,
    ShowMap,
    HideMap,
    AddMarker,
    RemoveMarker,
    AddPolyline,
    RemovePolyline,
    AddPolygon,
    RemovePolygon,
    SetMapCenter,
    AnimateCamera,
    SetMapStyle,
    EnableMyLocation,
    EnableMyLocationButton,
    EnableZoomControls,
    EnableCompass,
    EnableScaleBar,
    GetCurrentLocation,
    StartLocationUpdates,
    StopLocationUpdates,
    CalculateRoute,
    SearchNearby,
}

impl Method {
    pub const ALL: [Method; 23] = [
        Self::GetPlatformVersion,
        Self::Initialize,
        Self::ShowMap,
        Self::HideMap,
        Self::AddMarker,
        Self::RemoveMarker,
        Self::AddPolyline,
        Self::RemovePolyline,
        Self::AddPolygon,
        Self::RemovePolygon,
        Self::SetMapCenter,
        Self::AnimateCamera,
        Self::SetMapStyle,
        Self::EnableMyLocation,
        Self::EnableMyLocationButton,
        Self::EnableZoomControls,
        Self::EnableCompass,
        Self::EnableScaleBar,
        Self::GetCurrentLocation,
        Self::StartLocationUpdates,
        Self::StopLocationUpdates,
        Self::CalculateRoute,
        Self::SearchNearby,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetPlatformVersion => "getPlatformVersion",
            Self::Initialize => "initialize",
            Self::ShowMap => "showMap",
            Self::HideMap => "hideMap",
            Self::AddMarker => "addMarker",
            Self::RemoveMarker => "removeMarker",
            Self::AddPolyline => "addPolyline",
            Self::RemovePolyline => "removePolyline",
            Self::AddPolygon => "addPolygon",
            Self::RemovePolygon => "removePolygon",
            Self::SetMapCenter => "setMapCenter",
            Self::AnimateCamera => "animateCamera",
            Self::SetMapStyle => "setMapStyle",
            Self::EnableMyLocation => "enableMyLocation",
            Self::EnableMyLocationButton => "enableMyLocationButton",
            Self::EnableZoomControls => "enableZoomControls",
            Self::EnableCompass => "enableCompass",
            Self::EnableScaleBar => "enableScaleBar",
            Self::GetCurrentLocation => "getCurrentLocation",
            Self::StartLocationUpdates => "startLocationUpdates",
            Self::StopLocationUpdates => "stopLocationUpdates",
            Self::CalculateRoute => "calculateRoute",
            Self::SearchNearby => "searchNearby",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Commands that only make sense on the session-global channel.
    /// Embedded views answer them with not-implemented.
    pub fn is_global_only(&self) -> bool {
        matches!(
            self,
            Self::GetPlatformVersion
                | Self::Initialize
                | Self::ShowMap
                | Self::HideMap
                | Self::GetCurrentLocation
                | Self::StartLocationUpdates
                | Self::StopLocationUpdates
                | Self::CalculateRoute
                | Self::SearchNearby
        )
    }

    /// Error code for handler failures that are not otherwise classified,
    /// plus the verb phrase used in their message.
    pub fn failure(&self) -> (&'static str, &'static str) {
        match self {
            Self::GetPlatformVersion => ("PLATFORM_VERSION_ERROR", "get platform version"),
            Self::Initialize => ("INITIALIZATION_ERROR", "initialize map"),
            Self::ShowMap => ("SHOW_MAP_ERROR", "show map"),
            Self::HideMap => ("HIDE_MAP_ERROR", "hide map"),
            Self::AddMarker => ("ADD_MARKER_ERROR", "add marker"),
            Self::RemoveMarker => ("REMOVE_MARKER_ERROR", "remove marker"),
            Self::AddPolyline => ("ADD_POLYLINE_ERROR", "add polyline"),
            Self::RemovePolyline => ("REMOVE_POLYLINE_ERROR", "remove polyline"),
            Self::AddPolygon => ("ADD_POLYGON_ERROR", "add polygon"),
            Self::RemovePolygon => ("REMOVE_POLYGON_ERROR", "remove polygon"),
            Self::SetMapCenter => ("SET_MAP_CENTER_ERROR", "set map center"),
            Self::AnimateCamera => ("ANIMATE_CAMERA_ERROR", "animate camera"),
            Self::SetMapStyle => ("SET_MAP_STYLE_ERROR", "set map style"),
            Self::EnableMyLocation => ("ENABLE_MY_LOCATION_ERROR", "toggle my location"),
            Self::EnableMyLocationButton => {
                ("ENABLE_MY_LOCATION_BUTTON_ERROR", "toggle my location button")
            }
            Self::EnableZoomControls => ("ENABLE_ZOOM_CONTROLS_ERROR", "toggle zoom controls"),
            Self::EnableCompass => ("ENABLE_COMPASS_ERROR", "toggle compass"),
            Self::EnableScaleBar => ("ENABLE_SCALE_BAR_ERROR", "toggle scale bar"),
            Self::GetCurrentLocation => ("LOCATION_ERROR", "get location"),
            Self::StartLocationUpdates => ("LOCATION_UPDATES_ERROR", "start location updates"),
            Self::StopLocationUpdates => ("STOP_LOCATION_UPDATES_ERROR", "stop location updates"),
            Self::CalculateRoute => ("CALCULATE_ROUTE_ERROR", "calculate route"),
            Self::SearchNearby => ("SEARCH_NEARBY_ERROR", "search nearby"),
        }
    }

    /// Argument schema, checked before any handler runs.
    pub fn schema(&self) -> &'static [Field] {
        match self {
            Self::GetPlatformVersion
            | Self::HideMap
            | Self::GetCurrentLocation
            | Self::StartLocationUpdates
            | Self::StopLocationUpdates => &[],
            Self::Initialize => schema::INITIALIZE,
            Self::ShowMap => schema::SHOW_MAP,
            Self::AddMarker => schema::ADD_MARKER,
            Self::RemoveMarker => schema::REMOVE_MARKER,
            Self::AddPolyline => schema::ADD_POLYLINE,
            Self::RemovePolyline => schema::REMOVE_POLYLINE,
            Self::AddPolygon => schema::ADD_POLYGON,
            Self::RemovePolygon => schema::REMOVE_POLYGON,
            Self::SetMapCenter => schema::SET_MAP_CENTER,
            Self::AnimateCamera => schema::ANIMATE_CAMERA,
            Self::SetMapStyle => schema::SET_MAP_STYLE,
            Self::EnableMyLocation
            | Self::EnableMyLocationButton
            | Self::EnableZoomControls
            | Self::EnableCompass
            | Self::EnableScaleBar => schema::TOGGLE,
            Self::CalculateRoute => schema::CALCULATE_ROUTE,
            Self::SearchNearby => schema::SEARCH_NEARBY,
        }
    }

    /// Check `arguments` against [`schema`](Self::schema).
    ///
    /// All problems are collected so the message names every missing or
    /// mistyped field at once. Explicit `null` counts as absent.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<()> {
        let problems: Vec<String> = self
            .schema()
            .iter()
            .filter_map(|field| match arguments.get(field.name) {
                None | Some(Value::Null) if field.required => {
                    Some(format!("{} ({}, missing)", field.name, field.ty.describe()))
                }
                None | Some(Value::Null) => None,
                Some(value) if field.ty.accepts(value) => None,
                Some(_) => Some(format!("{} ({})", field.name, field.ty.describe())),
            })
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(MtMapError::invalid(format!(
                "Invalid arguments for {}: {}",
                self.name(),
                problems.join(", ")
            )))
        }
    }
}

mod schema {
    use super::Field;
    use super::FieldType::{Bool, Integer, Number, Object, PointList, String};

    pub const INITIALIZE: &[Field] = &[Field::required("apiKey", String)];

    pub const SHOW_MAP: &[Field] = &[
        Field::required("latitude", Number),
        Field::required("longitude", Number),
        Field::optional("zoom", Number),
        Field::optional("title", String),
        Field::optional("snippet", String),
    ];

    pub const ADD_MARKER: &[Field] = &[
        Field::required("latitude", Number),
        Field::required("longitude", Number),
        Field::optional("title", String),
        Field::optional("snippet", String),
        Field::optional("iconPath", String),
    ];

    pub const REMOVE_MARKER: &[Field] = &[Field::required("markerId", Integer)];

    pub const ADD_POLYLINE: &[Field] = &[
        Field::required("points", PointList),
        Field::required("color", Integer),
        Field::required("width", Number),
        Field::optional("geodesic", Bool),
    ];

    pub const REMOVE_POLYLINE: &[Field] = &[Field::required("polylineId", Integer)];

    pub const ADD_POLYGON: &[Field] = &[
        Field::required("points", PointList),
        Field::required("fillColor", Integer),
        Field::required("strokeColor", Integer),
        Field::required("strokeWidth", Number),
    ];

    pub const REMOVE_POLYGON: &[Field] = &[Field::required("polygonId", Integer)];

    pub const SET_MAP_CENTER: &[Field] = &[
        Field::required("latitude", Number),
        Field::required("longitude", Number),
        Field::optional("zoom", Number),
    ];

    pub const ANIMATE_CAMERA: &[Field] = &[
        Field::required("latitude", Number),
        Field::required("longitude", Number),
        Field::optional("zoom", Number),
        Field::optional("duration", Integer),
    ];

    pub const SET_MAP_STYLE: &[Field] = &[Field::required("style", Object)];

    pub const TOGGLE: &[Field] = &[Field::required("enabled", Bool)];

    pub const CALCULATE_ROUTE: &[Field] = &[
        Field::required("startLatitude", Number),
        Field::required("startLongitude", Number),
        Field::required("endLatitude", Number),
        Field::required("endLongitude", Number),
        Field::optional("transportMode", String),
    ];

    pub const SEARCH_NEARBY: &[Field] = &[
        Field::required("latitude", Number),
        Field::required("longitude", Number),
        Field::required("radius", Number),
        Field::optional("keyword", String),
        Field::optional("category", String),
    ];
}

/// One entry of a method's argument schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

impl Field {
    const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: true,
        }
    }

    const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Any JSON number.
    Number,
    /// A JSON number without a fractional part.
    Integer,
    Bool,
    String,
    Object,
    /// A list of `{latitude, longitude}` objects.
    PointList,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::String => value.is_string(),
            Self::Object => value.is_object(),
            Self::PointList => value
                .as_array()
                .is_some_and(|points| points.iter().all(is_point)),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Object => "map",
            Self::PointList => "list of {latitude, longitude}",
        }
    }
}

fn is_point(value: &Value) -> bool {
    value.get("latitude").is_some_and(Value::is_number)
        && value.get("longitude").is_some_and(Value::is_number)
}

// ---------------------------------------------------------------------------
// Typed argument access
// ---------------------------------------------------------------------------

/// Read-only view over validated arguments.
///
/// Accessors still return `Result` so a handler reading a field its schema
/// does not declare fails cleanly instead of panicking.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a>(pub &'a Map<String, Value>);

impl<'a> Args<'a> {
    fn present(&self, name: &str) -> Option<&'a Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    fn missing(name: &str) -> MtMapError {
        MtMapError::invalid(format!("missing argument: {name}"))
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        self.opt_f64(name)?.ok_or_else(|| Self::missing(name))
    }

    pub fn opt_f64(&self, name: &str) -> Result<Option<f64>> {
        self.present(name)
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| MtMapError::invalid(format!("{name} must be a number")))
            })
            .transpose()
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        self.opt_i64(name)?.ok_or_else(|| Self::missing(name))
    }

    pub fn opt_i64(&self, name: &str) -> Result<Option<i64>> {
        self.present(name)
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| MtMapError::invalid(format!("{name} must be an integer")))
            })
            .transpose()
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        self.opt_bool(name)?.ok_or_else(|| Self::missing(name))
    }

    pub fn opt_bool(&self, name: &str) -> Result<Option<bool>> {
        self.present(name)
            .map(|v| {
                v.as_bool()
                    .ok_or_else(|| MtMapError::invalid(format!("{name} must be a bool")))
            })
            .transpose()
    }

    pub fn str(&self, name: &str) -> Result<&'a str> {
        self.opt_str(name)?.ok_or_else(|| Self::missing(name))
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<&'a str>> {
        self.present(name)
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| MtMapError::invalid(format!("{name} must be a string")))
            })
            .transpose()
    }

    /// Decode a field into any deserializable type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.present(name).ok_or_else(|| Self::missing(name))?;
        T::deserialize(value)
            .map_err(|e| MtMapError::invalid(format!("{name} is malformed: {e}")))
    }

    pub fn lat_lng(&self, lat: &str, lng: &str) -> Result<LatLng> {
        let point = LatLng::new(self.f64(lat)?, self.f64(lng)?);
        point.validate()?;
        Ok(point)
    }

    pub fn points(&self, name: &str) -> Result<Vec<LatLng>> {
        self.decode(name)
    }
}

//! Declarative choropleth figures.
//!
//! A [`Figure`] serializes to the JSON shape Plotly expects for a
//! `choroplethmapbox` trace, so the browser only has to hand it to
//! `Plotly.react`.

use crate::config::MapConfig;
use crate::error::RenderError;
use crate::types::UnifiedTable;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry};
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// OrRd, nine classes, low to high.
const OR_RD: [&str; 9] = [
    "#fff7ec", "#fee8c8", "#fdd49e", "#fdbb84", "#fc8d59", "#ef6548", "#d7301f", "#b30000",
    "#7f0000",
];

/// Continuous ramp defined by evenly spaced hex stops.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    stops: Vec<[u8; 3]>,
}

impl ColorScale {
    pub fn or_rd() -> Self {
        Self {
            stops: OR_RD.iter().map(|hex| hex_to_rgb(hex)).collect(),
        }
    }

    /// `[position, color]` pairs as Plotly takes them.
    pub fn plotly_stops(&self) -> Vec<(f64, String)> {
        let last = (self.stops.len() - 1).max(1) as f64;
        self.stops
            .iter()
            .enumerate()
            .map(|(i, rgb)| (i as f64 / last, rgb_to_hex(*rgb)))
            .collect()
    }

    /// Color at `t` in `[0, 1]`; values outside are clamped.
    pub fn color_at(&self, t: f64) -> String {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let segments = self.stops.len() - 1;
        if segments == 0 {
            return rgb_to_hex(self.stops[0]);
        }
        let scaled = t * segments as f64;
        let lower = (scaled.floor() as usize).min(segments - 1);
        let frac = scaled - lower as f64;
        let (a, b) = (self.stops[lower], self.stops[lower + 1]);
        let mix = |i: usize| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * frac).round() as u8;
        rgb_to_hex([mix(0), mix(1), mix(2)])
    }

    /// Color for `value` on the `[min, max]` range.
    pub fn color_for(&self, value: f64, (min, max): (f64, f64)) -> String {
        let span = max - min;
        let t = if span > 0.0 { (value - min) / span } else { 0.5 };
        self.color_at(t)
    }
}

fn hex_to_rgb(hex: &str) -> [u8; 3] {
    let hex = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .unwrap_or(0)
    };
    [channel(0..2), channel(2..4), channel(4..6)]
}

fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Everything about the map that does not depend on the selected measure.
#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    pub map: MapConfig,
    pub region: String,
    pub year: String,
    pub scale: ColorScale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub data: Vec<ChoroplethTrace>,
    pub layout: FigureLayout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethTrace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub geojson: FeatureCollection,
    pub featureidkey: &'static str,
    pub locations: Vec<usize>,
    pub z: Vec<Option<f64>>,
    pub text: Vec<String>,
    pub colorscale: Vec<(f64, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zmin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zmax: Option<f64>,
    pub colorbar: ColorBar,
    pub hovertemplate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorBar {
    pub title: Title,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Title {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FigureLayout {
    pub title: Title,
    pub margin: Margin,
    pub mapbox: Mapbox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Margin {
    pub r: u32,
    pub t: u32,
    pub l: u32,
    pub b: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mapbox {
    pub style: String,
    pub center: Center,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

/// Display label of a measure column: underscores become spaces.
pub fn measure_label(measure: &str) -> String {
    measure.replace('_', " ")
}

/// Smallest and largest present value, if any.
pub fn value_range(values: &[Option<f64>]) -> Option<(f64, f64)> {
    values.iter().flatten().fold(None, |range, &v| match range {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Builds the choropleth of `measure` over every county in `table`.
///
/// Counties are keyed by their row index. Counties without a value keep their
/// outline but get `null` in `z` and no `fill` property.
pub fn render(table: &UnifiedTable, view: &MapView, measure: &str) -> Result<Figure, RenderError> {
    let values = table
        .column_values(measure)
        .ok_or_else(|| RenderError::UnknownMeasure(measure.to_string()))?;
    let range = value_range(&values);
    let label = measure_label(measure);

    let features = table
        .records()
        .iter()
        .zip(&values)
        .enumerate()
        .map(|(index, (record, value))| {
            let mut properties = Map::new();
            properties.insert(
                "county_id".to_string(),
                record.county.id.clone().map(Value::String).unwrap_or(Value::Null),
            );
            properties.insert("name".to_string(), Value::String(record.county.name.clone()));
            properties.insert(
                measure.to_string(),
                value
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );
            if let (Some(v), Some(range)) = (value, range) {
                properties.insert("fill".to_string(), Value::String(view.scale.color_for(*v, range)));
            }
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&record.county.geometry))),
                id: Some(Id::Number(Number::from(index))),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let trace = ChoroplethTrace {
        kind: "choroplethmapbox",
        geojson: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        featureidkey: "id",
        locations: (0..table.len()).collect(),
        text: table.records().iter().map(|r| r.county.name.clone()).collect(),
        z: values,
        colorscale: view.scale.plotly_stops(),
        zmin: range.map(|(lo, _)| lo),
        zmax: range.map(|(_, hi)| hi),
        colorbar: ColorBar {
            title: Title {
                text: label.clone(),
            },
        },
        hovertemplate: format!("%{{text}}<br>{}: %{{z}}<extra></extra>", label),
    };

    Ok(Figure {
        data: vec![trace],
        layout: FigureLayout {
            title: Title {
                text: format!("{} by County in {} ({})", label, view.region, view.year),
            },
            margin: Margin {
                r: 0,
                t: 40,
                l: 0,
                b: 0,
            },
            mapbox: Mapbox {
                style: view.map.style.clone(),
                center: Center {
                    lat: view.map.center_lat,
                    lon: view.map.center_lon,
                },
                zoom: view.map.zoom,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{County, JoinReport, Measures, UnifiedRecord};
    use geo::{polygon, MultiPolygon};

    const MEASURE: &str = "Number_of_establishments";

    fn record(id: &str, name: &str, value: Option<f64>) -> UnifiedRecord {
        UnifiedRecord {
            county: County {
                id: Some(id.to_string()),
                name: name.to_string(),
                geometry: MultiPolygon::new(vec![polygon![
                    (x: -99.0, y: 31.0),
                    (x: -98.0, y: 31.0),
                    (x: -98.0, y: 32.0),
                ]]),
            },
            statistics: value.map(|v| Measures::from([(MEASURE.to_string(), v)])),
        }
    }

    fn table() -> UnifiedTable {
        UnifiedTable::new(
            vec![
                record("48001", "Anderson", Some(10.0)),
                record("48003", "Andrews", None),
                record("48005", "Angelina", Some(30.0)),
            ],
            vec![MEASURE.to_string()],
            JoinReport::default(),
        )
    }

    fn view() -> MapView {
        MapView {
            map: MapConfig::default(),
            region: "Texas".to_string(),
            year: "2022".to_string(),
            scale: ColorScale::or_rd(),
        }
    }

    #[test]
    fn color_scale_endpoints_and_midpoint() {
        let scale = ColorScale::or_rd();
        assert_eq!(scale.color_at(0.0), "#fff7ec");
        assert_eq!(scale.color_at(1.0), "#7f0000");
        assert_eq!(scale.color_at(0.5), "#fc8d59");
        assert_eq!(scale.color_at(-3.0), "#fff7ec");
        assert_eq!(scale.color_at(7.0), "#7f0000");
        assert_eq!(scale.color_for(20.0, (20.0, 20.0)), "#fc8d59");

        let stops = scale.plotly_stops();
        assert_eq!(stops.len(), 9);
        assert_eq!(stops[0], (0.0, "#fff7ec".to_string()));
        assert_eq!(stops[8], (1.0, "#7f0000".to_string()));
    }

    #[test]
    fn value_range_ignores_missing() {
        assert_eq!(value_range(&[None, Some(3.0), Some(-1.0), None]), Some((-1.0, 3.0)));
        assert_eq!(value_range(&[None, None]), None);
    }

    #[test]
    fn render_describes_every_county() {
        let figure = render(&table(), &view(), MEASURE).unwrap();
        let trace = &figure.data[0];

        assert_eq!(trace.kind, "choroplethmapbox");
        assert_eq!(trace.locations, vec![0, 1, 2]);
        assert_eq!(trace.z, vec![Some(10.0), None, Some(30.0)]);
        assert_eq!(trace.text, vec!["Anderson", "Andrews", "Angelina"]);
        assert_eq!(trace.geojson.features.len(), 3);
        assert_eq!(trace.zmin, Some(10.0));
        assert_eq!(trace.zmax, Some(30.0));

        let missing = trace.geojson.features[1].properties.as_ref().unwrap();
        assert_eq!(missing.get(MEASURE), Some(&Value::Null));
        assert!(missing.get("fill").is_none());
        let highest = trace.geojson.features[2].properties.as_ref().unwrap();
        assert_eq!(highest.get("fill"), Some(&Value::String("#7f0000".to_string())));

        assert_eq!(
            figure.layout.title.text,
            "Number of establishments by County in Texas (2022)"
        );
        assert_eq!(trace.colorbar.title.text, "Number of establishments");
        assert_eq!(figure.layout.mapbox.style, "carto-positron");
        assert_eq!(figure.layout.mapbox.zoom, 5.0);
        assert_eq!(figure.layout.margin.t, 40);
    }

    #[test]
    fn counties_without_outlines_still_get_a_feature() {
        let mut table_records = table().records().to_vec();
        table_records[1].county.geometry = MultiPolygon::new(Vec::new());
        let table = UnifiedTable::new(table_records, vec![MEASURE.to_string()], JoinReport::default());

        let figure = render(&table, &view(), MEASURE).unwrap();
        let trace = &figure.data[0];
        assert_eq!(trace.geojson.features.len(), 3);
        assert_eq!(trace.locations, vec![0, 1, 2]);
        let json = serde_json::to_value(&figure).unwrap();
        assert_eq!(
            json["data"][0]["geojson"]["features"][1]["geometry"]["coordinates"],
            serde_json::json!([])
        );
    }

    #[test]
    fn render_is_deterministic() {
        let table = table();
        let first = render(&table, &view(), MEASURE).unwrap();
        let second = render(&table, &view(), MEASURE).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn render_unknown_measure_is_a_lookup_error() {
        let err = render(&table(), &view(), "Annual payroll").unwrap_err();
        assert_eq!(err, RenderError::UnknownMeasure("Annual payroll".to_string()));
    }

    #[test]
    fn figure_serializes_in_plotly_shape() {
        let figure = render(&table(), &view(), MEASURE).unwrap();
        let json = serde_json::to_value(&figure).unwrap();

        assert_eq!(json["data"][0]["type"], "choroplethmapbox");
        assert_eq!(json["data"][0]["featureidkey"], "id");
        assert_eq!(json["data"][0]["z"][1], Value::Null);
        assert_eq!(json["data"][0]["colorscale"][0][1], "#fff7ec");
        assert_eq!(json["data"][0]["geojson"]["type"], "FeatureCollection");
        assert_eq!(json["data"][0]["geojson"]["features"][2]["id"], 2);
        assert_eq!(json["layout"]["mapbox"]["center"]["lat"], 31.0);
        assert_eq!(json["layout"]["mapbox"]["center"]["lon"], -99.0);
    }
}

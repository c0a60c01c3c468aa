use crate::config::AppConfig;
use crate::error::LoadError;
use crate::types::{County, JoinReport, Measures, StatisticRow, UnifiedRecord, UnifiedTable};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

/// Reads both inputs named by `config` and left-joins statistics onto the
/// county boundaries.
pub fn load_data(config: &AppConfig) -> Result<UnifiedTable, LoadError> {
    let input = &config.input;

    let statistics_path = config.statistics_path();
    let (columns, statistics) = load_statistics(
        &statistics_path,
        &input.join_column_csv,
        input.delimiter,
        input.key_width,
    )?;
    info!(path = ?statistics_path, rows = statistics.len(), "loaded statistics");

    let boundaries_path = config.boundaries_path();
    let extension = boundaries_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| LoadError::malformed(&boundaries_path, "boundary file has no extension"))?;

    let boundaries = match extension.as_str() {
        "json" | "geojson" => load_geojson(
            &boundaries_path,
            &input.join_column_shape,
            &input.name_column,
            input.key_width,
        )?,
        "shp" => load_shapefile(
            &boundaries_path,
            &input.join_column_shape,
            &input.name_column,
            input.key_width,
        )?,
        other => {
            return Err(LoadError::malformed(
                &boundaries_path,
                format!("unsupported boundary format: {}", other),
            ))
        }
    };
    info!(path = ?boundaries_path, counties = boundaries.len(), "loaded boundaries");

    let table = left_join(boundaries, columns, statistics)?;
    if table.is_empty() {
        warn!(path = ?boundaries_path, "boundary file contains no features");
    }
    let report = table.report();
    info!(
        matched = report.matched,
        unmatched_boundaries = report.unmatched_boundaries,
        unused_statistics = report.unused_statistics,
        "joined statistics onto boundaries"
    );
    if report.matched == 0 && report.boundaries > 0 && report.statistics > 0 {
        warn!(
            shape_key = %input.join_column_shape,
            csv_key = %input.join_column_csv,
            "no statistics row matched any county; check the join columns and key width"
        );
    }

    Ok(table)
}

/// Canonical form of a join key.
///
/// Numeric keys lose any `.0` fraction and leading zeros, then are zero-padded
/// to `width`, so `"048001"`, `"48001"` and `48001.0` all become `"48001"`.
/// Other keys are only trimmed. Blank keys yield `None`.
pub fn normalize_key(raw: &str, width: usize) -> Option<String> {
    let trimmed = strip_zero_fraction(raw.trim());
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let digits = match trimmed.trim_start_matches('0') {
            "" => "0",
            d => d,
        };
        return Some(format!("{:0>width$}", digits, width = width));
    }
    Some(trimmed.to_string())
}

fn strip_zero_fraction(s: &str) -> &str {
    match s.split_once('.') {
        Some((int, frac))
            if !int.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && !frac.is_empty()
                && frac.bytes().all(|b| b == b'0') =>
        {
            int
        }
        _ => s,
    }
}

fn json_key(value: &serde_json::Value, width: usize) -> Option<String> {
    match value {
        serde_json::Value::String(s) => normalize_key(s, width),
        serde_json::Value::Number(n) => normalize_key(&n.to_string(), width),
        _ => None,
    }
}

fn parse_measure(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound {
            path: path.to_path_buf(),
        },
        _ => LoadError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Reads the statistics table. Returns the measure column names and one row
/// per record with a usable key. A measure column is any header other than the
/// join column with at least one numeric cell; text columns are left out.
pub fn load_statistics(
    path: &Path,
    join_column: &str,
    delimiter: char,
    key_width: usize,
) -> Result<(Vec<String>, Vec<StatisticRow>), LoadError> {
    if !delimiter.is_ascii() {
        return Err(LoadError::malformed(
            path,
            format!("delimiter {:?} is not a single byte", delimiter),
        ));
    }
    let file = open(path)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .from_reader(file);
    let headers = rdr
        .headers()
        .map_err(|e| LoadError::malformed(path, e))?
        .clone();

    let join_idx = headers
        .iter()
        .position(|h| h == join_column)
        .ok_or_else(|| {
            LoadError::malformed(path, format!("join column '{}' not found", join_column))
        })?;

    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != join_idx)
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| LoadError::malformed(path, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let key = match record.get(join_idx).and_then(|k| normalize_key(k, key_width)) {
            Some(key) => key,
            None => {
                debug!(line, "skipping statistics row without a join key");
                continue;
            }
        };

        let measures: Measures = columns
            .iter()
            .filter_map(|(idx, name)| {
                let value = parse_measure(record.get(*idx)?)?;
                Some((name.clone(), value))
            })
            .collect();

        rows.push(StatisticRow {
            key,
            line,
            measures,
        });
    }

    let columns = columns
        .into_iter()
        .map(|(_, name)| name)
        .filter(|name| rows.iter().any(|row| row.measures.contains_key(name)))
        .collect();

    Ok((columns, rows))
}

/// Reads a GeoJSON FeatureCollection of county boundaries, one county per
/// feature. Features without polygonal geometry keep an empty outline.
pub fn load_geojson(
    path: &Path,
    key_column: &str,
    name_column: &str,
    key_width: usize,
) -> Result<Vec<County>, LoadError> {
    use geojson::{Feature, GeoJson};

    let reader = BufReader::new(open(path)?);
    let geojson = GeoJson::from_reader(reader).map_err(|e| LoadError::malformed(path, e))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(LoadError::malformed(path, "expected a FeatureCollection")),
    };

    let convert = |(index, feature): (usize, Feature)| -> Result<County, LoadError> {
        let props = feature.properties.as_ref();
        let id = props
            .and_then(|p| p.get(key_column))
            .and_then(|v| json_key(v, key_width));
        let name = props
            .and_then(|p| p.get(name_column))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| id.clone())
            .unwrap_or_default();

        let geometry = match feature.geometry {
            Some(geometry) => {
                let value: geo::Geometry<f64> = geometry.value.try_into().map_err(|e| {
                    LoadError::malformed(path, format!("feature {}: {:?}", index, e))
                })?;
                match value {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        warn!(index, ?id, "feature has no polygon geometry; keeping it without an outline");
                        MultiPolygon::new(Vec::new())
                    }
                }
            }
            None => {
                warn!(index, ?id, "feature has null geometry; keeping it without an outline");
                MultiPolygon::new(Vec::new())
            }
        };

        Ok(County { id, name, geometry })
    };

    collection
        .features
        .into_par_iter()
        .enumerate()
        .map(convert)
        .collect()
}

/// Reads county boundaries from an ESRI Shapefile and its dBase attributes.
pub fn load_shapefile(
    path: &Path,
    key_column: &str,
    name_column: &str,
    key_width: usize,
) -> Result<Vec<County>, LoadError> {
    use shapefile::dbase::FieldValue;

    if !path.exists() {
        return Err(LoadError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader =
        shapefile::Reader::from_path(path).map_err(|e| LoadError::malformed(path, e))?;

    let field_text = |value: Option<&FieldValue>| -> Option<String> {
        match value? {
            FieldValue::Character(Some(s)) => Some(s.clone()),
            FieldValue::Numeric(Some(n)) => Some(n.to_string()),
            FieldValue::Integer(n) => Some(n.to_string()),
            _ => None,
        }
    };

    let mut counties = Vec::new();
    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result.map_err(|e| LoadError::malformed(path, e))?;

        let id = field_text(record.get(key_column)).and_then(|k| normalize_key(&k, key_width));
        let name = field_text(record.get(name_column))
            .or_else(|| id.clone())
            .unwrap_or_default();

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into().map_err(|e| {
                LoadError::malformed(path, format!("shape {}: {:?}", index, e))
            })?,
            shapefile::Shape::PolygonM(polygon) => polygon.try_into().map_err(|e| {
                LoadError::malformed(path, format!("shape {}: {:?}", index, e))
            })?,
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into().map_err(|e| {
                LoadError::malformed(path, format!("shape {}: {:?}", index, e))
            })?,
            _ => {
                warn!(index, ?id, "shape is not a polygon; keeping it without an outline");
                MultiPolygon::new(Vec::new())
            }
        };

        counties.push(County { id, name, geometry });
    }

    Ok(counties)
}

/// Left outer join with the boundaries as the driving table. Every county
/// appears exactly once, in input order. A key repeated in `statistics` is an
/// error, since it would duplicate counties.
pub fn left_join(
    boundaries: Vec<County>,
    columns: Vec<String>,
    statistics: Vec<StatisticRow>,
) -> Result<UnifiedTable, LoadError> {
    let statistics_count = statistics.len();
    let mut by_key: HashMap<String, StatisticRow> = HashMap::with_capacity(statistics_count);
    for row in statistics {
        if let Some(first) = by_key.get(&row.key) {
            return Err(LoadError::DuplicateKey {
                key: row.key,
                first_line: first.line,
                line: row.line,
            });
        }
        by_key.insert(row.key.clone(), row);
    }

    let mut used: HashSet<&str> = HashSet::new();
    let mut matched = 0;
    let mut records = Vec::with_capacity(boundaries.len());
    for county in boundaries {
        let row = county.id.as_deref().and_then(|id| by_key.get_key_value(id));
        let statistics = row.map(|(key, row)| {
            used.insert(key.as_str());
            row.measures.clone()
        });
        if statistics.is_some() {
            matched += 1;
        }
        records.push(UnifiedRecord { county, statistics });
    }

    let report = JoinReport {
        boundaries: records.len(),
        statistics: statistics_count,
        matched,
        unmatched_boundaries: records.len() - matched,
        unused_statistics: statistics_count - used.len(),
    };

    Ok(UnifiedTable::new(records, columns, report))
}

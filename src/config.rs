use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variable that overrides `server.port`.
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub dashboard: DashboardConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    /// Directory the two input files are resolved against.
    pub data_dir: PathBuf,
    /// County boundaries, GeoJSON FeatureCollection or Shapefile.
    pub boundaries: PathBuf,
    /// Per-county statistics, delimited text with a header row.
    pub statistics: PathBuf,
    pub join_column_shape: String,
    pub join_column_csv: String,
    pub name_column: String,
    /// Numeric keys are zero-padded to this many digits.
    pub key_width: usize,
    pub delimiter: char,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            boundaries: PathBuf::from("county_shapes.geojson"),
            statistics: PathBuf::from("minority_business.csv"),
            join_column_shape: "Geo_ID_5".to_string(),
            join_column_csv: "GeoID".to_string(),
            name_column: "NAME".to_string(),
            key_width: 5,
            delimiter: ',',
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MeasureOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub heading: String,
    pub prompt: String,
    /// Region name used in the figure title.
    pub region: String,
    pub year: String,
    pub measures: Vec<MeasureOption>,
    pub default_measure: Option<String>,
    pub map: MapConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            heading: "Texas Counties Interactive Dashboard".to_string(),
            prompt: "Select a measure to display on the map:".to_string(),
            region: "Texas".to_string(),
            year: "2022".to_string(),
            measures: vec![MeasureOption {
                label: "Number of Establishments".to_string(),
                value: "Number of establishments".to_string(),
            }],
            default_measure: None,
            map: MapConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub style: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            style: "carto-positron".to_string(),
            center_lat: 31.0,
            center_lon: -99.0,
            zoom: 5.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub assets_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8051,
            assets_dir: None,
        }
    }
}

impl AppConfig {
    /// Reads a TOML config. Relative paths inside it are resolved against the
    /// directory containing the file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Ok(config.resolved_against(base))
    }

    /// Config for a run: the explicit file if given, else `config.toml` in
    /// `working_dir` when present, else the built-in defaults.
    pub fn locate(explicit: Option<&Path>, working_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        let candidate = working_dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            return Self::load_from_file(&candidate);
        }
        Ok(Self::for_executable())
    }

    /// Built-in defaults with the data directory next to the running binary.
    pub fn for_executable() -> Self {
        let base = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        AppConfig::default().resolved_against(&base)
    }

    fn resolved_against(mut self, base: &Path) -> Self {
        if self.input.data_dir.is_relative() {
            self.input.data_dir = base.join(&self.input.data_dir);
        }
        if let Some(assets) = &self.server.assets_dir {
            if assets.is_relative() {
                self.server.assets_dir = Some(base.join(assets));
            }
        }
        self
    }

    pub fn boundaries_path(&self) -> PathBuf {
        self.input.data_dir.join(&self.input.boundaries)
    }

    pub fn statistics_path(&self) -> PathBuf {
        self.input.data_dir.join(&self.input.statistics)
    }

    /// Listen address, honoring the `PORT` environment variable.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let env_port = std::env::var(PORT_ENV).ok();
        let port = resolve_port(env_port.as_deref(), self.server.port)?;
        Ok(SocketAddr::new(self.server.host, port))
    }
}

pub(crate) fn resolve_port(env_value: Option<&str>, configured: u16) -> Result<u16> {
    match env_value.map(str::trim) {
        None | Some("") => Ok(configured),
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow!("{} must be a port number, got {:?}", PORT_ENV, raw)),
    }
}

//! The page model: layout, the loaded table, and the handlers that turn
//! control changes into figures.

use crate::config::{DashboardConfig, MeasureOption};
use crate::error::{DashboardError, RenderError};
use crate::figure::{self, ColorScale, Figure, MapView};
use crate::types::UnifiedTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const DROPDOWN_ID: &str = "measure-dropdown";
pub const GRAPH_ID: &str = "map-graph";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub heading: String,
    pub prompt: String,
    pub dropdown: Dropdown,
    pub graph: Graph,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dropdown {
    pub id: String,
    pub options: Vec<MeasureOption>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Graph {
    pub id: String,
}

/// A property of a page component, e.g. `measure-dropdown.value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentProperty {
    pub component: String,
    pub property: String,
}

impl ComponentProperty {
    pub fn new(component: &str, property: &str) -> Self {
        Self {
            component: component.to_string(),
            property: property.to_string(),
        }
    }
}

pub type Handler = fn(&Dashboard, &Value) -> Result<Figure, RenderError>;

#[derive(Clone)]
pub struct Callback {
    pub output: ComponentProperty,
    handler: Handler,
}

/// Handlers keyed by the input property whose changes trigger them.
#[derive(Clone, Default)]
pub struct Callbacks {
    handlers: HashMap<ComponentProperty, Callback>,
}

impl Callbacks {
    pub fn register(&mut self, input: ComponentProperty, output: ComponentProperty, handler: Handler) {
        self.handlers.insert(input, Callback { output, handler });
    }

    pub fn get(&self, input: &ComponentProperty) -> Option<&Callback> {
        self.handlers.get(input)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackOutput {
    pub output: ComponentProperty,
    pub figure: Figure,
}

/// The loaded table plus everything needed to draw it. Built once at startup
/// and only read afterwards.
pub struct Dashboard {
    table: UnifiedTable,
    layout: Layout,
    view: MapView,
    callbacks: Callbacks,
}

impl Dashboard {
    pub fn new(table: UnifiedTable, config: &DashboardConfig) -> Result<Self, DashboardError> {
        let first = config.measures.first().ok_or(DashboardError::NoMeasures)?;
        for option in &config.measures {
            if !table.has_column(&option.value) {
                return Err(DashboardError::UndeclaredColumn(option.value.clone()));
            }
        }

        let default_measure = match &config.default_measure {
            Some(measure) if config.measures.iter().any(|m| &m.value == measure) => measure.clone(),
            Some(measure) => return Err(DashboardError::UnknownDefault(measure.clone())),
            None => first.value.clone(),
        };

        let layout = Layout {
            heading: config.heading.clone(),
            prompt: config.prompt.clone(),
            dropdown: Dropdown {
                id: DROPDOWN_ID.to_string(),
                options: config.measures.clone(),
                value: default_measure,
            },
            graph: Graph {
                id: GRAPH_ID.to_string(),
            },
        };

        let mut callbacks = Callbacks::default();
        callbacks.register(
            ComponentProperty::new(DROPDOWN_ID, "value"),
            ComponentProperty::new(GRAPH_ID, "figure"),
            update_map,
        );

        Ok(Self {
            table,
            layout,
            view: MapView {
                map: config.map.clone(),
                region: config.region.clone(),
                year: config.year.clone(),
                scale: ColorScale::or_rd(),
            },
            callbacks,
        })
    }

    pub fn table(&self) -> &UnifiedTable {
        &self.table
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn default_measure(&self) -> &str {
        &self.layout.dropdown.value
    }

    pub fn render(&self, measure: &str) -> Result<Figure, RenderError> {
        figure::render(&self.table, &self.view, measure)
    }

    /// Runs the handler registered for `trigger` with the control's new value.
    pub fn dispatch(
        &self,
        trigger: &ComponentProperty,
        value: &Value,
    ) -> Result<CallbackOutput, RenderError> {
        let callback = self
            .callbacks
            .get(trigger)
            .ok_or_else(|| RenderError::UnknownTrigger {
                component: trigger.component.clone(),
                property: trigger.property.clone(),
            })?;
        let figure = (callback.handler)(self, value)?;
        Ok(CallbackOutput {
            output: callback.output.clone(),
            figure,
        })
    }
}

fn update_map(dashboard: &Dashboard, value: &Value) -> Result<Figure, RenderError> {
    let measure = value.as_str().ok_or_else(|| RenderError::InvalidInput {
        component: DROPDOWN_ID.to_string(),
        property: "value".to_string(),
        reason: format!("expected a measure name, got {}", value),
    })?;
    dashboard.render(measure)
}

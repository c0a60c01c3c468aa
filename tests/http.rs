use axum::{body::Body, http::Request, http::StatusCode, Router};
use county_choropleth::config::AppConfig;
use county_choropleth::dashboard::Dashboard;
use county_choropleth::data::load_data;
use county_choropleth::server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tower::ServiceExt;

const ESTABLISHMENTS: &str = "Number of establishments";

fn app() -> Router {
    let dir = tempfile::tempdir().unwrap();
    let features = json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "Geo_ID_5": "048001", "NAME": "Anderson" },
                "geometry": { "type": "Polygon",
                    "coordinates": [[[-96.0, 31.5], [-95.0, 31.5], [-95.0, 32.5], [-96.0, 32.5], [-96.0, 31.5]]] }
            },
            {
                "type": "Feature",
                "properties": { "Geo_ID_5": "048003", "NAME": "Andrews" },
                "geometry": { "type": "Polygon",
                    "coordinates": [[[-103.0, 32.0], [-102.0, 32.0], [-102.0, 33.0], [-103.0, 33.0], [-103.0, 32.0]]] }
            }
        ]
    });
    fs::write(dir.path().join("county_shapes.geojson"), features.to_string()).unwrap();
    fs::write(
        dir.path().join("minority_business.csv"),
        format!("GeoID,{ESTABLISHMENTS}\n48001,42\n"),
    )
    .unwrap();

    let mut config = AppConfig::default();
    config.input.data_dir = dir.path().to_path_buf();
    let table = load_data(&config).unwrap();
    let dashboard = Dashboard::new(table, &config.dashboard).unwrap();
    build_router(Arc::new(AppState { dashboard }), None)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn callback(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/callback")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn index_serves_the_page() {
    let response = app().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("/api/callback"));
}

#[tokio::test]
async fn layout_lists_the_dropdown_options() {
    let (status, body) = send(app(), get("/api/layout")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dropdown"]["id"], "measure-dropdown");
    assert_eq!(body["dropdown"]["value"], ESTABLISHMENTS);
    assert_eq!(body["dropdown"]["options"][0]["label"], "Number of Establishments");
    assert_eq!(body["graph"]["id"], "map-graph");
}

#[tokio::test]
async fn dropdown_callback_returns_the_map_figure() {
    let request = callback(json!({
        "trigger": { "component": "measure-dropdown", "property": "value" },
        "value": ESTABLISHMENTS,
    }));
    let (status, body) = send(app(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"]["component"], "map-graph");
    assert_eq!(body["output"]["property"], "figure");
    let trace = &body["figure"]["data"][0];
    assert_eq!(trace["type"], "choroplethmapbox");
    assert_eq!(trace["z"], json!([42.0, null]));
    assert_eq!(trace["locations"], json!([0, 1]));
    assert_eq!(
        body["figure"]["layout"]["title"]["text"],
        "Number of establishments by County in Texas (2022)"
    );
}

#[tokio::test]
async fn callback_errors_map_to_status_codes() {
    let unknown_measure = callback(json!({
        "trigger": { "component": "measure-dropdown", "property": "value" },
        "value": "Annual payroll",
    }));
    let (status, body) = send(app(), unknown_measure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("Annual payroll"));

    let bad_value = callback(json!({
        "trigger": { "component": "measure-dropdown", "property": "value" },
        "value": 7,
    }));
    let (status, _) = send(app(), bad_value).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown_trigger = callback(json!({
        "trigger": { "component": "map-graph", "property": "clickData" },
        "value": null,
    }));
    let (status, _) = send(app(), unknown_trigger).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn figure_endpoint_defaults_to_the_selected_measure() {
    let app = app();
    let (status, default) = send(app.clone(), get("/api/figure")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, explicit) = send(
        app.clone(),
        get("/api/figure?measure=Number%20of%20establishments"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(default, explicit);

    let (status, _) = send(app, get("/api/figure?measure=Employees")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn report_counts_matches() {
    let (status, body) = send(app(), get("/api/report")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["boundaries"], 2);
    assert_eq!(body["matched"], 1);
    assert_eq!(body["unmatched_boundaries"], 1);
}

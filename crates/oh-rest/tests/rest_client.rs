//! RestClient against an in-process mock server

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use oh_config::ClientConfig;
use oh_rest::{RestClient, RestError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio_test::assert_ok;

type Calls = Arc<Mutex<Vec<(String, String, String)>>>;

async fn get_item(Path(name): Path<String>) -> Result<Json<Value>, StatusCode> {
    match name.as_str() {
        "Light" => Ok(Json(json!({
            "link": "http://localhost/rest/items/Light",
            "state": "ON",
            "type": "Switch",
            "name": "Light",
            "label": "Kitchen Light",
            "tags": ["Lighting"],
            "groupNames": ["Kitchen"]
        }))),
        "Broken" => Err(StatusCode::INTERNAL_SERVER_ERROR),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn send_command(
    State(calls): State<Calls>,
    Path(name): Path<String>,
    body: String,
) -> StatusCode {
    calls.lock().unwrap().push(("POST".to_string(), name, body));
    StatusCode::OK
}

async fn get_state(Path(name): Path<String>) -> Result<String, StatusCode> {
    if name == "Light" {
        Ok("ON".to_string())
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn put_state(
    State(calls): State<Calls>,
    Path(name): Path<String>,
    body: String,
) -> StatusCode {
    calls.lock().unwrap().push(("PUT".to_string(), name, body));
    StatusCode::ACCEPTED
}

async fn list_items() -> Json<Value> {
    Json(json!([
        {"type": "Switch", "name": "Light", "state": "ON"},
        {"type": "Number", "name": "Temperature", "state": "21.5"}
    ]))
}

async fn get_thing(Path(uid): Path<String>) -> Result<Json<Value>, StatusCode> {
    if uid == "hue:bridge:1" {
        Ok(Json(json!({
            "UID": "hue:bridge:1",
            "thingTypeUID": "hue:bridge",
            "statusInfo": {"status": "ONLINE", "statusDetail": "NONE"}
        })))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn spawn_server() -> (RestClient, Calls) {
    let calls: Calls = Arc::default();
    let router = Router::new()
        .route("/rest/items", get(list_items))
        .route("/rest/items/:name", get(get_item).post(send_command))
        .route("/rest/items/:name/state", get(get_state).put(put_state))
        .route("/rest/things/:uid", get(get_thing))
        .with_state(calls.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let config = ClientConfig {
        url: format!("http://{addr}"),
        ..ClientConfig::default()
    };
    (RestClient::new(&config).unwrap(), calls)
}

#[tokio::test]
async fn test_get_item() {
    let (client, _) = spawn_server().await;
    let item = client.get_item("Light").await.unwrap();
    assert_eq!(item.item_type, "Switch");
    assert_eq!(item.label.as_deref(), Some("Kitchen Light"));
    assert_eq!(item.group_names, vec!["Kitchen"]);
    assert_eq!(item.state.as_deref(), Some("ON"));
}

#[tokio::test]
async fn test_not_found_and_failure() {
    let (client, _) = spawn_server().await;

    let missing = client.get_item("Nope").await.unwrap_err();
    assert!(matches!(missing, RestError::NotFound(name) if name == "Nope"));

    let broken = client.get_item("Broken").await.unwrap_err();
    assert!(matches!(
        broken,
        RestError::RequestFailed { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
    ));
}

#[tokio::test]
async fn test_state_and_commands() {
    let (client, calls) = spawn_server().await;

    assert_eq!(client.get_item_state("Light").await.unwrap(), "ON");
    assert_ok!(client.send_command("Light", "OFF").await);
    assert_ok!(client.post_update("Light", "ON").await);

    let calls = calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            ("POST".to_string(), "Light".to_string(), "OFF".to_string()),
            ("PUT".to_string(), "Light".to_string(), "ON".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_items_and_things() {
    let (client, _) = spawn_server().await;

    let items = client.get_items().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].name, "Temperature");

    let thing = client.get_thing("hue:bridge:1").await.unwrap();
    assert_eq!(thing.status_info.status, "ONLINE");
    assert!(client.get_thing("zwave:device:2").await.unwrap_err().is_not_found());
}
